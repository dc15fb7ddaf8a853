use async_trait::async_trait;
use rust_bert::pipelines::sentence_embeddings::{
    SentenceEmbeddingsBuilder, SentenceEmbeddingsModelType,
};
use std::{
    sync::mpsc,
    thread::{self, JoinHandle},
};
use tokio::{sync::oneshot, task};
use tracing::{error, info};

use super::embeddings::{EmbeddingsService, EmbeddingsServiceError};
use crate::domain::entities::embedding_point::Embeddings;

/// Sentence embeddings generated with a model available from Hugging Face, through rust-bert.
///
/// Running the model is CPU-bound and blocking: it lives on its own thread (the "runner"),
/// and async callers send it their texts through a channel.
pub struct HuggingFaceEmbeddingsService {
    sender_to_runner: mpsc::SyncSender<RunnerMessage>,
    dimension: usize,
    _thread_handle: JoinHandle<()>,
}

impl HuggingFaceEmbeddingsService {
    /// Spawns the runner on a separate thread, loading the model named in the configuration
    ///
    /// Known models: `all-mini-lm-l6-v2` (384), `all-mini-lm-l12-v2` (384),
    /// `all-distilroberta-v1` (768), `paraphrase-albert-small-v2` (768).
    pub fn try_new(model_name: &str) -> Result<Self, EmbeddingsServiceError> {
        let (model_type, dimension) = model_type_from_name(model_name)?;

        let (sender, receiver) = mpsc::sync_channel(100);
        let handle = thread::spawn(move || Self::runner(model_type, receiver));

        Ok(Self {
            sender_to_runner: sender,
            dimension,
            _thread_handle: handle,
        })
    }

    /// The embeddings runner itself, in a sync context
    ///
    /// Each received message carries the texts to encode and a sender for the result.
    /// Encoding errors are sent back to the caller; the runner stops only when every
    /// sender has been dropped, or if the model could not be loaded.
    #[tracing::instrument(name = "Embeddings runner", skip(model_type, receiver))]
    fn runner(model_type: SentenceEmbeddingsModelType, receiver: mpsc::Receiver<RunnerMessage>) {
        let model = match SentenceEmbeddingsBuilder::remote(model_type).create_model() {
            Ok(model) => model,
            Err(error) => {
                error!(?error, "Failed to load the embeddings model");
                return;
            }
        };
        info!("Embeddings model loaded ✅");

        while let Ok((texts, sender)) = receiver.recv() {
            let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
            let result = model.encode(&texts).map_err(|error| error.to_string());

            // The caller may have timed out and dropped its receiver
            if sender.send(result).is_err() {
                info!("Embeddings caller is gone, dropping the result");
            }
        }
    }
}

#[async_trait]
impl EmbeddingsService for HuggingFaceEmbeddingsService {
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[tracing::instrument(name = "Generate embeddings", skip(self))]
    async fn encode_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Embeddings>, EmbeddingsServiceError> {
        let (sender, receiver) = oneshot::channel();

        task::block_in_place(|| self.sender_to_runner.send((texts, sender)))
            .map_err(|_| EmbeddingsServiceError::RunnerUnavailable)?;

        receiver
            .await
            .map_err(|_| EmbeddingsServiceError::RunnerUnavailable)?
            .map_err(EmbeddingsServiceError::ModelError)
    }
}

fn model_type_from_name(
    model_name: &str,
) -> Result<(SentenceEmbeddingsModelType, usize), EmbeddingsServiceError> {
    match model_name {
        "all-mini-lm-l6-v2" => Ok((SentenceEmbeddingsModelType::AllMiniLmL6V2, 384)),
        "all-mini-lm-l12-v2" => Ok((SentenceEmbeddingsModelType::AllMiniLmL12V2, 384)),
        "all-distilroberta-v1" => Ok((SentenceEmbeddingsModelType::AllDistilrobertaV1, 768)),
        "paraphrase-albert-small-v2" => {
            Ok((SentenceEmbeddingsModelType::ParaphraseAlbertSmallV2, 768))
        }
        other => Err(EmbeddingsServiceError::ModelError(format!(
            "{} is not a supported sentence embeddings model",
            other
        ))),
    }
}

/// Message type for the runner channel: texts to encode and where to send their embeddings
type RunnerMessage = (Vec<String>, oneshot::Sender<Result<Vec<Embeddings>, String>>);
