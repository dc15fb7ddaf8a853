pub mod context_builder;
pub mod embeddings;
pub mod hashing_embedding;
pub mod helpers;
#[cfg(feature = "huggingface")]
pub mod huggingface_embedding;
pub mod rag_service;
