use std::time::Duration;

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};

use crate::domain::entities::{knowledge_base::OwnerId, timeouts::Timeouts};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub embeddings: EmbeddingsSettings,
    /// Without Qdrant settings, embeddings are kept in memory
    pub qdrant: Option<QdrantSettings>,
    /// Without database settings, the index state of knowledge bases is kept in memory
    pub database: Option<DatabaseSettings>,
    pub timeouts: TimeoutsSettings,
    pub ollama: OllamaSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Knowledge base used by the commands that do not name one
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub default_owner_id: OwnerId,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingsProvider {
    /// Sentence embeddings model, needs the `huggingface` feature
    Huggingface,
    /// Feature hashing, without any model
    Hashing,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingsSettings {
    pub provider: EmbeddingsProvider,
    /// Sentence embeddings model, for ex: `all-mini-lm-l6-v2`
    pub model: String,
    /// Dimension of the hashed embeddings. A sentence embeddings model has its own.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub grpc_port: u16,
    pub host: String,
    pub api_key: Option<Secret<String>>,
    /// Useful to create parallel collections during tests for example
    pub collection_prefix: String,
    /// For ex: "Cosine", "Euclid" or "Dot"
    pub collection_distance: String,
}

impl QdrantSettings {
    pub fn get_grpc_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.grpc_port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
    // Determines if we demand the connection to be encrypted or not
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            // Try an encrypted connection, fallback to unencrypted if it fails
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db()
            .database(&self.database_name)
            // Lowers sqlx logs from INFO to TRACE level.
            .log_statements(tracing::log::LevelFilter::Trace)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutsSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub embedding_milliseconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub vector_index_milliseconds: u64,
}

impl From<&TimeoutsSettings> for Timeouts {
    fn from(settings: &TimeoutsSettings) -> Self {
        Self {
            embedding: Duration::from_millis(settings.embedding_milliseconds),
            vector_index: Duration::from_millis(settings.vector_index_milliseconds),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl OllamaSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

/// Extracts app settings from configuration files and env variables
///
/// `base.yaml` should contain shared settings for all environments.
/// A specific env file should be created for each environment: `develop.yaml`, `local.yaml` and `production.yaml`
/// The environment is set with the env var `APP_ENVIRONMENT`.
/// If `APP_ENVIRONMENT` is not set, `develop.yaml` is the default.
///
/// Settings are also taken from environment variables: with a prefix of APP and '__' as separator
/// For ex: `APP_QDRANT__GRPC_PORT=6334` would set `Settings.qdrant.grpc_port`
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|error| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", error))
    })?;
    let configuration_directory = base_path.join("configuration");

    // Detects the running environment.
    // Default to `develop` if unspecified.
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "develop".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        // Adds in settings from environment variables (with a prefix of APP and '__' as separator)
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// The possible runtime environment for our application.
#[derive(Debug)]
pub enum Environment {
    Develop,
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Develop => "develop",
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "develop" => Ok(Self::Develop),
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `develop`, `local` or `production`.",
                other
            )),
        }
    }
}
