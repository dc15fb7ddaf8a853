use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::{log::SetLoggerError, LogTracer};
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

/// Composes the layers of our `tracing` subscriber.
///
/// - an `EnvFilter` read from `RUST_LOG`, falling back to `fallback_env_filter`
/// - a `JsonStorageLayer` keeping span fields available to the layers below,
///   and propagating them from parent spans to their children
/// - a `BunyanFormattingLayer` writing bunyan-compatible JSON records to `sink`
///
/// # Arguments
/// - `name`: name of the app, written in every record
/// - `fallback_env_filter`: filter used if RUST_LOG has not been set
/// - `sink`: where the records are written (stdout, or a sink during tests)
pub fn get_tracing_subscriber<Sink>(
    name: impl Into<String>,
    fallback_env_filter: impl Into<String>,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    // The sink implements `MakeWriter` for every lifetime `'a` (higher-ranked trait bound)
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let fallback_env_filter = fallback_env_filter.into();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_env_filter));

    let formatting_layer = BunyanFormattingLayer::new(name.into(), sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// Registers the subscriber as the global default and redirects `log` records to it.
///
/// It should only be called once per process.
pub fn init_tracing_subscriber(
    subscriber: impl Subscriber + Send + Sync,
) -> Result<(), TelemetryError> {
    LogTracer::init()?;
    set_global_default(subscriber)?;
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to set the log tracer: {0}")]
    Logger(#[from] SetLoggerError),
    #[error("Failed to set the global subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}
