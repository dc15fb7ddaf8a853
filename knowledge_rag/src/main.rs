use common::telemetry::{get_tracing_subscriber, init_tracing_subscriber};
use knowledge_rag::{configuration::get_configuration, startup::Application};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Stdout carries the command responses, logs go to stderr
    let tracing_subscriber = get_tracing_subscriber("knowledge_rag", "info", std::io::stderr);
    init_tracing_subscriber(tracing_subscriber).expect("Failed to set up tracing.");

    // Panics if the configuration can't be read
    let configuration = get_configuration().expect("Failed to read configuration.");

    let application = match Application::build(configuration).await {
        Ok(application) => application,
        Err(error) => panic!("Failed to build application: {:?}", error),
    };

    if let Err(error) = application.run_until_stopped().await {
        panic!("Application stopped with an error: {:?}", error);
    }

    Ok(())
}
