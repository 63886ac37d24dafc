#[tokio::main]
async fn main() {
    if let Err(e) = interaction_sync::run_with_config().await {
        tracing::error!(error = %e, "relay exited");
        std::process::exit(1);
    }
}
