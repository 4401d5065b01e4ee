use std::sync::Arc;

use gardenlink_client::configs::Settings;
use gardenlink_client::run;

#[tokio::main]
async fn main() {
    let settings = Arc::new(Settings::new().expect("Failed to load settings."));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logger.directive(env!("CARGO_BIN_NAME")).into()),
        )
        .init();

    if let Err(e) = run(&settings).await {
        tracing::error!(error = %e, "monitor stopped");
        std::process::exit(1);
    }
}
