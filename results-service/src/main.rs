use results_service::{config::EnvVars, db::publish_exam_results};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty())
        .with(EnvFilter::from_default_env())
        .init();
    tracing::info!("Starting result publication...");
    dotenvy::dotenv().ok();

    let env_vars = EnvVars::new();

    if let Err(e) = publish_exam_results(&env_vars).await {
        tracing::error!("Error publishing exam results: {:?}", e);
    } else {
        tracing::info!("Successfully published exam results");
    }
}
