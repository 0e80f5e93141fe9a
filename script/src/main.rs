use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod create_admin;
use create_admin::create_admin;

#[tokio::main]
async fn main() {
    let file = std::fs::File::create("script-logs.jsonl").expect("unable to create file");
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().pretty())
        .with(tracing_subscriber::fmt::layer().json().with_writer(file))
        .init();
    dotenvy::dotenv().ok();
    info!("Running admin bootstrap...");

    let mongo_uri = std::env::var("MONGODB_URI").expect("MONGODB_URI required");
    let client = models::db::client(&mongo_uri)
        .await
        .expect("unable to connect to MongoDB");
    if let Err(e) = create_admin(client).await {
        error!("{e:?}");
    }
}
