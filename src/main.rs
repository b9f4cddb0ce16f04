use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("INKPOST_HTTP_PORT").unwrap_or_else(|_| "7878".to_string());
    let data_dir = std::env::var("INKPOST_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let ttl = std::env::var("INKPOST_TOKEN_TTL_SECS").unwrap_or_else(|_| "86400".to_string());
    let secret_set = std::env::var("INKPOST_SECRET").map(|s| !s.is_empty()).unwrap_or(false);
    info!(
        target: "inkpost",
        "inkpost starting: RUST_LOG='{}', http_port={}, data_dir='{}', token_ttl_secs={}, secret_from_env={}",
        rust_log, http_port, data_dir, ttl, secret_set
    );

    inkpost::server::run().await
}
