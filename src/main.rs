use tracing::error;

#[tokio::main]
async fn main() {
    // RUST_LOG=debug for verbose, RUST_LOG=info for normal, RUST_LOG=warn for production
    vl6180x_hub::init_tracing();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/hub.toml".to_string());

    if let Err(e) = vl6180x_hub::run_hub(&config_path).await {
        error!("[vl6180x-hub] fatal: {}", e);
        std::process::exit(1);
    }
}
