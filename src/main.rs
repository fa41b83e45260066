use shelf::{Config, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    match &config.data_dir {
        Some(dir) => info!(dir = %dir.display(), "using directory storage"),
        None => info!("using in-memory storage, data is lost on exit"),
    }

    let app = shelf::app(&config);
    Server::bind(config.addr).body_limit(config.max_body).serve(app).await?;
    Ok(())
}
