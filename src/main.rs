use creator_link_lib::{logging, start_server, AppConfig};

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("failed to load .env: {err}");
        }
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    let _log_guard = logging::init(&config.log);

    let mut server = match start_server(config).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!("startup failed: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
    }
    tracing::info!("shutdown requested");
    server.stop().await;
}
