use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use chathub_server::auth::jwt;
use chathub_server::config::{generate_config_template, Config};
use chathub_server::state::AppState;
use chathub_server::{db, routes};

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chathub_server=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // defaults < TOML file < CHATHUB_* env < CLI flags
    let config = Config::load()?;

    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    init_tracing(config.json_logs);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chathub server starting");

    let db = db::init_db(&config.data_dir)?;
    let jwt_secret = jwt::load_or_generate_jwt_secret(&config.data_dir)?;
    let state = AppState::new(db, jwt_secret, config.outbound_queue_capacity);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        %addr,
        queue_capacity = config.outbound_queue_capacity,
        "Listening"
    );

    axum::serve(
        listener,
        routes::build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
