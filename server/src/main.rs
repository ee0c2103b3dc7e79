use kbase_server::config::ServerConfig;
use kbase_server::error::ServerError;
use kbase_server::{app, AppState};

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::load()?;
    let addr = config.addr()?;
    let state = AppState::new(config)?;
    log::info!(
        "Serving vault {} (auth {})",
        state.vault.root().display(),
        if state.config.auth_enabled() { "enabled" } else { "disabled" }
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{addr}");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(error) = run().await {
        log::error!("{error}");
        std::process::exit(1);
    }
}
