use std::sync::Arc;

use mock_server::MockState;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8880".to_string());
    let addr = format!("127.0.0.1:{port}");

    let mut state = MockState::new();
    if let (Ok(user), Ok(password)) = (std::env::var("MOCK_USER"), std::env::var("MOCK_PASSWORD")) {
        tracing::info!(user = %user, "basic authentication required");
        state = state.with_basic_auth(&user, &password);
    }

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");
    mock_server::run_with_state(listener, Arc::new(state)).await
}
