use mock_appliance::{Appliance, ApplianceConfig};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = ApplianceConfig::default();
    if let Ok(user) = std::env::var("MOCK_ADMIN_USER") {
        config.admin_user = user;
    }
    if let Ok(password) = std::env::var("MOCK_ADMIN_PASSWORD") {
        config.admin_password = password;
    }
    if let Ok(token) = std::env::var("MOCK_API_TOKEN") {
        config.api_tokens.push(token);
    }

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, admin = %config.admin_user, "mock appliance listening");
    mock_appliance::run(listener, Appliance::new(config)).await
}
