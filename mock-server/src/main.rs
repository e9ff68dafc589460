use mock_server::Db;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "mock sharepoint listening");

    let db = Db::default();
    if std::env::var("REQUIRE_DIGEST").is_ok_and(|v| v == "1") {
        db.write().await.require_digest = true;
    }
    mock_server::run(listener, db).await
}
