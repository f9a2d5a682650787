//! Static HTTP server for the report directory.

use std::path::PathBuf;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub fn router(outdir: PathBuf) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(outdir))
        .layer(TraceLayer::new_for_http())
}

/// Serve `outdir` on `listen_address` until the process exits.
pub async fn serve(listen_address: String, outdir: PathBuf) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&listen_address).await?;
    info!("serving {} on http://{}", outdir.display(), listener.local_addr()?);
    axum::serve(listener, router(outdir)).await?;
    Ok(())
}

/// Run the publisher in the background. It shares only the report directory with the
/// fetch loop, so a failure here is logged and the cycles keep running.
pub fn spawn(listen_address: String, outdir: PathBuf) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(listen_address, outdir).await {
            error!("http server stopped: {e:#}");
        }
    })
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn serves_files_from_outdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>report</h1>").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(dir.path().to_path_buf());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("<h1>report</h1>"));
    }
}
