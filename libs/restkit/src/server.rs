//! HTTP server lifecycle: bind, listen, graceful shutdown with a deadline.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;

use crate::signals;

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[async_trait]
pub trait HttpServer: Send + Sync + 'static {
    /// Serve connections until shut down. Returns once in-flight requests have drained.
    async fn listen(&self) -> Result<()>;

    /// Stop accepting connections and wait at most `grace` for `listen` to return.
    async fn shutdown(&self, grace: Duration) -> Result<()>;
}

/// [`HttpServer`] over `axum::serve`, bound eagerly so the local address is known
/// before listening starts.
pub struct AxumServer {
    router: Router,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl AxumServer {
    pub async fn bind(addr: impl ToSocketAddrs, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind HTTP listener")?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "HTTP server bound");
        Ok(Self {
            router,
            local_addr,
            listener: Mutex::new(Some(listener)),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl HttpServer for AxumServer {
    async fn listen(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| anyhow!("server is already listening or shut down"))?;

        tracing::info!(addr = %self.local_addr, "HTTP server listening");
        let cancel = self.cancel.clone();
        let result = axum::serve(
            listener,
            self.router
                .clone()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await;

        self.finished.cancel();
        tracing::info!(addr = %self.local_addr, "HTTP server stopped");
        result.context("HTTP server failed")
    }

    async fn shutdown(&self, grace: Duration) -> Result<()> {
        self.cancel.cancel();
        // never listened: nothing to drain
        if self.listener.lock().take().is_some() {
            self.finished.cancel();
        }
        if tokio::time::timeout(grace, self.finished.cancelled())
            .await
            .is_err()
        {
            tracing::warn!(grace_ms = grace.as_millis(), "Graceful shutdown timed out");
            bail!("graceful shutdown did not finish within {grace:?}");
        }
        Ok(())
    }
}

/// Run `server` until `signal` resolves, then shut it down gracefully.
///
/// When the grace period elapses the listening task is aborted and the timeout is
/// returned as an error. If the server stops on its own first, its result is returned.
pub async fn serve_until<S, F>(server: Arc<S>, signal: F, grace: Duration) -> Result<()>
where
    S: HttpServer + ?Sized,
    F: Future<Output = ()> + Send,
{
    let mut listening = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.listen().await }
    });

    tokio::select! {
        joined = &mut listening => return joined?,
        () = signal => {}
    }

    tracing::info!("Shutting down HTTP server");
    if let Err(e) = server.shutdown(grace).await {
        listening.abort();
        return Err(e);
    }
    listening.await?
}

/// [`serve_until`] driven by SIGINT/SIGTERM.
pub async fn serve_until_signal<S>(server: Arc<S>, grace: Duration) -> Result<()>
where
    S: HttpServer + ?Sized,
{
    let signal = async {
        if let Err(e) = signals::wait_for_shutdown().await {
            tracing::error!(error = %e, "Signal handling failed, shutting down");
        }
    };
    serve_until(server, signal, grace).await
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn serves_until_signalled() {
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let server = Arc::new(AxumServer::bind("127.0.0.1:0", router).await.unwrap());
        let addr = server.local_addr();
        let (tx, rx) = oneshot::channel::<()>();

        let running = tokio::spawn(serve_until(
            Arc::clone(&server),
            async move {
                let _ = rx.await;
            },
            Duration::from_secs(2),
        ));

        let response = raw_get(addr, "/ping").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("pong"));

        tx.send(()).unwrap();
        running.await.unwrap().unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_deadline_aborts_in_flight_requests() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let server = Arc::new(AxumServer::bind("127.0.0.1:0", router).await.unwrap());
        let addr = server.local_addr();
        let (tx, rx) = oneshot::channel::<()>();

        let running = tokio::spawn(serve_until(
            Arc::clone(&server),
            async move {
                let _ = rx.await;
            },
            Duration::from_millis(100),
        ));

        let in_flight = tokio::spawn(async move { raw_get(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        tx.send(()).unwrap();
        let err = running.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("graceful shutdown"));
        in_flight.abort();
    }

    #[tokio::test]
    async fn shutdown_before_listen_is_immediate() {
        let server = AxumServer::bind("127.0.0.1:0", Router::new()).await.unwrap();
        server.shutdown(Duration::from_millis(10)).await.unwrap();
        assert!(server.listen().await.is_err());
    }
}
