//! TCP listener with bind restarts and a bounded session pool

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::command::CommandDispatcher;
use crate::session::{ConnectionSession, SessionConfig};
use crate::status::StatusBoard;
use crate::transport::TcpTransportStream;

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind `addr`, retrying while the address is still in use
///
/// Any other bind error is returned immediately.
pub async fn bind_with_retry(addr: &str, retries: u32, delay: Duration) -> Result<TcpListener> {
    let mut attempt = 0;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && attempt < retries => {
                attempt += 1;
                warn!(
                    "[LISTENER] {} in use, restarting in {:?} ({}/{})",
                    addr, delay, attempt, retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e).with_context(|| format!("failed to bind {}", addr)),
        }
    }
}

/// Accept loop serving sessions on a bound listener
pub struct NodeServer {
    listener: TcpListener,
    session_config: SessionConfig,
    dispatcher: Arc<CommandDispatcher>,
    status: StatusBoard,
    max_sessions: usize,
}

impl NodeServer {
    pub fn new(
        listener: TcpListener,
        session_config: SessionConfig,
        dispatcher: Arc<CommandDispatcher>,
        status: StatusBoard,
        max_sessions: usize,
    ) -> Self {
        Self {
            listener,
            session_config,
            dispatcher,
            status,
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` completes
    ///
    /// At most `max_sessions` sessions run at once; further peers wait in
    /// the accept backlog.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let permits = Arc::new(Semaphore::new(self.max_sessions));
        tokio::pin!(shutdown);

        info!(
            "[LISTENER] serving on {} (max {} sessions)",
            self.local_addr()?,
            self.max_sessions
        );
        self.status.ready().await;

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = permits.clone().acquire_owned() => {
                    permit.context("session semaphore closed")?
                }
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("[LISTENER] accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!("[LISTENER] set_nodelay for {}: {}", peer, e);
            }

            let session = ConnectionSession::new(
                TcpTransportStream::new(stream, peer),
                self.session_config.clone(),
                self.dispatcher.clone(),
                self.status.clone(),
            );
            tokio::spawn(async move {
                let _permit = permit;
                session.run().await;
            });
        }

        info!("[LISTENER] shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::handlers::test_support::context;
    use crate::status::test_support::recording_board;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_bind_error_other_than_in_use_fails_fast() {
        let err = bind_with_retry("not-an-address", 3, Duration::from_secs(10)).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_bind_retries_until_address_frees() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = holder.local_addr().expect("addr").to_string();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            drop(holder);
        });

        let listener = bind_with_retry(&addr, 20, Duration::from_millis(50))
            .await
            .expect("bind after release");
        assert_eq!(listener.local_addr().expect("addr").to_string(), addr);
        release.await.expect("join");
    }

    #[tokio::test]
    async fn test_serves_line_client_over_tcp() {
        let listener = bind_with_retry("127.0.0.1:0", 0, Duration::ZERO)
            .await
            .expect("bind");
        let (board, _display) = recording_board(None);
        let server = NodeServer::new(
            listener,
            SessionConfig::default(),
            Arc::new(CommandDispatcher::new(context())),
            board,
            1,
        );
        let addr = server.local_addr().expect("addr");

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"{\"command\":\"ping\"}\n")
            .await
            .expect("write");
        let mut lines = BufReader::new(read_half).lines();
        let reply = lines.next_line().await.expect("read").expect("line");
        assert!(reply.contains("\"pong\""));

        stop_tx.send(()).expect("stop");
        handle.await.expect("join").expect("server");
    }
}
