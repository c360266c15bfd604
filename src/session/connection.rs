//! Connection session lifecycle

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{negotiate, Channel, CodecMode, SessionConfig, SessionError};
use crate::command::{CommandDispatcher, CommandResult};
use crate::status::StatusBoard;
use crate::transport::TransportStream;
use dezero_shared::close_code;

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Peer closed before sending anything
    NoData,
    /// Stream ended or channel closed normally
    Closed { mode: CodecMode, messages: usize },
    /// Transport, protocol or handshake failure
    Failed { error: SessionError },
}

/// Owns one accepted connection from negotiation to teardown
pub struct ConnectionSession<S> {
    stream: S,
    peer: String,
    config: SessionConfig,
    dispatcher: Arc<CommandDispatcher>,
    status: StatusBoard,
}

impl<S: TransportStream> ConnectionSession<S> {
    pub fn new(
        stream: S,
        config: SessionConfig,
        dispatcher: Arc<CommandDispatcher>,
        status: StatusBoard,
    ) -> Self {
        let peer = stream.peer_label();
        Self {
            stream,
            peer,
            config,
            dispatcher,
            status,
        }
    }

    /// Serve the connection until it ends
    ///
    /// The stream is always released before the status board goes back to
    /// "ready", whatever the outcome.
    pub async fn run(self) -> SessionOutcome {
        let Self {
            stream,
            peer,
            config,
            dispatcher,
            status,
        } = self;

        info!("[SESSION] {} connected", peer);
        status.client_connected(&peer).await;

        let outcome = serve(stream, &config, &dispatcher).await;
        match &outcome {
            SessionOutcome::NoData => info!("[SESSION] {} closed without data", peer),
            SessionOutcome::Closed { mode, messages } => {
                info!("[SESSION] {} closed ({}, {} messages)", peer, mode, messages)
            }
            SessionOutcome::Failed { error } => warn!("[SESSION] {} failed: {}", peer, error),
        }

        status.ready().await;
        outcome
    }
}

/// Negotiate and pump; consumes the stream so every path drops it
async fn serve<S: TransportStream>(
    stream: S,
    config: &SessionConfig,
    dispatcher: &CommandDispatcher,
) -> SessionOutcome {
    let mut channel = match negotiate(stream, config).await {
        Ok(Some(channel)) => channel,
        Ok(None) => return SessionOutcome::NoData,
        Err(error) => return SessionOutcome::Failed { error },
    };

    let mode = channel.mode();
    debug!("[SESSION] negotiated {}", mode);

    let result = pump(&mut channel, dispatcher).await;
    if let Err(e) = channel.close(close_code::NORMAL, "").await {
        debug!("[SESSION] close: {}", e);
    }
    if let Err(e) = channel.shutdown().await {
        debug!("[SESSION] shutdown: {}", e);
    }

    match result {
        Ok(messages) => SessionOutcome::Closed { mode, messages },
        Err(error) => SessionOutcome::Failed { error },
    }
}

/// Decode → dispatch → respond, one message at a time
async fn pump<S: TransportStream>(
    channel: &mut Channel<S>,
    dispatcher: &CommandDispatcher,
) -> Result<usize, SessionError> {
    let mut handled = 0;
    while let Some(message) = channel.recv().await? {
        handled += 1;
        if let CommandResult::Ignored { reason } = dispatcher.dispatch(&message, channel).await? {
            debug!("[SESSION] message {} ignored: {}", handled, reason);
        }
        if !channel.is_open() {
            break;
        }
    }
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::handlers::test_support::{context, context_with, StubDelegate};
    use crate::delegate::ExecutionResult;
    use crate::device::NoScanner;
    use crate::status::test_support::{recording_board, RecordingDisplay};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use dezero_shared::codec::{self, encode};
    use dezero_shared::{Frame, Opcode, Role};
    use bytes::BytesMut;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};

    const UPGRADE: &[u8] =
        b"GET / HTTP/1.1\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

    fn session(
        dispatcher: CommandDispatcher,
    ) -> (ConnectionSession<DuplexStream>, DuplexStream, RecordingDisplay) {
        let (server, peer) = tokio::io::duplex(64 * 1024);
        let (board, display) = recording_board(Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
        let config = SessionConfig {
            handshake_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        };
        let session = ConnectionSession::new(server, config, Arc::new(dispatcher), board);
        (session, peer, display)
    }

    fn last_status(display: &RecordingDisplay) -> (String, String) {
        display.lines.lock().expect("lock").last().cloned().expect("status line")
    }

    #[tokio::test]
    async fn test_line_mode_device_info_round_trip() {
        let (session, peer, display) = session(CommandDispatcher::new(context()));
        let task = tokio::spawn(session.run());

        let (read_half, mut write_half) = tokio::io::split(peer);
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"command\":\"get_device_info\"}\n")
            .await
            .expect("write");
        let line = lines.next_line().await.expect("read").expect("line");
        let info: serde_json::Value = serde_json::from_str(&line).expect("json");
        assert_eq!(info["type"], "device_info");

        write_half.shutdown().await.expect("shutdown");
        assert!(lines.next_line().await.expect("read").is_none());

        let outcome = task.await.expect("join");
        assert!(matches!(
            outcome,
            SessionOutcome::Closed { mode: CodecMode::LineJson, messages: 1 }
        ));
        assert_eq!(last_status(&display), ("READY".into(), "10.0.0.2".into()));
    }

    #[tokio::test]
    async fn test_delegate_failure_keeps_connection_open() {
        let delegate = Arc::new(StubDelegate::new(ExecutionResult::failure("boom")));
        let dispatcher = CommandDispatcher::new(context_with(Arc::new(NoScanner), delegate));
        let (session, peer, _display) = session(dispatcher);
        let task = tokio::spawn(session.run());

        let (read_half, mut write_half) = tokio::io::split(peer);
        let mut lines = BufReader::new(read_half).lines();

        let command = format!(
            "{{\"command\":\"execute_script\",\"script\":\"{}\"}}\n",
            BASE64.encode("tool: nope")
        );
        write_half.write_all(command.as_bytes()).await.expect("write");

        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(lines.next_line().await.expect("read").expect("line"));
        }
        assert_eq!(got[0], "--- Executing Script ---");
        assert_eq!(got[1], "Script Error: boom");
        assert_eq!(got[2], "--- Execution Finished ---");

        // still serving
        write_half
            .write_all(b"{\"command\":\"ping\"}\n")
            .await
            .expect("write");
        let pong = lines.next_line().await.expect("read").expect("line");
        assert!(pong.contains("\"pong\""));

        write_half.shutdown().await.expect("shutdown");
        assert!(matches!(
            task.await.expect("join"),
            SessionOutcome::Closed { messages: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_multi_line_failure_is_three_lines() {
        let delegate = Arc::new(StubDelegate::new(ExecutionResult::failure(
            "Traceback (most recent call last):\n  File \"<stdin>\", line 1\nNameError: x",
        )));
        let dispatcher = CommandDispatcher::new(context_with(Arc::new(NoScanner), delegate));
        let (session, peer, _display) = session(dispatcher);
        let task = tokio::spawn(session.run());

        let (read_half, mut write_half) = tokio::io::split(peer);
        let mut lines = BufReader::new(read_half).lines();

        let command = format!(
            "{{\"command\":\"execute_script\",\"script\":\"{}\"}}\n{{\"command\":\"ping\"}}\n",
            BASE64.encode("import sys")
        );
        write_half.write_all(command.as_bytes()).await.expect("write");
        write_half.shutdown().await.expect("shutdown");

        let mut got = Vec::new();
        while let Some(line) = lines.next_line().await.expect("read") {
            got.push(line);
        }
        assert_eq!(got.len(), 4, "unexpected lines: {:?}", got);
        assert_eq!(got[0], "--- Executing Script ---");
        assert_eq!(
            got[1],
            "Script Error: Traceback (most recent call last): | File \"<stdin>\", line 1 | NameError: x"
        );
        assert_eq!(got[2], "--- Execution Finished ---");
        assert!(got[3].contains("\"pong\""));

        assert!(matches!(
            task.await.expect("join"),
            SessionOutcome::Closed { mode: CodecMode::LineJson, messages: 2 }
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_garbage_lines_are_silent() {
        let (session, peer, _display) = session(CommandDispatcher::new(context()));
        let task = tokio::spawn(session.run());

        let (read_half, mut write_half) = tokio::io::split(peer);
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"command\":\"self_destruct\"}\nnot json\n{\"command\":\"ping\"}\n")
            .await
            .expect("write");

        let first = lines.next_line().await.expect("read").expect("line");
        assert!(first.contains("\"pong\""));

        write_half.shutdown().await.expect("shutdown");
        assert!(lines.next_line().await.expect("read").is_none());
        assert!(matches!(
            task.await.expect("join"),
            SessionOutcome::Closed { messages: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_websocket_session_with_close() {
        let (session, mut peer, _display) = session(CommandDispatcher::new(context()));
        let task = tokio::spawn(session.run());

        peer.write_all(UPGRADE).await.expect("write");
        peer.write_all(&encode(&Frame::text(r#"{"command":"ping"}"#), Role::Client))
            .await
            .expect("write");
        peer.write_all(&encode(&Frame::close(close_code::NORMAL, ""), Role::Client))
            .await
            .expect("write");

        let mut raw = Vec::new();
        peer.read_to_end(&mut raw).await.expect("read");

        let end = dezero_shared::handshake::header_end(&raw).expect("headers");
        assert!(raw.starts_with(b"HTTP/1.1 101"));
        let mut buf = BytesMut::from(&raw[end..]);
        let pong = codec::decode(&mut buf, Role::Client, 1024)
            .expect("decode")
            .expect("frame");
        assert_eq!(pong.opcode, Opcode::Text);
        let close = codec::decode(&mut buf, Role::Client, 1024)
            .expect("decode")
            .expect("frame");
        assert_eq!(close.close_code(), Some(close_code::NORMAL));

        assert!(matches!(
            task.await.expect("join"),
            SessionOutcome::Closed { mode: CodecMode::WebSocket, messages: 1 }
        ));
    }

    #[tokio::test]
    async fn test_failure_still_returns_to_ready() {
        let (session, mut peer, display) = session(CommandDispatcher::new(context()));
        let task = tokio::spawn(session.run());

        peer.write_all(UPGRADE).await.expect("write");
        // unmasked frame from a client
        peer.write_all(&encode(&Frame::text("x"), Role::Server))
            .await
            .expect("write");

        let outcome = task.await.expect("join");
        assert!(matches!(
            outcome,
            SessionOutcome::Failed { error: SessionError::Protocol { .. } }
        ));
        assert_eq!(last_status(&display).0, "READY");

        // stream was released: the peer sees end of stream
        let mut raw = Vec::new();
        peer.read_to_end(&mut raw).await.expect("read");
    }

    #[tokio::test]
    async fn test_no_data_session() {
        let (session, peer, display) = session(CommandDispatcher::new(context()));
        drop(peer);

        assert!(matches!(session.run().await, SessionOutcome::NoData));
        let lines = display.lines.lock().expect("lock").clone();
        assert_eq!(lines[0].0, "CLIENT CONNECTED");
        assert_eq!(lines[0].1, "duplex");
        assert_eq!(lines[1].0, "READY");
    }
}
