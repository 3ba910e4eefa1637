//! WebSocket transport backed by `tungstenite`.
//!
//! The socket is blocking with a short read timeout, so `poll` returns once
//! the kernel buffer is drained or a per-poll frame limit is reached.

use std::io;
use std::net::TcpStream;
use std::time::Duration;
use tracing::{debug, warn};
use tungstenite::protocol::Message;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, WebSocket};
use url::Url;

use crate::error::TransportError;
use crate::state::connection::{Transport, TransportEvent};

/// How long one `poll` waits for the next frame before giving up.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Frames read by one `poll` before yielding back to the caller.
pub const DEFAULT_MAX_FRAMES_PER_POLL: usize = 256;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
pub struct WsTransport {
    socket: Option<Socket>,
    read_timeout: Duration,
    max_frames_per_poll: usize,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::with_read_timeout(DEFAULT_READ_TIMEOUT)
    }

    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        Self {
            socket: None,
            read_timeout,
            max_frames_per_poll: DEFAULT_MAX_FRAMES_PER_POLL,
        }
    }

    /// Cap on frames returned by one `poll`. Zero is treated as one.
    pub fn with_frame_limit(mut self, max_frames_per_poll: usize) -> Self {
        self.max_frames_per_poll = max_frames_per_poll.max(1);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn set_read_timeout(socket: &mut Socket, timeout: Duration) -> io::Result<()> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

fn map_connect_error(err: WsError) -> TransportError {
    match err {
        WsError::Io(err) if err.kind() == io::ErrorKind::ConnectionRefused => {
            TransportError::Refused(err.to_string())
        }
        WsError::Io(err) => TransportError::Io(err),
        other => TransportError::Handshake(other.to_string()),
    }
}

fn map_send_error(err: WsError) -> TransportError {
    match err {
        WsError::Io(err) => TransportError::Io(err),
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Handshake(other.to_string()),
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

impl Transport for WsTransport {
    fn open(&mut self, url: &Url) -> Result<(), TransportError> {
        self.close();
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
        }

        let (mut socket, response) = tungstenite::connect(url.as_str()).map_err(map_connect_error)?;
        set_read_timeout(&mut socket, self.read_timeout)?;
        debug!(status = %response.status(), "websocket handshake complete");
        self.socket = Some(socket);
        Ok(())
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::Closed)?;
        socket
            .send(Message::Text(text.to_string()))
            .map_err(map_send_error)
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(err) = socket.close(None).and_then(|_| socket.flush()) {
                debug!(%err, "websocket close");
            }
        }
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let Some(socket) = self.socket.as_mut() else {
            return events;
        };

        let closed = loop {
            if events.len() >= self.max_frames_per_poll {
                break None;
            }
            match socket.read() {
                Ok(Message::Text(text)) => events.push(TransportEvent::Frame(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => events.push(TransportEvent::Frame(text)),
                    Err(_) => warn!("dropping non-utf8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    // Send the queued close reply before letting go.
                    let _ = socket.flush();
                    break Some(
                        frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                            .unwrap_or_else(|| "closed by peer".to_string()),
                    );
                }
                Ok(_) => {}
                Err(WsError::Io(err)) if is_timeout(&err) => break None,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    break Some("connection closed".to_string())
                }
                Err(err) => break Some(err.to_string()),
            }
        };

        if let Some(reason) = closed {
            self.socket = None;
            events.push(TransportEvent::Closed { reason });
        }
        events
    }
}
