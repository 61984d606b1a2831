//! WebSocket transport built on `tungstenite`.
//!
//! Each open spawns one I/O thread that owns the socket. Outgoing frames
//! reach it through a channel; the thread alternates between draining
//! that channel and reading with a short timeout, and reports everything
//! it sees through [`TransportEvents`].

use std::io;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};
use crate::transport::{Transport, TransportEvents, TransportState};
use parking_lot::Mutex;
use tracing::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

enum Command {
    Send(String),
    Close,
}

#[derive(Debug)]
struct Link {
    state: TransportState,
    commands: Option<Sender<Command>>,
}

/// A blocking WebSocket client transport.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    link: Arc<Mutex<Link>>,
}

impl WebSocketTransport {
    /// Creates a transport for `url` (`ws://` or `wss://` when the
    /// `tungstenite` TLS features are enabled).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            link: Arc::new(Mutex::new(Link {
                state: TransportState::Closed,
                commands: None,
            })),
        }
    }

    /// Server URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, events: TransportEvents) -> ClientResult<()> {
        let (sender, receiver) = mpsc::channel();
        {
            let mut link = self.link.lock();
            if link.state != TransportState::Closed {
                return Ok(());
            }
            link.state = TransportState::Connecting;
            link.commands = Some(sender);
        }

        let url = self.url.clone();
        let link = Arc::clone(&self.link);
        let spawned = thread::Builder::new()
            .name("livesync-websocket".into())
            .spawn(move || run(&url, &link, &receiver, &events));

        if let Err(e) = spawned {
            let mut link = self.link.lock();
            link.state = TransportState::Closed;
            link.commands = None;
            return Err(ClientError::transport_fatal(format!(
                "failed to start websocket thread: {e}"
            )));
        }
        Ok(())
    }

    fn send(&self, text: &str) -> ClientResult<()> {
        let link = self.link.lock();
        if link.state != TransportState::Open {
            return Err(ClientError::transport_retryable("websocket is not open"));
        }
        match &link.commands {
            Some(commands) => commands
                .send(Command::Send(text.to_string()))
                .map_err(|_| ClientError::transport_retryable("websocket thread stopped")),
            None => Err(ClientError::transport_retryable("websocket is not open")),
        }
    }

    fn close(&self) {
        let link = self.link.lock();
        if let Some(commands) = &link.commands {
            let _ = commands.send(Command::Close);
        }
    }

    fn state(&self) -> TransportState {
        self.link.lock().state
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn run(url: &str, link: &Mutex<Link>, commands: &Receiver<Command>, events: &TransportEvents) {
    let (code, reason, clean) = match tungstenite::connect(url) {
        Ok((mut socket, _response)) => {
            if let Err(e) = set_poll_timeout(&mut socket) {
                warn!(url, error = %e, "failed to set read timeout");
            }
            link.lock().state = TransportState::Open;
            debug!(url, "websocket open");
            events.on_open();
            pump(&mut socket, commands, events)
        }
        Err(e) => {
            warn!(url, error = %e, "websocket connect failed");
            (1006, e.to_string(), false)
        }
    };

    {
        let mut link = link.lock();
        link.state = TransportState::Closed;
        link.commands = None;
    }
    debug!(url, code, reason = %reason, clean, "websocket closed");
    events.on_close(code, &reason, clean);
}

fn set_poll_timeout(socket: &mut Socket) -> io::Result<()> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(POLL_INTERVAL)),
        _ => Ok(()),
    }
}

/// Moves frames until the socket closes. Returns how it closed.
fn pump(
    socket: &mut Socket,
    commands: &Receiver<Command>,
    events: &TransportEvents,
) -> (u16, String, bool) {
    let mut close_frame: Option<(u16, String)> = None;

    loop {
        loop {
            match commands.try_recv() {
                Ok(Command::Send(text)) => {
                    if let Err(e) = socket.send(Message::text(text)) {
                        return (1006, e.to_string(), false);
                    }
                }
                Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                    if let Err(e) = socket.close(None) {
                        return (1006, e.to_string(), false);
                    }
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if let Err(e) = events.on_message(text.as_str()) {
                    debug!(error = %e, "frame rejected");
                }
            }
            Ok(Message::Close(frame)) => {
                close_frame = Some(match frame {
                    Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                    None => (1005, String::new()),
                });
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                let (code, reason) = close_frame.unwrap_or((1000, String::new()));
                return (code, reason, true);
            }
            Err(e) => return (1006, e.to_string(), false),
        }
    }
}
