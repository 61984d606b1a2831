//! CLI command implementations.

pub mod call;
pub mod get;
pub mod watch;

use livesync_client::{
    Connection, ConnectionConfig, ConnectionStatus, RequestPolicy, Value, WebSocketTransport,
};
use livesync_codec::{to_json, to_json_pretty};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Connection settings shared by every command.
#[derive(Debug, Clone)]
pub struct Session {
    /// Server URL.
    pub url: String,
    /// Session id; random when absent.
    pub session_id: Option<String>,
    /// Connect and request timeout.
    pub timeout: Duration,
}

impl Session {
    fn config(&self) -> ConnectionConfig {
        let policy = RequestPolicy::new().with_timeout(self.timeout);
        let config = ConnectionConfig::new(self.url.clone()).with_default_policy(policy);
        match &self.session_id {
            Some(id) => config.with_session_id(id.clone()),
            None => config,
        }
    }

    /// When `open` gives up, `None` when the timeout does not fit.
    fn connect_deadline(&self, now: Instant) -> Option<Instant> {
        now.checked_add(self.timeout)
    }

    /// Connects and waits for the link to open.
    pub fn open(&self) -> Result<Connection, Box<dyn std::error::Error>> {
        let connection = Connection::new(self.config(), WebSocketTransport::new(self.url.clone()))?;
        connection.connect()?;

        let deadline = self.connect_deadline(Instant::now());
        loop {
            match connection.status() {
                ConnectionStatus::Open => break,
                ConnectionStatus::Disconnected => {
                    let reason = connection
                        .stats()
                        .last_close
                        .map(|close| format!("{} ({})", close.reason, close.code))
                        .unwrap_or_else(|| "connection refused".to_string());
                    return Err(format!("Could not connect to {}: {}", self.url, reason).into());
                }
                ConnectionStatus::Connecting => {}
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(format!("Timed out connecting to {}", self.url).into());
            }
            thread::sleep(Duration::from_millis(10));
        }

        debug!(url = %self.url, session_id = connection.session_id(), "connected");
        Ok(connection)
    }
}

/// Prints a document in the requested format.
pub fn print_value(value: &Value, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => println!("{}", to_json(value)?),
        "text" => println!("{}", to_json_pretty(value)?),
        other => return Err(format!("Unknown output format: {other}").into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(timeout: Duration) -> Session {
        Session {
            url: "ws://localhost:1".to_string(),
            session_id: None,
            timeout,
        }
    }

    #[test]
    fn connect_deadline_handles_huge_timeouts() {
        let now = Instant::now();
        assert_eq!(
            session(Duration::from_secs(2)).connect_deadline(now),
            Some(now + Duration::from_secs(2))
        );
        assert_eq!(session(Duration::MAX).connect_deadline(now), None);
    }
}
