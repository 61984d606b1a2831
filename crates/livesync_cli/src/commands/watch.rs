//! Watch command implementation.

use super::Session;
use livesync_client::{ConnectionStatus, Value};
use livesync_codec::{to_json, Path};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::info;

/// Runs the watch command.
///
/// Prints one line per signal applied to the projection, starting with
/// its current state.
pub fn run(
    session: &Session,
    path: &str,
    list: bool,
    count: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection = session.open()?;
    let path = Path::parse_arg(path);
    let (sender, receiver) = mpsc::channel::<(String, Value)>();

    let callback = move |name: &str, args: &Value| {
        let _ = sender.send((name.to_string(), args.clone()));
    };
    // Keep the projection alive for the whole watch.
    let _projection: Box<dyn std::any::Any> = if list {
        let projection = connection.list(path.clone());
        projection.observe(callback);
        Box::new(projection)
    } else {
        let projection = connection.value(path.clone());
        projection.observe(callback);
        Box::new(projection)
    };
    info!(path = %path, kind = if list { "list" } else { "value" }, "watching");

    let mut seen = 0usize;
    while count.is_none_or(|limit| seen < limit) {
        match receiver.recv_timeout(Duration::from_millis(200)) {
            Ok((name, args)) => {
                println!("{} {}", name, to_json(&args)?);
                seen += 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                if connection.status() == ConnectionStatus::Disconnected {
                    return Err("Connection closed".into());
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}
