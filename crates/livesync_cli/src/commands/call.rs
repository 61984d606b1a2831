//! Call command implementation.

use super::{print_value, Session};
use livesync_codec::from_json;

/// Runs the call command.
pub fn run(
    session: &Session,
    method: &str,
    args: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let args = from_json(args).map_err(|e| format!("Invalid arguments: {e}"))?;
    let connection = session.open()?;
    let value = connection.request(method, args).wait()?;
    print_value(&value, format)
}
