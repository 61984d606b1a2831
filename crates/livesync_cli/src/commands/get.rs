//! Get command implementation.

use super::{print_value, Session};
use livesync_codec::Path;

/// Runs the get command.
pub fn run(session: &Session, path: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let connection = session.open()?;
    let value = connection.get(Path::parse_arg(path)).wait()?;
    print_value(&value, format)
}
