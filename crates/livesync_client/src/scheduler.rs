//! Timeout scheduler.
//!
//! One thread per connection sleeps on the connection's condition
//! variable until the earliest request deadline, or until the request
//! lists change, then fails every request whose deadline has passed.

use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::connection::Shared;
use crate::request::Request;
use tracing::debug;

pub(crate) fn spawn(shared: Weak<Shared>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("livesync-timeouts".into())
        .spawn(move || run(&shared))
}

fn run(connection: &Weak<Shared>) {
    debug!("timeout scheduler started");
    while let Some(shared) = connection.upgrade() {
        match sweep(&shared) {
            Some(expired) if !expired.is_empty() => shared.expire(expired),
            Some(_) => {}
            None => break,
        }
    }
    debug!("timeout scheduler stopped");
}

/// Takes expired requests, or sleeps until something may have expired.
///
/// Returns `None` once the connection shuts down.
fn sweep(shared: &Shared) -> Option<Vec<Request>> {
    let mut state = shared.state.lock();
    if state.shutdown {
        return None;
    }

    let expired = state.take_expired(Instant::now());
    if expired.is_empty() {
        match state.next_deadline() {
            Some(deadline) => {
                shared.wakeup.wait_until(&mut state, deadline);
            }
            None => shared.wakeup.wait(&mut state),
        }
    }
    Some(expired)
}
