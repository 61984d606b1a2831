//! Configuration for connections and requests.

use std::time::{Duration, Instant};

/// Default time a request may take before it fails with a timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default grace period a sent request keeps after the connection drops.
pub const DEFAULT_SENT_TIMEOUT: Duration = Duration::from_millis(2_300);

/// Per-request timeout and offline behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    /// Time from creation until the request fails, `None` to wait forever.
    pub timeout: Option<Duration>,
    /// Grace period granted to a sent request when the connection drops.
    pub sent_timeout: Duration,
    /// Keep the request across a disconnect and resend it on reconnect.
    pub queue_when_disconnected: bool,
}

impl RequestPolicy {
    /// Creates a policy with default values.
    pub fn new() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            sent_timeout: DEFAULT_SENT_TIMEOUT,
            queue_when_disconnected: false,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Removes the request timeout.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sets the grace period granted on disconnect.
    pub fn with_sent_timeout(mut self, sent_timeout: Duration) -> Self {
        self.sent_timeout = sent_timeout;
        self
    }

    /// Sets whether the request survives a disconnect.
    pub fn with_queue_when_disconnected(mut self, queue: bool) -> Self {
        self.queue_when_disconnected = queue;
        self
    }

    /// Deadline of a request created at `created_at`. A timeout too large
    /// to represent means no deadline.
    pub(crate) fn deadline_from(&self, created_at: Instant) -> Option<Instant> {
        self.timeout
            .and_then(|timeout| created_at.checked_add(timeout))
    }

    /// Deadline of a request moved back to the queue at `now`.
    pub(crate) fn requeue_deadline(&self, current: Option<Instant>, now: Instant) -> Option<Instant> {
        let grace = now.checked_add(self.sent_timeout);
        match (current, grace) {
            (Some(deadline), Some(grace)) => Some(deadline.min(grace)),
            (Some(deadline), None) => Some(deadline),
            (None, grace) => grace,
        }
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server URL, handed to the transport.
    pub url: String,
    /// Session id sent in `initializeSession`.
    pub session_id: String,
    /// Policy used by requests that do not pass their own.
    pub default_policy: RequestPolicy,
}

impl ConnectionConfig {
    /// Creates a configuration with a random session id.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            default_policy: RequestPolicy::default(),
        }
    }

    /// Sets the session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Sets the default request policy.
    pub fn with_default_policy(mut self, policy: RequestPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Sets the timeout of the default request policy.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_policy = self.default_policy.with_timeout(timeout);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("")
    }
}
