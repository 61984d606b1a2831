//! In-flight requests and their single-assignment result slots.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::config::RequestPolicy;
use crate::error::{ClientError, ClientResult, RequestError, RequestResult};
use livesync_codec::Value;
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// The write half of a request's result.
///
/// The sender is taken on the first resolve, so a second resolve can
/// only report [`ClientError::AlreadyResolved`].
#[derive(Debug)]
pub struct ResultSlot {
    request_id: u64,
    sender: Mutex<Option<oneshot::Sender<RequestResult>>>,
}

impl ResultSlot {
    /// Creates a slot and the future that observes it.
    pub fn new(request_id: u64) -> (Self, ResponseFuture) {
        let (sender, receiver) = oneshot::channel();
        let slot = Self {
            request_id,
            sender: Mutex::new(Some(sender)),
        };
        let future = ResponseFuture {
            request_id,
            receiver,
        };
        (slot, future)
    }

    /// Stores the result. Never blocks.
    ///
    /// A caller that dropped its future is not an error; the result is
    /// discarded.
    pub fn resolve(&self, result: RequestResult) -> ClientResult<()> {
        let sender = self
            .sender
            .lock()
            .take()
            .ok_or(ClientError::AlreadyResolved(self.request_id))?;
        let _ = sender.send(result);
        Ok(())
    }

    /// Returns true once a result has been stored.
    pub fn is_resolved(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Future returned by `Connection::request` and `Connection::get`.
///
/// Await it from async code, or call [`ResponseFuture::wait`] from a
/// plain thread.
#[derive(Debug)]
pub struct ResponseFuture {
    request_id: u64,
    receiver: oneshot::Receiver<RequestResult>,
}

impl ResponseFuture {
    /// Id assigned to the request.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Blocks the current thread until the request settles.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime; await the future
    /// there instead.
    pub fn wait(self) -> RequestResult {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(RequestError::Disconnected))
    }

    /// Returns the result if the request has already settled.
    pub fn try_result(&mut self) -> Option<RequestResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(RequestError::Disconnected)),
        }
    }
}

impl Future for ResponseFuture {
    type Output = RequestResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(RequestError::Disconnected)))
    }
}

/// One outstanding call, owned by the connection's waiting or queued list.
#[derive(Debug)]
pub(crate) struct Request {
    pub(crate) id: u64,
    pub(crate) message: Value,
    pub(crate) created_at: Instant,
    pub(crate) policy: RequestPolicy,
    pub(crate) deadline: Option<Instant>,
    slot: ResultSlot,
}

impl Request {
    pub(crate) fn new(
        id: u64,
        message: Value,
        policy: RequestPolicy,
        created_at: Instant,
    ) -> (Self, ResponseFuture) {
        let (slot, future) = ResultSlot::new(id);
        let request = Self {
            id,
            message,
            created_at,
            policy,
            deadline: policy.deadline_from(created_at),
            slot,
        };
        (request, future)
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Applies the disconnect grace period.
    pub(crate) fn requeue(&mut self, now: Instant) {
        self.deadline = self.policy.requeue_deadline(self.deadline, now);
    }

    /// Settles the request, consuming it.
    pub(crate) fn settle(self, result: RequestResult) {
        if let Err(e) = self.slot.resolve(result) {
            tracing::error!(request_id = self.id, error = %e, "request settled twice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn second_resolve_is_an_error() {
        let (slot, future) = ResultSlot::new(3);
        slot.resolve(Ok(Value::from(1))).unwrap();
        let err = slot.resolve(Err(RequestError::Timeout)).unwrap_err();
        assert!(matches!(err, ClientError::AlreadyResolved(3)));
        assert_eq!(future.wait(), Ok(Value::from(1)));
    }

    #[test]
    fn racing_resolvers_have_one_winner() {
        for _ in 0..50 {
            let (slot, future) = ResultSlot::new(1);
            let slot = Arc::new(slot);
            let barrier = Arc::new(Barrier::new(8));
            let wins = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let slot = Arc::clone(&slot);
                    let barrier = Arc::clone(&barrier);
                    let wins = Arc::clone(&wins);
                    thread::spawn(move || {
                        barrier.wait();
                        let result = if i % 2 == 0 {
                            Ok(Value::from(i as i64))
                        } else {
                            Err(RequestError::Timeout)
                        };
                        if slot.resolve(result).is_ok() {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(wins.load(Ordering::SeqCst), 1);
            assert!(slot.is_resolved());
            let _ = future.wait();
        }
    }

    #[test]
    fn dropped_future_does_not_fail_resolve() {
        let (slot, future) = ResultSlot::new(9);
        drop(future);
        assert!(slot.resolve(Ok(Value::Null)).is_ok());
    }

    #[test]
    fn abandoned_slot_reads_as_disconnected() {
        let (slot, mut future) = ResultSlot::new(2);
        assert_eq!(future.try_result(), None);
        drop(slot);
        assert_eq!(future.try_result(), Some(Err(RequestError::Disconnected)));
    }

    #[test]
    fn requeue_shortens_deadline() {
        let start = Instant::now();
        let policy = RequestPolicy::new()
            .with_timeout(Duration::from_secs(10))
            .with_sent_timeout(Duration::from_millis(100));
        let (mut request, _future) = Request::new(1, Value::Null, policy, start);
        assert_eq!(request.deadline, Some(start + Duration::from_secs(10)));

        request.requeue(start);
        assert_eq!(request.deadline, Some(start + Duration::from_millis(100)));
        assert!(request.is_expired(start + Duration::from_millis(100)));
        assert!(!request.is_expired(start + Duration::from_millis(99)));
    }

    #[tokio::test]
    async fn future_can_be_awaited() {
        let (slot, future) = ResultSlot::new(5);
        assert_eq!(future.request_id(), 5);
        slot.resolve(Err(RequestError::Remote(Value::from("nope"))))
            .unwrap();
        assert_eq!(
            future.await,
            Err(RequestError::Remote(Value::from("nope")))
        );
    }
}
