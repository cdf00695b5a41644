// packages/bridge/src/interception/pending.rs
//! Pending-request table
//!
//! Maps each in-flight request id to the continuation waiting for it. An
//! entry is removed exactly once, and only whoever removes it may resolve
//! the continuation: a matching response, the timeout, a channel teardown,
//! or the caller abandoning the request. Everything that loses the race
//! finds no entry and does nothing.

use crate::channel::message::{ChannelId, RequestId, ResponseEnvelope};
use crate::interception::outcome::FetchFailure;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What a continuation receives
pub type Resolution = std::result::Result<ResponseEnvelope, FetchFailure>;

struct PendingRequest {
    channel_id: ChannelId,
    deadline: Instant,
    continuation: oneshot::Sender<Resolution>,
}

/// In-flight requests of one interceptor
pub struct PendingRequestTable {
    entries: DashMap<RequestId, PendingRequest>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a request and get the receiving end of its continuation
    pub fn insert(
        &self,
        request_id: RequestId,
        channel_id: ChannelId,
        deadline: Instant,
    ) -> oneshot::Receiver<Resolution> {
        let (continuation, receiver) = oneshot::channel();

        let previous = self.entries.insert(
            request_id.clone(),
            PendingRequest {
                channel_id,
                deadline,
                continuation,
            },
        );
        if previous.is_some() {
            // Dropping the old sender wakes its waiter with a closed channel
            warn!("Request id {} reused while still pending", request_id);
        }

        self.update_gauge();
        receiver
    }

    /// Remove the entry and hand `resolution` to its continuation
    ///
    /// Returns `false` if the entry was already gone.
    pub fn resolve(&self, request_id: &RequestId, resolution: Resolution) -> bool {
        let Some((_, pending)) = self.entries.remove(request_id) else {
            return false;
        };
        self.update_gauge();

        if Instant::now() > pending.deadline {
            debug!("Request {} resolved after its deadline", request_id);
        }

        if pending.continuation.send(resolution).is_err() {
            debug!("Waiter for {} already gone", request_id);
        }
        true
    }

    /// Deliver a resolver response
    pub fn complete(&self, request_id: &RequestId, envelope: ResponseEnvelope) -> bool {
        self.resolve(request_id, Ok(envelope))
    }

    /// Resolve with a timeout failure if still pending
    pub fn expire(&self, request_id: &RequestId) -> bool {
        self.resolve(request_id, Err(FetchFailure::Timeout))
    }

    /// Remove without resolving
    pub fn discard(&self, request_id: &RequestId) -> bool {
        let removed = self.entries.remove(request_id).is_some();
        if removed {
            self.update_gauge();
        }
        removed
    }

    /// Resolve every request sent over `channel_id` with `failure`
    pub fn fail_channel(&self, channel_id: &ChannelId, failure: FetchFailure) -> usize {
        let request_ids: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|entry| entry.value().channel_id == *channel_id)
            .map(|entry| entry.key().clone())
            .collect();

        request_ids
            .iter()
            .filter(|id| self.resolve(id, Err(failure.clone())))
            .count()
    }

    /// Guard that discards the entry when dropped
    pub fn track(&self, request_id: RequestId) -> PendingGuard<'_> {
        PendingGuard {
            table: self,
            request_id,
        }
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.contains_key(request_id)
    }

    pub fn deadline(&self, request_id: &RequestId) -> Option<Instant> {
        self.entries.get(request_id).map(|entry| entry.deadline)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update_gauge(&self) {
        metrics::gauge!("bridge_pending_requests").set(self.entries.len() as f64);
    }
}

impl Default for PendingRequestTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes an abandoned request from the table
///
/// If the future awaiting a response is dropped (the client went away), the
/// entry would otherwise stay behind until a response that may never come.
pub struct PendingGuard<'a> {
    table: &'a PendingRequestTable,
    request_id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.discard(&self.request_id) {
            debug!("Discarded abandoned request {}", self.request_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[tokio::test]
    async fn test_complete_resolves_once() {
        let table = PendingRequestTable::new();
        let id = RequestId::from("r1");
        let rx = table.insert(id.clone(), "c1".into(), later());

        assert!(table.complete(&id, ResponseEnvelope::ok("a", 200, "text/plain")));
        assert!(!table.complete(&id, ResponseEnvelope::ok("b", 200, "text/plain")));
        assert!(!table.expire(&id));

        let resolution = rx.await.unwrap().unwrap();
        assert_eq!(resolution.response, "a");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_expire_then_late_response_is_noop() {
        let table = PendingRequestTable::new();
        let id = RequestId::from("r2");
        let rx = table.insert(id.clone(), "c1".into(), later());

        assert!(table.expire(&id));
        assert!(!table.contains(&id));
        assert!(!table.complete(&id, ResponseEnvelope::ok("late", 200, "text/plain")));

        assert_eq!(rx.await.unwrap(), Err(FetchFailure::Timeout));
    }

    #[tokio::test]
    async fn test_fail_channel_only_touches_that_channel() {
        let table = PendingRequestTable::new();
        let a = table.insert("a".into(), "dead".into(), later());
        let b = table.insert("b".into(), "dead".into(), later());
        let _c = table.insert("c".into(), "alive".into(), later());

        let failed = table.fail_channel(&"dead".into(), FetchFailure::Disconnected);

        assert_eq!(failed, 2);
        assert_eq!(table.len(), 1);
        assert!(table.contains(&"c".into()));
        assert_eq!(a.await.unwrap(), Err(FetchFailure::Disconnected));
        assert_eq!(b.await.unwrap(), Err(FetchFailure::Disconnected));
    }

    #[tokio::test]
    async fn test_guard_discards_abandoned_entry() {
        let table = PendingRequestTable::new();
        let id = RequestId::from("r3");
        let _rx = table.insert(id.clone(), "c1".into(), later());

        {
            let _guard = table.track(id.clone());
        }

        assert!(!table.contains(&id));
        assert!(!table.complete(&id, ResponseEnvelope::ok("x", 200, "text/plain")));
    }

    #[tokio::test]
    async fn test_deadline_is_recorded() {
        let table = PendingRequestTable::new();
        let deadline = later();
        let _rx = table.insert("r4".into(), "c1".into(), deadline);
        assert_eq!(table.deadline(&"r4".into()), Some(deadline));
    }

    #[tokio::test]
    async fn test_concurrent_complete_and_expire_resolve_once() {
        use std::sync::Arc;

        for round in 0..50 {
            let table = Arc::new(PendingRequestTable::new());
            let id = RequestId::from(format!("race-{}", round));
            let rx = table.insert(id.clone(), "c1".into(), later());

            let t1 = {
                let table = Arc::clone(&table);
                let id = id.clone();
                tokio::spawn(async move {
                    table.complete(&id, ResponseEnvelope::ok("r", 200, "text/plain"))
                })
            };
            let t2 = {
                let table = Arc::clone(&table);
                let id = id.clone();
                tokio::spawn(async move { table.expire(&id) })
            };

            let won = [t1.await.unwrap(), t2.await.unwrap()];
            assert_eq!(won.iter().filter(|w| **w).count(), 1);
            assert!(rx.await.is_ok());
        }
    }
}
