//! FIFO buffer for calls made while offline.
//!
//! Nothing here is persisted: queued calls are lost if the process exits.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::request::RequestDescriptor;
use super::response::ApiResponse;
use crate::error::Result;

/// A call waiting for connectivity.
#[derive(Debug)]
pub struct PendingRequest {
    pub id: Uuid,
    pub descriptor: RequestDescriptor,
    pub enqueued_at: DateTime<Utc>,
    responder: oneshot::Sender<Result<ApiResponse>>,
}

/// Outcome counts of one [`OfflineQueue::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    /// Callers that stopped waiting before their turn; not dispatched.
    pub abandoned: usize,
}

#[derive(Debug, Default)]
pub struct OfflineQueue {
    pending: Mutex<VecDeque<PendingRequest>>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl OfflineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call; the receiver resolves when the call is replayed.
    pub fn enqueue(
        &self,
        descriptor: RequestDescriptor,
    ) -> (Uuid, oneshot::Receiver<Result<ApiResponse>>) {
        let (responder, receiver) = oneshot::channel();
        let id = Uuid::new_v4();
        let pending = PendingRequest {
            id,
            descriptor,
            enqueued_at: Utc::now(),
            responder,
        };
        tracing::debug!(
            id = %pending.id,
            method = %pending.descriptor.method,
            url = %pending.descriptor.url,
            "queued request while offline"
        );
        self.lock().push_back(pending);
        (id, receiver)
    }

    /// Remove a call that has not been replayed yet.
    ///
    /// Returns false once a flush has already taken it.
    pub fn cancel(&self, id: Uuid) -> bool {
        let mut pending = self.lock();
        match pending.iter().position(|entry| entry.id == id) {
            Some(index) => {
                pending.remove(index);
                tracing::debug!(id = %id, "removed queued request");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a flush holds the queue, including while it awaits the
    /// call it has just popped.
    pub fn is_draining(&self) -> bool {
        self.flush_lock.try_lock().is_err()
    }

    /// Replay queued calls one at a time, in submission order.
    ///
    /// Each call is awaited to completion before the next is popped. A
    /// failure only rejects its own caller. Draining stops early, leaving the
    /// rest queued, as soon as `is_online` reports false. Calls queued while
    /// the flush runs are drained by it too.
    pub async fn flush<O, F, Fut>(&self, is_online: O, mut dispatch: F) -> FlushReport
    where
        O: Fn() -> bool,
        F: FnMut(RequestDescriptor) -> Fut,
        Fut: Future<Output = Result<ApiResponse>>,
    {
        let _flushing = self.flush_lock.lock().await;
        let mut report = FlushReport::default();

        while is_online() {
            let Some(pending) = self.lock().pop_front() else {
                break;
            };
            if pending.responder.is_closed() {
                tracing::debug!(id = %pending.id, "caller stopped waiting; dropping queued request");
                report.abandoned += 1;
                continue;
            }

            let result = dispatch(pending.descriptor).await;
            match &result {
                Ok(_) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(id = %pending.id, error = %err, "queued request failed on replay");
                    report.failed += 1;
                }
            }
            let _ = pending.responder.send(result);
        }

        if report != FlushReport::default() {
            tracing::info!(
                delivered = report.delivered,
                failed = report.failed,
                abandoned = report.abandoned,
                remaining = self.len(),
                "offline queue flushed"
            );
        }
        report
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
