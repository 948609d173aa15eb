// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Request admission plumbing: prefetch back-pressure, the in-flight
//! counter, and the pump that turns a blocking client iterator into an
//! async stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::proto::DataRequest;

/// Bounded admission: at most `prefetch` requests in flight, 0 disables.
///
/// A permit is acquired *before* the next request is read from the client,
/// and released when the request's traversal completes, so a fast client
/// can never run further than `prefetch` ahead of the data plane.
#[derive(Clone)]
pub struct PrefetchGate {
    semaphore: Option<Arc<Semaphore>>,
}

impl PrefetchGate {
    pub fn new(prefetch: usize) -> Self {
        Self {
            semaphore: (prefetch > 0).then(|| Arc::new(Semaphore::new(prefetch))),
        }
    }

    pub async fn admit(&self) -> Option<OwnedSemaphorePermit> {
        match &self.semaphore {
            // acquire() only fails on a closed semaphore, which we never do
            Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
            None => None,
        }
    }
}

/// Count of requests currently walking the graph.
#[derive(Clone, Default)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn begin(&self) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

/// Decrements the in-flight count when dropped, including when the owning
/// task is aborted by a client disconnect.
pub struct InFlightGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Pump a blocking (synchronous) request iterator on a dedicated thread so
/// it never stalls the event loop. The channel capacity of one keeps the
/// thread lazily paced by the consumer.
pub fn pump_blocking<I>(iter: I) -> mpsc::Receiver<DataRequest>
where
    I: Iterator<Item = DataRequest> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for request in iter {
            if tx.blocking_send(request).is_err() {
                // consumer went away, stop pulling from the iterator
                break;
            }
        }
    });
    rx
}
