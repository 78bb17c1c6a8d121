use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

use crate::error::AppError;

/// Slots for scans running their synchronous stages, sized from `MAX_CONCURRENT_SCANS`.
#[derive(Debug)]
pub struct ScanSlots {
    semaphore: Semaphore,
    capacity: usize,
    total: AtomicU64,
    rejected: AtomicU64,
}

impl ScanSlots {
    pub fn new(max_concurrent_scans: usize) -> Self {
        info!(max_concurrent_scans, "Initializing scan slots");
        Self {
            semaphore: Semaphore::new(max_concurrent_scans),
            capacity: max_concurrent_scans,
            total: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Counts the attempt and takes a slot, or counts a rejection.
    pub fn try_acquire(&self) -> Result<SemaphorePermit<'_>, AppError> {
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        self.semaphore.try_acquire().map_err(|_| {
            let rejected = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(total_scans = total, rejected_scans = rejected, "Too many concurrent scans");
            AppError::RateLimitExceeded
        })
    }

    /// (total, rejected, available) scan slot counters.
    pub fn metrics(&self) -> (u64, u64, usize) {
        (
            self.total.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.available(),
        )
    }
}

/// Limits concurrent scan uploads. Status polling and health checks are not counted.
pub async fn rate_limit_middleware(
    State(slots): State<Arc<ScanSlots>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() != Method::POST {
        return Ok(next.run(request).await);
    }

    let _permit = slots.try_acquire()?;
    debug!(
        path = %request.uri().path(),
        available_permits = slots.available(),
        "Scan slot acquired"
    );

    Ok(next.run(request).await)
}
