//! Eventual self-healing of the client-side billing mirror.
//!
//! Mutations write their result into [`BillingStore`] optimistically. A
//! successful mutation also calls [`CacheReconciler::schedule_recheck`],
//! which (re)arms one delayed full refresh from the [`BillingFeed`]. If the
//! optimistic writes were right the refresh changes nothing; if they were not,
//! the server copy replaces them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::BillingError;
use crate::rails::BillingFeed;
use crate::store::BillingStore;

pub struct CacheReconciler {
    store: Arc<BillingStore>,
    feed: Arc<dyn BillingFeed>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl CacheReconciler {
    #[must_use]
    pub fn new(store: Arc<BillingStore>, feed: Arc<dyn BillingFeed>, delay: Duration) -> Self {
        Self {
            store,
            feed,
            delay,
            pending: Mutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel any pending refresh and arm a new one `delay` from now.
    pub fn schedule_recheck(&self) {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!("billing recheck ignored: reconciler cancelled");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("billing recheck skipped: no tokio runtime");
            return;
        };

        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = pending.take() {
            if !previous.is_finished() {
                tracing::debug!("billing recheck re-armed");
            }
            previous.abort();
        }

        let store = self.store.clone();
        let feed = self.feed.clone();
        let closed = self.closed.clone();
        let delay = self.delay;
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if closed.load(Ordering::Acquire) {
                return;
            }
            if let Err(error) = refresh_store(&store, feed.as_ref(), &closed).await {
                tracing::warn!(error = %error, "billing recheck failed");
            }
        }));
    }

    /// Refresh immediately, outside the debounce timer.
    pub async fn refresh_now(&self) -> Result<bool, BillingError> {
        refresh_store(&self.store, self.feed.as_ref(), &self.closed).await
    }

    #[must_use]
    pub fn has_pending_recheck(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Drop any pending refresh. Later `schedule_recheck` calls are no-ops.
    pub fn cancel(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(handle) = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for CacheReconciler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn refresh_store(
    store: &BillingStore,
    feed: &dyn BillingFeed,
    closed: &AtomicBool,
) -> Result<bool, BillingError> {
    let snapshot = feed.fetch_billing_snapshot().await?;
    if closed.load(Ordering::Acquire) {
        return Ok(false);
    }
    let drifted = store.replace_with_snapshot(snapshot)?;
    if drifted {
        tracing::warn!("billing cache drifted from server state; replaced with server copy");
    } else {
        tracing::debug!("billing cache consistent with server state");
    }
    Ok(drifted)
}
