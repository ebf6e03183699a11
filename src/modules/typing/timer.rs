use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Producer-side expiry for the local user's typing indicator. Owned by the
/// subscription that armed it; re-arming replaces the pending expiry and
/// dropping the timer cancels it.
#[derive(Debug, Default)]
pub struct TypingTimer {
    handle: Option<JoinHandle<()>>,
}

impl TypingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm<F>(&mut self, ttl: Duration, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        // deadline fixed here, not when the task first runs
        let deadline = Instant::now() + ttl;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_expire.await;
        }));
    }

    /// Returns whether a pending expiry was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TypingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        (fired, move || {
            let f = f.clone();
            Box::pin(async move {
                f.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_debounces_expiry() {
        let (fired, on_expire) = counter();
        let mut timer = TypingTimer::new();

        timer.arm(Duration::from_secs(5), on_expire());
        tokio::time::sleep(Duration::from_secs(4)).await;
        timer.arm(Duration::from_secs(5), on_expire());
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_counts_from_arm_not_first_poll() {
        let (fired, on_expire) = counter();
        let mut timer = TypingTimer::new();

        // the clock moves before the spawned task gets a chance to run
        timer.arm(Duration::from_secs(5), on_expire());
        tokio::time::advance(Duration::from_secs(4)).await;
        timer.arm(Duration::from_secs(5), on_expire());
        tokio::time::advance(Duration::from_secs(5)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_prevent_expiry() {
        let (fired, on_expire) = counter();

        let mut timer = TypingTimer::new();
        timer.arm(Duration::from_secs(5), on_expire());
        assert!(timer.cancel());
        assert!(!timer.cancel());

        {
            let mut dropped = TypingTimer::new();
            dropped.arm(Duration::from_secs(5), on_expire());
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
