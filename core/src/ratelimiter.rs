//! Token-bucket pacing shared by probing tasks.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Permits are refilled at a fixed rate by a background task, which exits once
/// every clone of the limiter has been dropped.
#[derive(Clone)]
pub struct RateLimiter {
    sem: Arc<Semaphore>,
}

impl RateLimiter {
    /// Must be called from within a tokio runtime.
    pub fn new(tokens_per_sec: u32) -> Self {
        let sem = Arc::new(Semaphore::new(0));
        let weak: Weak<Semaphore> = Arc::downgrade(&sem);
        let interval_ms = (1000u32 / tokens_per_sec.max(1)).max(1) as u64;
        tokio::spawn(async move {
            let mut t = tokio::time::interval(Duration::from_millis(interval_ms));
            t.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                t.tick().await;
                let Some(sem) = weak.upgrade() else { break };
                // cap the bucket at one second's worth of tokens
                if sem.available_permits() < tokens_per_sec.max(1) as usize {
                    sem.add_permits(1);
                }
            }
        });
        RateLimiter { sem }
    }

    pub async fn acquire(&self) {
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paces_acquisitions() {
        let rl = RateLimiter::new(100);
        let start = tokio::time::Instant::now();
        for _ in 0..5 {
            rl.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
