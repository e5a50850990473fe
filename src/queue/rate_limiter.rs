use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// `{max, windowMs}` passed to `register_worker`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max: u32,
    pub window: Duration,
}

/// A fixed-window token bucket shared by every worker task bound to one
/// job name, so the concurrency-bounded pool as a whole respects the
/// rate limit rather than each task independently.
pub struct RateLimiter {
    limit: RateLimit,
    state: Mutex<(Instant, u32)>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        RateLimiter { limit, state: Mutex::new((Instant::now(), 0)) }
    }

    pub async fn acquire(&self) {
        if self.limit.max == 0 {
            return;
        }

        loop {
            let wait_for = {
                let mut state = self.state.lock().await;
                let (window_start, count) = *state;
                let now = Instant::now();

                if now.duration_since(window_start) >= self.limit.window {
                    *state = (now, 1);
                    return;
                }

                if count < self.limit.max {
                    state.1 += 1;
                    return;
                }

                (window_start + self.limit.window).saturating_duration_since(now)
            };

            tokio::time::sleep(wait_for).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_max_within_a_window_then_blocks() {
        let limiter = RateLimiter::new(RateLimit { max: 2, window: Duration::from_millis(100) });
        limiter.acquire().await;
        limiter.acquire().await;

        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
