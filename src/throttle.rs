use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use leaky_bucket::RateLimiter;
use tracing::{debug, info};

use crate::stage::{SendResult, Stage};
use crate::types::DiscoveredKey;

// Refill in 100ms slices.
const REFILL_PER_INTERVAL_DIVIDER: u32 = 10;

/// Token bucket admitting `burst` elements at once and `elements_per_second`
/// sustained.
///
/// The refill interval is chosen so that `refill / interval` equals the
/// configured rate exactly, also for rates that are not multiples of ten.
pub fn build_rate_limiter(elements_per_second: u32, burst: u32) -> RateLimiter {
    let refill = (elements_per_second / REFILL_PER_INTERVAL_DIVIDER).max(1);
    let interval = Duration::from_secs_f64(refill as f64 / elements_per_second.max(1) as f64);

    RateLimiter::builder()
        .max(burst as usize)
        .initial(burst as usize)
        .refill(refill as usize)
        .interval(interval)
        .fair(true)
        .build()
}

/// Rate shaper between discovery and the read stage.
///
/// Waits for a token per element; elements are delayed, never dropped.
/// Waiting observes the cancellation token, so a cancelled run stops
/// admitting immediately.
pub struct Throttle {
    stage: Stage<DiscoveredKey, DiscoveredKey>,
    rate_limiter: Arc<RateLimiter>,
}

impl Throttle {
    pub fn new(stage: Stage<DiscoveredKey, DiscoveredKey>) -> Self {
        let rate_limiter = Arc::new(build_rate_limiter(
            stage.config.elements_per_second,
            stage.config.request_throttle_burst,
        ));
        Self {
            stage,
            rate_limiter,
        }
    }

    pub async fn throttle(&self) -> Result<()> {
        debug!(
            elements_per_second = self.stage.config.elements_per_second,
            burst = self.stage.config.request_throttle_burst,
            "throttle has started."
        );

        while let Some(key) = self.stage.recv_unless_cancelled().await? {
            tokio::select! {
                biased;
                _ = self.stage.cancellation_token.cancelled() => {
                    info!("throttle cancelled.");
                    break;
                }
                _ = self.rate_limiter.acquire_one() => {}
            }

            if self.stage.send(key).await? == SendResult::Closed {
                debug!("downstream closed, throttle stops.");
                break;
            }
        }

        debug!("throttle has been completed.");
        Ok(())
    }
}
