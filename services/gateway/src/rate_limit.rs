use crate::config::RateLimitSettings;
use crate::error::AppError;
use dashmap::DashMap;
use std::time::Instant;

#[derive(Clone)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

impl Bucket {
    fn full(settings: &RateLimitSettings) -> Self {
        Self {
            tokens: f64::from(settings.capacity),
            last_update: Instant::now(),
        }
    }

    fn try_take(&mut self, settings: &RateLimitSettings) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = f64::min(
            f64::from(settings.capacity),
            self.tokens + elapsed * settings.refill_per_sec,
        );
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token buckets keyed by `caller:route`
pub struct RateLimiter {
    settings: RateLimitSettings,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            buckets: DashMap::new(),
        }
    }

    pub fn check(&self, caller: &str, route: &str) -> Result<(), AppError> {
        let key = format!("{caller}:{route}");
        let mut bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| Bucket::full(&self.settings));

        if bucket.try_take(&self.settings) {
            Ok(())
        } else {
            tracing::warn!(key = %key, "Rate limit exceeded");
            Err(AppError::RateLimitExceeded(key))
        }
    }
}
