use crate::*;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub(crate) struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    scope: String,
}

impl RateLimiter {
    pub(crate) fn new(scope: &str) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            scope: scope.to_string(),
        }
    }

    pub(crate) async fn allow(&self, key: &str, cfg: &RateLimitConfig) -> bool {
        let now = Instant::now();
        let mut lock = self.buckets.lock().await;
        let bucket = lock.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: cfg.capacity,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + (elapsed * cfg.refill_per_sec)).min(cfg.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            tracing::debug!(scope = %self.scope, key, "rate limit exhausted");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bucket_drains_and_refills() {
        let limiter = RateLimiter::new("test");
        let cfg = RateLimitConfig {
            capacity: 2.0,
            refill_per_sec: 1000.0,
        };
        assert!(limiter.allow("10.0.0.1", &cfg).await);
        assert!(limiter.allow("10.0.0.1", &cfg).await);
        assert!(!limiter.allow("10.0.0.1", &cfg).await);
        // Separate keys have separate buckets.
        assert!(limiter.allow("10.0.0.2", &cfg).await);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(limiter.allow("10.0.0.1", &cfg).await);
    }
}
