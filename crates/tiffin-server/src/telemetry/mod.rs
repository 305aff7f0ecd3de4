pub(crate) mod metrics_endpoint;
pub(crate) mod rate_limiter;
