use crate::http::{make_request_id, with_request_id};
use crate::*;

const METRIC_SERVICE: &str = "tiffin";

fn percentile_ns(values: &[u64], pct: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut v = values.to_vec();
    v.sort_unstable();
    let idx = ((v.len() as f64 - 1.0) * pct).round() as usize;
    v[idx]
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let mut body = String::new();

    let req_counts = state.metrics.counts.lock().await.clone();
    let mut counted: Vec<((String, u16), u64)> = req_counts.into_iter().collect();
    counted.sort_by(|a, b| a.0.cmp(&b.0));
    for ((route, status), count) in counted {
        body.push_str(&format!(
            "tiffin_http_requests_total{{service=\"{METRIC_SERVICE}\",route=\"{route}\",status=\"{status}\"}} {count}\n"
        ));
    }

    let req_lat = state.metrics.latency_ns.lock().await.clone();
    let mut routes: Vec<(String, Vec<u64>)> = req_lat.into_iter().collect();
    routes.sort_by(|a, b| a.0.cmp(&b.0));
    for (route, vals) in routes {
        body.push_str(&format!(
            "tiffin_http_request_latency_p95_seconds{{service=\"{METRIC_SERVICE}\",route=\"{route}\"}} {:.6}\n",
            percentile_ns(&vals, 0.95) as f64 / 1_000_000_000.0
        ));
    }

    append_domain_gauges(&state, &mut body).await;

    let resp = (StatusCode::OK, body).into_response();
    state
        .metrics
        .observe_request("/metrics", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}

/// Marketplace counters scraped straight from the store. A failed read
/// drops the section rather than failing the scrape.
async fn append_domain_gauges(state: &AppState, body: &mut String) {
    match state.store.count_users_by_role().await {
        Ok(counts) => {
            for (role, count) in counts {
                body.push_str(&format!(
                    "tiffin_users_total{{service=\"{METRIC_SERVICE}\",role=\"{role}\"}} {count}\n"
                ));
            }
        }
        Err(e) => warn!("metrics user counts unavailable: {e}"),
    }
    match state.store.count_orders_by_status().await {
        Ok(counts) => {
            for (status, count) in counts {
                body.push_str(&format!(
                    "tiffin_orders_total{{service=\"{METRIC_SERVICE}\",status=\"{}\"}} {count}\n",
                    status.as_str()
                ));
            }
        }
        Err(e) => warn!("metrics order counts unavailable: {e}"),
    }
    match state.store.count_active_subscriptions().await {
        Ok(count) => body.push_str(&format!(
            "tiffin_active_subscriptions{{service=\"{METRIC_SERVICE}\"}} {count}\n"
        )),
        Err(e) => warn!("metrics subscription count unavailable: {e}"),
    }
    match state.store.delivered_revenue_cents().await {
        Ok(cents) => body.push_str(&format!(
            "tiffin_delivered_revenue_cents{{service=\"{METRIC_SERVICE}\"}} {cents}\n"
        )),
        Err(e) => warn!("metrics revenue unavailable: {e}"),
    }
    match state.store.ledger_volume_cents().await {
        Ok(cents) => body.push_str(&format!(
            "tiffin_ledger_volume_cents{{service=\"{METRIC_SERVICE}\"}} {cents}\n"
        )),
        Err(e) => warn!("metrics ledger volume unavailable: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile_ns(&[], 0.95), 0);
    }

    #[test]
    fn percentile_picks_the_upper_tail() {
        let vals: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile_ns(&vals, 0.95), 95);
        assert_eq!(percentile_ns(&vals, 0.0), 1);
    }
}
