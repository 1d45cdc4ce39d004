use std::sync::LazyLock;

use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts};

const NAMESPACE: &str = "transactions";

// Bucket boundaries in seconds for single-statement store calls (500µs → 1s).
const STORE_LATENCY_BUCKETS: &[f64] = &[
    0.000_5, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

// ── HTTP request metrics ────────────────────────────────────────

pub static HTTP_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("http_requests_total", "Total number of HTTP requests.")
        .namespace(NAMESPACE);
    let counter = IntCounterVec::new(opts, &["route", "method", "code"]).unwrap();
    prometheus::register(Box::new(counter.clone())).unwrap();
    counter
});

pub static HTTP_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new("http_request_duration_seconds", "Duration of HTTP requests.")
        .namespace(NAMESPACE)
        .buckets(prometheus::DEFAULT_BUCKETS.to_vec());
    let hist = HistogramVec::new(opts, &["route", "method"]).unwrap();
    prometheus::register(Box::new(hist.clone())).unwrap();
    hist
});

// ── Store latency ───────────────────────────────────────────────

pub static STORE_LIST_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "store_list_duration_seconds",
            "Latency of TransactionStore::list",
        )
        .namespace(NAMESPACE)
        .buckets(STORE_LATENCY_BUCKETS.to_vec()),
    )
    .and_then(|h| {
        prometheus::register(Box::new(h.clone()))?;
        Ok(h)
    })
    .unwrap()
});

pub static STORE_INSERT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "store_insert_duration_seconds",
            "Latency of TransactionStore::insert",
        )
        .namespace(NAMESPACE)
        .buckets(STORE_LATENCY_BUCKETS.to_vec()),
    )
    .and_then(|h| {
        prometheus::register(Box::new(h.clone()))?;
        Ok(h)
    })
    .unwrap()
});
