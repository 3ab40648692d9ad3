use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};

// --- Dispatch Metrics ---

pub static DISPATCH_SUCCESS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bazar_dispatch_success_total",
        "Orders successfully handed to a courier provider"
    )
    .expect("dispatch_success counter")
});

pub static DISPATCH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bazar_dispatch_failures_total",
        "Dispatch attempts that surfaced an error to the operator"
    )
    .expect("dispatch_failures counter")
});

pub static DISPATCH_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bazar_dispatch_retries_total",
        "Transport-class failures retried by the coordinator"
    )
    .expect("dispatch_retries counter")
});

pub static ALREADY_DISPATCHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bazar_dispatch_already_dispatched_total",
        "Dispatch attempts blocked by the idempotency guard"
    )
    .expect("already_dispatched counter")
});

pub static STALE_COMMITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bazar_dispatch_stale_commits_total",
        "Commits refused because the order changed in another session"
    )
    .expect("stale_commits counter")
});

pub static COURIER_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "bazar_dispatch_courier_latency_seconds",
        "Round-trip latency of provider dispatch calls",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0]
    )
    .expect("courier_latency histogram")
});

// --- Fraud Metrics ---

pub static FRAUD_CHECKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bazar_dispatch_fraud_checks_total",
        "Fraud risk lookups requested by staff"
    )
    .expect("fraud_checks counter")
});

pub static FRAUD_HIGH_RISK: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bazar_dispatch_fraud_high_risk_total",
        "Fraud verdicts bucketed as high risk"
    )
    .expect("fraud_high_risk counter")
});

pub fn inc_dispatch_success() {
    DISPATCH_SUCCESS.inc();
}

pub fn inc_dispatch_failures() {
    DISPATCH_FAILURES.inc();
}

pub fn inc_dispatch_retries() {
    DISPATCH_RETRIES.inc();
}

pub fn inc_already_dispatched() {
    ALREADY_DISPATCHED.inc();
}

pub fn inc_stale_commits() {
    STALE_COMMITS.inc();
}

pub fn observe_courier_latency(duration_sec: f64) {
    COURIER_LATENCY.observe(duration_sec);
}

pub fn inc_fraud_checks() {
    FRAUD_CHECKS.inc();
}

pub fn inc_fraud_high_risk() {
    FRAUD_HIGH_RISK.inc();
}
