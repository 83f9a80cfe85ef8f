//! Metrics to track
//!
//! - Gauges:
//!   - Live event-source subscriptions held by the tracker
//! - Counters:
//!   - Runs triggered from service requests
//!   - Run trigger failures
//!   - Request detail lookups that failed

use metrics::{Counter, Gauge, counter, describe_counter, describe_gauge, gauge};
use std::sync::LazyLock;

const ACTIVE_SUBSCRIPTIONS: &str = "reqwatch.subscriptions.active";
const ACTIVE_SUBSCRIPTIONS_HELP: &str = "Number of jobs with a live event-source subscription";

const RUNS_TRIGGERED: &str = "reqwatch.runs.triggered";
const RUNS_TRIGGERED_HELP: &str = "Number of job runs triggered by service requests";

const RUN_TRIGGER_FAILURES: &str = "reqwatch.runs.trigger_failures";
const RUN_TRIGGER_FAILURES_HELP: &str = "Number of service requests whose run could not be created";

const LOOKUP_FAILURES: &str = "reqwatch.requests.lookup_failures";
const LOOKUP_FAILURES_HELP: &str = "Number of request detail lookups that failed and were dropped";

static DESCRIBE: LazyLock<()> = LazyLock::new(|| {
    describe_gauge!(ACTIVE_SUBSCRIPTIONS, ACTIVE_SUBSCRIPTIONS_HELP);
    describe_counter!(RUNS_TRIGGERED, RUNS_TRIGGERED_HELP);
    describe_counter!(RUN_TRIGGER_FAILURES, RUN_TRIGGER_FAILURES_HELP);
    describe_counter!(LOOKUP_FAILURES, LOOKUP_FAILURES_HELP);
});

fn active_subscriptions() -> Gauge {
    LazyLock::force(&DESCRIBE);
    gauge!(ACTIVE_SUBSCRIPTIONS)
}

pub fn set_active_subscriptions(value: usize) {
    active_subscriptions().set(value as f64);
}

fn runs_triggered() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(RUNS_TRIGGERED)
}

pub fn inc_runs_triggered() {
    runs_triggered().increment(1);
}

fn run_trigger_failures() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(RUN_TRIGGER_FAILURES)
}

pub fn inc_run_trigger_failures() {
    run_trigger_failures().increment(1);
}

fn lookup_failures() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(LOOKUP_FAILURES)
}

pub fn inc_lookup_failures() {
    lookup_failures().increment(1);
}
