//! Identifier generation for steps, blocks, collections and test cases

use crate::step::StepId;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Current time in milliseconds, strictly increasing within the process
pub fn next_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_MILLIS.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Timestamp plus a random fraction as tiebreaker
pub fn step_id() -> StepId {
    StepId(next_millis() as f64 + rand::random::<f64>() * 0.9)
}

/// `<prefix>_<millis>`, e.g. `coll_1718000000000`
pub fn prefixed(prefix: &str) -> String {
    format!("{}_{}", prefix, next_millis())
}
