//! Process and instance registries
//!
//! Every operation takes the authenticated caller and re-derives its permissions
//! from storage; nothing is cached between calls.

pub mod instances;
pub mod processes;
pub mod users;

use chrono::{DateTime, Utc};

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn now_ms() -> i64 {
    to_millis(Utc::now())
}
