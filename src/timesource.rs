//! Network-adjusted time

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the network-adjusted current time, in Unix seconds
pub trait MedianTimeSource: Send + Sync {
    fn adjusted_time(&self) -> i64;
}

/// Local clock with no peer offset applied
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl MedianTimeSource for SystemTimeSource {
    fn adjusted_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource(pub i64);

impl MedianTimeSource for FixedTimeSource {
    fn adjusted_time(&self) -> i64 {
        self.0
    }
}
