//! Time provider abstraction
//!
//! This module provides a [`Clock`] trait that abstracts over time sources.
//! Remote adapters use it to stamp records with server timestamps, which is
//! what the engine compares to decide whether an inbound snapshot is new.
//!
//! # Example
//!
//! ```
//! use crs_sync::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let millis = clock.now_millis();
//! let stamp = clock.now();
//! assert!(stamp.timestamp_millis() as u64 >= millis);
//! ```

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A UTC instant with millisecond precision, serialized as RFC 3339.
pub type Timestamp = DateTime<Utc>;

/// Convert milliseconds since the Unix epoch into a [`Timestamp`].
///
/// Out-of-range values collapse to the epoch.
pub fn timestamp_from_millis(millis: u64) -> Timestamp {
    i64::try_from(millis)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_default()
}

/// Format a timestamp the way remote records carry it (`2024-01-01T00:00:00.000Z`).
pub fn format_timestamp(stamp: &Timestamp) -> String {
    stamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A time provider for getting current timestamps.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;

    /// Returns the current time as a millisecond-precision [`Timestamp`].
    fn now(&self) -> Timestamp {
        timestamp_from_millis(self.now_millis())
    }
}

/// Production clock using real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests.
///
/// Each reading is one millisecond later than the previous one, so stamps
/// taken in sequence never collide. While a [`ClockHold`] is alive every
/// reading returns the same value.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicU64,
    held: AtomicBool,
}

/// Keeps a [`FixedClock`] frozen until dropped.
#[cfg(any(test, feature = "testing"))]
pub struct ClockHold<'a>(&'a FixedClock);

#[cfg(any(test, feature = "testing"))]
impl Drop for ClockHold<'_> {
    fn drop(&mut self) {
        self.0.held.store(false, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "testing"))]
impl FixedClock {
    /// Start at `millis` since the Unix epoch.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
            held: AtomicBool::new(false),
        }
    }

    pub fn hold(&self) -> ClockHold<'_> {
        self.held.store(true, Ordering::SeqCst);
        ClockHold(self)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        if self.held.load(Ordering::SeqCst) {
            self.millis.load(Ordering::SeqCst)
        } else {
            self.millis.fetch_add(1, Ordering::SeqCst)
        }
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for FixedClock {
    /// 2024-01-01T00:00:00Z
    fn default() -> Self {
        Self::new(1_704_067_200_000)
    }
}
