use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{error_codes, VaultError, VaultResult};

/// Where the clock takes its base reading from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockOrigin {
    /// Wall clock time
    System,

    /// A fixed instant, used by tests for exact timestamps
    Fixed(DateTime<Utc>),
}

/// Per-vault logical clock
///
/// Clones share the accumulated offset, so shifting one handle moves every
/// store, policy and certificate that holds a clone of it.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    origin: ClockOrigin,
    offset_seconds: Arc<AtomicI64>,
}

impl VirtualClock {
    /// Create a clock that follows the wall clock
    pub fn system() -> Self {
        Self {
            origin: ClockOrigin::System,
            offset_seconds: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Create a clock frozen at `start`, moving only when shifted
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use vaultsim::clock::VirtualClock;
    ///
    /// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    /// let clock = VirtualClock::fixed(start);
    /// clock.shift(60).unwrap();
    /// assert_eq!(clock.now(), start + chrono::Duration::seconds(60));
    /// ```
    pub fn fixed(start: DateTime<Utc>) -> Self {
        Self {
            origin: ClockOrigin::Fixed(start),
            offset_seconds: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Current time as seen by the vault
    pub fn now(&self) -> DateTime<Utc> {
        let base = match self.origin {
            ClockOrigin::System => Utc::now(),
            ClockOrigin::Fixed(start) => start,
        };
        base + Duration::seconds(self.offset_seconds())
    }

    /// Move the clock forward by `seconds`
    ///
    /// # Arguments
    ///
    /// * `seconds` - Number of seconds to advance, must be positive
    ///
    /// # Returns
    ///
    /// `Ok(())` or `InvalidArgument` for a non-positive amount
    pub fn shift(&self, seconds: i64) -> VaultResult<()> {
        if seconds <= 0 {
            return Err(VaultError::invalid_argument_with_code(
                "seconds",
                "a positive number of seconds",
                &seconds.to_string(),
                error_codes::INVALID_TIME_SHIFT,
            ));
        }
        self.offset_seconds.fetch_add(seconds, Ordering::SeqCst);
        Ok(())
    }

    /// Total seconds this clock has been shifted
    pub fn offset_seconds(&self) -> i64 {
        self.offset_seconds.load(Ordering::SeqCst)
    }

    /// Whether the clock is anchored to a fixed instant
    pub fn is_fixed(&self) -> bool {
        matches!(self.origin, ClockOrigin::Fixed(_))
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::system()
    }
}
