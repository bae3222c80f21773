use super::*;
use chrono::{Duration, TimeZone, Utc};

use crate::error::ErrorKind;

#[test]
fn test_fixed_clock_is_stable() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let clock = VirtualClock::fixed(start);

    assert_eq!(clock.now(), start);
    assert_eq!(clock.now(), start);
    assert!(clock.is_fixed());
}

#[test]
fn test_shift_is_shared_by_clones() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let clock = VirtualClock::fixed(start);
    let other = clock.clone();

    // Shift through one handle
    clock.shift(3600).unwrap();
    clock.shift(86_400).unwrap();

    // Both handles observe the accumulated offset
    assert_eq!(other.now(), start + Duration::seconds(3600 + 86_400));
    assert_eq!(other.offset_seconds(), 90_000);
}

#[test]
fn test_shift_rejects_non_positive() {
    let clock = VirtualClock::fixed(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

    assert_eq!(clock.shift(0).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(clock.shift(-5).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(clock.offset_seconds(), 0);
}

#[test]
fn test_system_clock_includes_offset() {
    let clock = VirtualClock::system();
    let before = Utc::now();

    clock.shift(7 * 86_400).unwrap();

    assert!(clock.now() >= before + Duration::days(7));
    assert!(!clock.is_fixed());
}
