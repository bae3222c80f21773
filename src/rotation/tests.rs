use super::*;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::entity::KeyEntityId;
use crate::error::ErrorKind;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 5, 10, 0, 0, 0).unwrap()
}

fn policy(expiry: &str, trigger: KeyLifetimeActionTrigger) -> RotationPolicy {
    let id = KeyEntityId::new("https://localhost:8443", "k1").unwrap();
    RotationPolicy::new(
        id,
        start(),
        expiry.parse().unwrap(),
        vec![KeyLifetimeAction::rotate(trigger)],
    )
}

#[test]
fn test_period_parsing_and_display() {
    let period: Period = "P1Y2M3D".parse().unwrap();
    assert_eq!(period, Period::new(1, 2, 3));
    assert_eq!(period.to_string(), "P1Y2M3D");

    assert_eq!("P2W".parse::<Period>().unwrap(), Period::days(14));
    assert_eq!(Period::default().to_string(), "P0D");

    // Malformed periods
    assert!("".parse::<Period>().is_err());
    assert!("P".parse::<Period>().is_err());
    assert!("1Y".parse::<Period>().is_err());
    assert!("P1D1Y".parse::<Period>().is_err());
    assert!("P1H".parse::<Period>().is_err());
    assert!("P12".parse::<Period>().is_err());
}

#[test]
fn test_period_calendar_days() {
    assert_eq!("P2M10D".parse::<Period>().unwrap().as_days_from(start()).unwrap(), 71);
    assert_eq!("P1Y1M1D".parse::<Period>().unwrap().as_days_from(start()).unwrap(), 397);
    assert_eq!(Period::days(30).as_days_from(start()).unwrap(), 30);
}

#[test]
fn test_period_serializes_as_string() {
    let json = serde_json::to_string(&Period::months(3)).unwrap();
    assert_eq!(json, "\"P3M\"");
    let parsed: Period = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, Period::months(3));
}

#[test]
fn test_valid_policies() {
    let after_create = policy("P90D", KeyLifetimeActionTrigger::time_after_create(Period::days(30)));
    assert!(after_create.validate(None).is_ok());
    assert_eq!(after_create.rotate_after_days(start()).unwrap(), 30);

    let before_expiry = policy("P90D", KeyLifetimeActionTrigger::time_before_expiry(Period::days(30)));
    assert!(before_expiry.validate(Some(start() + Duration::days(90))).is_ok());
    assert_eq!(before_expiry.rotate_after_days(start()).unwrap(), 60);
}

#[test]
fn test_policy_bounds() {
    // Expiry below 28 days
    let short = policy("P27D", KeyLifetimeActionTrigger::time_after_create(Period::days(7)));
    assert_eq!(short.validate(None).unwrap_err().kind(), ErrorKind::InvalidPolicy);

    // Trigger too close to expiry
    let late = policy("P30D", KeyLifetimeActionTrigger::time_after_create(Period::days(24)));
    assert_eq!(late.validate(None).unwrap_err().kind(), ErrorKind::InvalidPolicy);

    // Time before expiry below the minimum threshold
    let near = policy("P90D", KeyLifetimeActionTrigger::time_before_expiry(Period::days(6)));
    assert_eq!(
        near.validate(Some(start() + Duration::days(90))).unwrap_err().kind(),
        ErrorKind::InvalidPolicy
    );

    // Time before expiry without an expiring key
    let no_expiry = policy("P90D", KeyLifetimeActionTrigger::time_before_expiry(Period::days(30)));
    assert_eq!(no_expiry.validate(None).unwrap_err().kind(), ErrorKind::InvalidPolicy);
}

#[test]
fn test_time_before_expiry_may_exceed_the_creation_threshold() {
    let expiring = Some(start() + Duration::days(30));

    let close = policy("P30D", KeyLifetimeActionTrigger::time_before_expiry(Period::days(25)));
    assert!(close.validate(expiring).is_ok());
    assert_eq!(close.rotate_after_days(start()).unwrap(), 5);
    assert_eq!(close.missed_rotations(start(), start() + Duration::days(11)).unwrap().len(), 2);

    let last_day = policy("P30D", KeyLifetimeActionTrigger::time_before_expiry(Period::days(29)));
    assert!(last_day.validate(expiring).is_ok());

    // The interval between rotations must stay positive
    let whole = policy("P30D", KeyLifetimeActionTrigger::time_before_expiry(Period::days(30)));
    assert_eq!(whole.validate(expiring).unwrap_err().kind(), ErrorKind::InvalidPolicy);

    // Time after create keeps its distance from expiry
    let after = policy("P30D", KeyLifetimeActionTrigger::time_after_create(Period::days(25)));
    assert_eq!(after.validate(None).unwrap_err().kind(), ErrorKind::InvalidPolicy);
}

#[test]
fn test_policy_action_count_and_type() {
    let mut two = policy("P90D", KeyLifetimeActionTrigger::time_after_create(Period::days(30)));
    two.lifetime_actions.push(KeyLifetimeAction::rotate(
        KeyLifetimeActionTrigger::time_before_expiry(Period::days(10)),
    ));
    assert_eq!(two.validate(None).unwrap_err().kind(), ErrorKind::InvalidPolicy);

    let mut notify = policy("P90D", KeyLifetimeActionTrigger::time_after_create(Period::days(30)));
    notify.lifetime_actions[0].action_type = KeyLifetimeActionType::Notify;
    assert_eq!(notify.validate(None).unwrap_err().kind(), ErrorKind::InvalidPolicy);

    let mut none = policy("P90D", KeyLifetimeActionTrigger::time_after_create(Period::days(30)));
    none.lifetime_actions.clear();
    assert_eq!(none.validate(None).unwrap_err().kind(), ErrorKind::InvalidPolicy);
}

#[test]
fn test_missed_rotations() {
    let policy = policy("P90D", KeyLifetimeActionTrigger::time_after_create(Period::days(30)));

    // Key created together with the policy, 95 days pass
    let missed = policy.missed_rotations(start(), start() + Duration::days(95)).unwrap();
    assert_eq!(
        missed,
        vec![
            start() + Duration::days(30),
            start() + Duration::days(60),
            start() + Duration::days(90),
        ]
    );

    // Nothing is due before the first interval
    assert!(policy.missed_rotations(start(), start() + Duration::days(29)).unwrap().is_empty());
}

#[test]
fn test_missed_rotations_for_old_keys_start_at_policy_creation() {
    let policy = policy("P90D", KeyLifetimeActionTrigger::time_after_create(Period::days(30)));
    let key_created = start() - Duration::days(365);

    let missed = policy.missed_rotations(key_created, start() + Duration::days(31)).unwrap();
    assert_eq!(missed, vec![start(), start() + Duration::days(30)]);
}
