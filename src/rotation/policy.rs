use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::KeyEntityId;
use crate::error::{error_codes, VaultError, VaultResult};

use super::Period;

/// Shortest expiry period a rotation policy may set, in days
pub const MINIMUM_EXPIRY_PERIOD_IN_DAYS: i64 = 28;

/// Minimum distance of a trigger from creation and from expiry, in days
pub const MINIMUM_THRESHOLD_BEFORE_EXPIRY: i64 = 7;

/// When a lifetime action fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifetimeActionTriggerType {
    TimeAfterCreate,
    TimeBeforeExpiry,
}

/// Trigger of a key lifetime action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLifetimeActionTrigger {
    pub trigger_type: LifetimeActionTriggerType,
    pub period: Period,
}

impl KeyLifetimeActionTrigger {
    pub fn time_after_create(period: Period) -> Self {
        Self {
            trigger_type: LifetimeActionTriggerType::TimeAfterCreate,
            period,
        }
    }

    pub fn time_before_expiry(period: Period) -> Self {
        Self {
            trigger_type: LifetimeActionTriggerType::TimeBeforeExpiry,
            period,
        }
    }
}

/// What a key lifetime action does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyLifetimeActionType {
    Rotate,
    Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLifetimeAction {
    pub action_type: KeyLifetimeActionType,
    pub trigger: KeyLifetimeActionTrigger,
}

impl KeyLifetimeAction {
    pub fn rotate(trigger: KeyLifetimeActionTrigger) -> Self {
        Self {
            action_type: KeyLifetimeActionType::Rotate,
            trigger,
        }
    }
}

/// Rotation policy attached to a key name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    pub id: KeyEntityId,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub expiry_time: Period,
    pub lifetime_actions: Vec<KeyLifetimeAction>,
}

fn policy_error(details: &str) -> VaultError {
    VaultError::invalid_policy("rotation policy", details, error_codes::INVALID_ROTATION_POLICY)
}

impl RotationPolicy {
    pub fn new(
        id: KeyEntityId,
        now: DateTime<Utc>,
        expiry_time: Period,
        lifetime_actions: Vec<KeyLifetimeAction>,
    ) -> Self {
        Self {
            id,
            created_on: now,
            updated_on: now,
            expiry_time,
            lifetime_actions,
        }
    }

    /// The single rotate action of a valid policy
    pub fn rotate_action(&self) -> VaultResult<&KeyLifetimeAction> {
        match self.lifetime_actions.as_slice() {
            [action] if action.action_type == KeyLifetimeActionType::Rotate => Ok(action),
            [_] => Err(policy_error("only the Rotate action is supported")),
            actions => Err(policy_error(&format!(
                "exactly one lifetime action is required, got {}",
                actions.len()
            ))),
        }
    }

    /// Validate the policy against the latest key version
    ///
    /// # Arguments
    ///
    /// * `latest_expiry` - Expiry of the latest key version, if any
    ///
    /// # Returns
    ///
    /// `Ok(())` or `InvalidPolicy` describing the violated bound
    pub fn validate(&self, latest_expiry: Option<DateTime<Utc>>) -> VaultResult<()> {
        let action = self.rotate_action()?;

        let expiry_days = self.expiry_time.as_days_from(self.created_on)?;
        if expiry_days < MINIMUM_EXPIRY_PERIOD_IN_DAYS {
            return Err(policy_error(&format!(
                "expiry time must be at least {} days, got {}",
                MINIMUM_EXPIRY_PERIOD_IN_DAYS, expiry_days
            )));
        }

        let trigger_days = action.trigger.period.as_days_from(self.created_on)?;
        let max_trigger_days = match action.trigger.trigger_type {
            LifetimeActionTriggerType::TimeAfterCreate => expiry_days - MINIMUM_THRESHOLD_BEFORE_EXPIRY,
            // keeps the interval between rotations, expiry minus trigger, positive
            LifetimeActionTriggerType::TimeBeforeExpiry => expiry_days - 1,
        };
        if trigger_days < MINIMUM_THRESHOLD_BEFORE_EXPIRY || trigger_days > max_trigger_days {
            return Err(policy_error(&format!(
                "trigger must be between {} and {} days, got {}",
                MINIMUM_THRESHOLD_BEFORE_EXPIRY, max_trigger_days, trigger_days
            )));
        }

        if action.trigger.trigger_type == LifetimeActionTriggerType::TimeBeforeExpiry && latest_expiry.is_none() {
            return Err(policy_error(
                "a time before expiry trigger needs a key version with an expiry date",
            ));
        }
        Ok(())
    }

    /// Days between two rotations
    pub fn rotate_after_days(&self, relative_to: DateTime<Utc>) -> VaultResult<i64> {
        let action = self.rotate_action()?;
        let trigger_days = action.trigger.period.as_days_from(relative_to)?;
        match action.trigger.trigger_type {
            LifetimeActionTriggerType::TimeAfterCreate => Ok(trigger_days),
            LifetimeActionTriggerType::TimeBeforeExpiry => {
                Ok(self.expiry_time.as_days_from(relative_to)? - trigger_days)
            }
        }
    }

    /// Expiry of a key version created at `created_on` under this policy
    pub fn expiry_for(&self, created_on: DateTime<Utc>) -> VaultResult<DateTime<Utc>> {
        self.expiry_time.add_to(created_on)
    }

    /// Instants at which rotations should have happened before `now`
    ///
    /// Counting starts at the later of the latest version's creation and
    /// the policy creation minus one rotation interval.
    pub fn missed_rotations(
        &self,
        latest_created: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> VaultResult<Vec<DateTime<Utc>>> {
        let days = self.rotate_after_days(latest_created)?;
        if days <= 0 {
            return Err(policy_error("rotation interval must be positive"));
        }

        let start = latest_created.max(self.created_on - Duration::days(days));
        let mut missed = Vec::new();
        let mut next = start + Duration::days(days);
        while next < now {
            missed.push(next);
            next += Duration::days(days);
        }
        Ok(missed)
    }

    /// Take over the settings of `other`, keeping identity and creation time
    pub(crate) fn update_from(&mut self, other: &RotationPolicy, now: DateTime<Utc>) {
        self.expiry_time = other.expiry_time;
        self.lifetime_actions = other.lifetime_actions.clone();
        self.updated_on = now;
    }
}
