use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::CertificateEntityId;
use crate::error::{error_codes, VaultError, VaultResult};
use crate::rotation::Period;

use super::policy::CertAuthorityType;

/// Default renewal point on first creation
pub const DEFAULT_LIFETIME_PERCENTAGE: u32 = 80;
pub const MIN_LIFETIME_PERCENTAGE: u32 = 1;
pub const MAX_LIFETIME_PERCENTAGE: u32 = 99;
/// Days-before-expiry triggers may reach back this many days per validity month
pub const MAX_DAYS_PER_VALIDITY_MONTH: u32 = 27;

/// What a lifetime action does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CertificateLifetimeActionActivity {
    AutoRenew,
    EmailContacts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateLifetimeActionTriggerType {
    DaysBeforeExpiry,
    LifetimePercentage,
}

/// When a lifetime action fires, relative to a certificate's validity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateLifetimeActionTrigger {
    pub trigger_type: CertificateLifetimeActionTriggerType,
    pub value: u32,
}

impl CertificateLifetimeActionTrigger {
    pub fn days_before_expiry(days: u32) -> Self {
        Self {
            trigger_type: CertificateLifetimeActionTriggerType::DaysBeforeExpiry,
            value: days,
        }
    }

    pub fn lifetime_percentage(percentage: u32) -> Self {
        Self {
            trigger_type: CertificateLifetimeActionTriggerType::LifetimePercentage,
            value: percentage,
        }
    }

    /// Check the trigger value against a validity of `validity_months`
    pub fn validate(&self, validity_months: u32) -> VaultResult<()> {
        let (min, max) = match self.trigger_type {
            CertificateLifetimeActionTriggerType::LifetimePercentage => {
                (MIN_LIFETIME_PERCENTAGE, MAX_LIFETIME_PERCENTAGE)
            }
            CertificateLifetimeActionTriggerType::DaysBeforeExpiry => {
                (1, validity_months.saturating_mul(MAX_DAYS_PER_VALIDITY_MONTH))
            }
        };
        if self.value < min || self.value > max {
            return Err(VaultError::invalid_policy(
                "lifetime action",
                &format!(
                    "{:?} trigger value {} is outside [{}, {}]",
                    self.trigger_type, self.value, min, max
                ),
                error_codes::INVALID_LIFETIME_POLICY,
            ));
        }
        Ok(())
    }

    /// Days after `start` at which the trigger fires for a validity of `validity_months`
    pub fn triggers_after_days(&self, start: DateTime<Utc>, validity_months: u32) -> VaultResult<i64> {
        let lifetime_days = Period::months(validity_months).as_days_from(start)?;
        Ok(match self.trigger_type {
            CertificateLifetimeActionTriggerType::DaysBeforeExpiry => lifetime_days - i64::from(self.value),
            CertificateLifetimeActionTriggerType::LifetimePercentage => {
                lifetime_days * i64::from(self.value) / 100
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateLifetimeAction {
    pub activity: CertificateLifetimeActionActivity,
    pub trigger: CertificateLifetimeActionTrigger,
}

impl CertificateLifetimeAction {
    pub fn new(activity: CertificateLifetimeActionActivity, trigger: CertificateLifetimeActionTrigger) -> Self {
        Self { activity, trigger }
    }
}

/// Lifetime actions attached to a certificate name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeActionPolicy {
    pub id: CertificateEntityId,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub lifetime_actions: Vec<CertificateLifetimeAction>,
}

impl LifetimeActionPolicy {
    pub fn new(id: CertificateEntityId, now: DateTime<Utc>, lifetime_actions: Vec<CertificateLifetimeAction>) -> Self {
        Self {
            id,
            created_on: now,
            updated_on: now,
            lifetime_actions,
        }
    }

    /// Policy given to a certificate name on its first creation
    ///
    /// Self-signed certificates renew at 80 % of their lifetime; certificates
    /// of unknown issuers only notify their contacts.
    pub fn default_for(id: CertificateEntityId, issuer: CertAuthorityType, now: DateTime<Utc>) -> Self {
        let activity = match issuer {
            CertAuthorityType::SelfSigned => CertificateLifetimeActionActivity::AutoRenew,
            CertAuthorityType::Unknown => CertificateLifetimeActionActivity::EmailContacts,
        };
        let trigger = CertificateLifetimeActionTrigger::lifetime_percentage(DEFAULT_LIFETIME_PERCENTAGE);
        Self::new(id, now, vec![CertificateLifetimeAction::new(activity, trigger)])
    }

    pub fn is_auto_renew(&self) -> bool {
        self.auto_renew_trigger().is_some()
    }

    pub fn auto_renew_trigger(&self) -> Option<&CertificateLifetimeActionTrigger> {
        self.lifetime_actions
            .iter()
            .find(|a| a.activity == CertificateLifetimeActionActivity::AutoRenew)
            .map(|a| &a.trigger)
    }

    /// Validate the actions against the certificate's issuance settings
    pub fn validate(&self, validity_months: u32, issuer: CertAuthorityType) -> VaultResult<()> {
        let duplicate = |what: &str| {
            Err(VaultError::invalid_policy(
                "lifetime action",
                &format!("at most one action per {} is allowed", what),
                error_codes::INVALID_LIFETIME_POLICY,
            ))
        };

        for (index, action) in self.lifetime_actions.iter().enumerate() {
            let rest = &self.lifetime_actions[index + 1..];
            if rest.iter().any(|other| other.activity == action.activity) {
                return duplicate("activity");
            }
            if rest
                .iter()
                .any(|other| other.trigger.trigger_type == action.trigger.trigger_type)
            {
                return duplicate("trigger type");
            }
            action.trigger.validate(validity_months)?;
        }

        if issuer == CertAuthorityType::Unknown && self.is_auto_renew() {
            return Err(VaultError::invalid_policy(
                "lifetime action",
                "AutoRenew is not available for certificates of unknown issuers",
                error_codes::INVALID_LIFETIME_POLICY,
            ));
        }
        Ok(())
    }

    /// Instants at which automatic renewals should have happened before `now`
    ///
    /// Each renewal starts a new validity period, so the next trigger is
    /// measured from the previous renewal.
    pub fn missed_renewals(
        &self,
        validity_start: DateTime<Utc>,
        validity_months: u32,
        now: DateTime<Utc>,
    ) -> VaultResult<Vec<DateTime<Utc>>> {
        let trigger = match self.auto_renew_trigger() {
            Some(trigger) => *trigger,
            None => return Ok(Vec::new()),
        };

        let first_days = trigger.triggers_after_days(validity_start, validity_months)?;
        let mut start = validity_start.max(self.created_on - Duration::days(first_days));
        let mut missed = Vec::new();
        loop {
            let days = trigger.triggers_after_days(start, validity_months)?;
            if days <= 0 {
                return Err(VaultError::invalid_policy(
                    "lifetime action",
                    "renewal interval must be positive",
                    error_codes::INVALID_LIFETIME_POLICY,
                ));
            }
            let next = start + Duration::days(days);
            if next >= now {
                break;
            }
            missed.push(next);
            start = next;
        }
        Ok(missed)
    }

    /// Take over the actions of `other`, keeping identity and creation time
    pub(crate) fn update_from(&mut self, other: &LifetimeActionPolicy, now: DateTime<Utc>) {
        self.lifetime_actions = other.lifetime_actions.clone();
        self.updated_on = now;
    }
}
