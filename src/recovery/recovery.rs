use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{error_codes, VaultError, VaultResult};

/// Lowest retention allowed for customized recovery levels
pub const MIN_RECOVERABLE_DAYS: u32 = 7;

/// Retention of the non-customized recoverable levels, and the upper bound for customized ones
pub const MAX_RECOVERABLE_DAYS: u32 = 90;

/// Recovery level of a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryLevel {
    #[serde(rename = "Purgeable")]
    Purgeable,
    #[serde(rename = "Recoverable+Purgeable")]
    RecoverablePurgeable,
    #[serde(rename = "Recoverable")]
    Recoverable,
    #[serde(rename = "Recoverable+ProtectedSubscription")]
    RecoverableProtectedSubscription,
    #[serde(rename = "CustomizedRecoverable+Purgeable")]
    CustomizedRecoverablePurgeable,
    #[serde(rename = "CustomizedRecoverable")]
    CustomizedRecoverable,
    #[serde(rename = "CustomizedRecoverable+ProtectedSubscription")]
    CustomizedRecoverableProtectedSubscription,
}

impl RecoveryLevel {
    pub const ALL: [RecoveryLevel; 7] = [
        RecoveryLevel::Purgeable,
        RecoveryLevel::RecoverablePurgeable,
        RecoveryLevel::Recoverable,
        RecoveryLevel::RecoverableProtectedSubscription,
        RecoveryLevel::CustomizedRecoverablePurgeable,
        RecoveryLevel::CustomizedRecoverable,
        RecoveryLevel::CustomizedRecoverableProtectedSubscription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryLevel::Purgeable => "Purgeable",
            RecoveryLevel::RecoverablePurgeable => "Recoverable+Purgeable",
            RecoveryLevel::Recoverable => "Recoverable",
            RecoveryLevel::RecoverableProtectedSubscription => "Recoverable+ProtectedSubscription",
            RecoveryLevel::CustomizedRecoverablePurgeable => "CustomizedRecoverable+Purgeable",
            RecoveryLevel::CustomizedRecoverable => "CustomizedRecoverable",
            RecoveryLevel::CustomizedRecoverableProtectedSubscription => {
                "CustomizedRecoverable+ProtectedSubscription"
            }
        }
    }

    /// Whether deleted entities may be purged on request
    pub fn is_purgeable(&self) -> bool {
        self.as_str().contains("Purgeable")
    }

    /// Whether deleted entities are retained for a recovery period
    pub fn is_recoverable(&self) -> bool {
        *self != RecoveryLevel::Purgeable
    }

    /// Whether the retention period can be chosen freely within bounds
    pub fn is_customized(&self) -> bool {
        self.as_str().starts_with("Customized")
    }

    /// Whether the vault itself is protected from deletion
    pub fn is_subscription_protected(&self) -> bool {
        self.as_str().ends_with("ProtectedSubscription")
    }
}

impl fmt::Display for RecoveryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryLevel {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecoveryLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| VaultError::invalid_argument("recovery_level", "a known recovery level", s))
    }
}

/// Recovery level plus retention days of a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    level: RecoveryLevel,
    recoverable_days: Option<u32>,
}

impl RecoveryPolicy {
    /// Create a recovery policy, checking the retention days against the level
    ///
    /// # Arguments
    ///
    /// * `level` - The recovery level
    /// * `recoverable_days` - Retention in days; must be absent for `Purgeable`,
    ///   within 7..=90 for customized levels and exactly 90 otherwise
    ///
    /// # Returns
    ///
    /// The policy or `InvalidArgument` when the days do not fit the level
    pub fn new(level: RecoveryLevel, recoverable_days: Option<u32>) -> VaultResult<Self> {
        let valid = match (level.is_recoverable(), level.is_customized(), recoverable_days) {
            (false, _, None) => true,
            (false, _, Some(_)) => false,
            (true, true, Some(days)) => (MIN_RECOVERABLE_DAYS..=MAX_RECOVERABLE_DAYS).contains(&days),
            (true, false, Some(days)) => days == MAX_RECOVERABLE_DAYS,
            (true, _, None) => false,
        };

        if !valid {
            let actual = recoverable_days
                .map(|d| d.to_string())
                .unwrap_or_else(|| "none".to_string());
            return Err(VaultError::invalid_argument_with_code(
                "recoverable_days",
                &format!("a retention valid for {}", level),
                &actual,
                error_codes::INVALID_RECOVERY_POLICY,
            ));
        }

        Ok(Self {
            level,
            recoverable_days,
        })
    }

    pub fn level(&self) -> RecoveryLevel {
        self.level
    }

    pub fn recoverable_days(&self) -> Option<u32> {
        self.recoverable_days
    }

    pub fn is_purgeable(&self) -> bool {
        self.level.is_purgeable()
    }

    /// Instant at which an entity deleted at `now` is purged automatically
    pub fn scheduled_purge_date(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.recoverable_days {
            Some(days) => now + Duration::days(i64::from(days)),
            None => now,
        }
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            level: RecoveryLevel::Recoverable,
            recoverable_days: Some(MAX_RECOVERABLE_DAYS),
        }
    }
}
