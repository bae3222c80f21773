use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{VaultError, VaultResult};

/// ISO-8601 date period such as `P1Y2M3D`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Period {
    years: u32,
    months: u32,
    days: u32,
}

impl Period {
    pub fn new(years: u32, months: u32, days: u32) -> Self {
        Self { years, months, days }
    }

    pub fn days(days: u32) -> Self {
        Self::new(0, 0, days)
    }

    pub fn months(months: u32) -> Self {
        Self::new(0, months, 0)
    }

    pub fn years(years: u32) -> Self {
        Self::new(years, 0, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.years == 0 && self.months == 0 && self.days == 0
    }

    /// Instant reached by adding this period to `start`
    ///
    /// Months are added on the calendar, clamping to the end of shorter months.
    pub fn add_to(&self, start: DateTime<Utc>) -> VaultResult<DateTime<Utc>> {
        let out_of_range =
            || VaultError::invalid_argument("period", "a period within the calendar range", &self.to_string());
        let months = self
            .years
            .checked_mul(12)
            .and_then(|m| m.checked_add(self.months))
            .ok_or_else(out_of_range)?;
        start
            .checked_add_months(Months::new(months))
            .and_then(|t| t.checked_add_signed(Duration::days(i64::from(self.days))))
            .ok_or_else(out_of_range)
    }

    /// Number of whole calendar days covered when starting from `start`
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use vaultsim::rotation::Period;
    ///
    /// let start = Utc.with_ymd_and_hms(2022, 5, 10, 0, 0, 0).unwrap();
    /// let period: Period = "P2M10D".parse().unwrap();
    /// assert_eq!(period.as_days_from(start).unwrap(), 71);
    /// ```
    pub fn as_days_from(&self, start: DateTime<Utc>) -> VaultResult<i64> {
        Ok((self.add_to(start)? - start).num_days())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("P0D");
        }
        f.write_str("P")?;
        if self.years > 0 {
            write!(f, "{}Y", self.years)?;
        }
        if self.months > 0 {
            write!(f, "{}M", self.months)?;
        }
        if self.days > 0 {
            write!(f, "{}D", self.days)?;
        }
        Ok(())
    }
}

impl FromStr for Period {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VaultError::invalid_argument("period", "an ISO-8601 date period like P1Y2M3D", s);

        let body = s.strip_prefix('P').ok_or_else(invalid)?;
        if body.is_empty() {
            return Err(invalid());
        }

        let mut period = Period::default();
        let mut number = String::new();
        let mut last_unit = 0;
        for c in body.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            let value: u32 = number.parse().map_err(|_| invalid())?;
            number.clear();

            // Units must appear at most once and in Y, M, W, D order
            let unit = match c {
                'Y' => 1,
                'M' => 2,
                'W' => 3,
                'D' => 4,
                _ => return Err(invalid()),
            };
            if unit <= last_unit {
                return Err(invalid());
            }
            last_unit = unit;

            match c {
                'Y' => period.years = value,
                'M' => period.months = value,
                'W' => period.days = value.checked_mul(7).ok_or_else(invalid)?,
                _ => period.days = period.days.checked_add(value).ok_or_else(invalid)?,
            }
        }
        if !number.is_empty() {
            return Err(invalid());
        }
        Ok(period)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
