//! ISO period identifiers and date ranges.
//!
//! Supported formats: `2023` (yearly), `2023S1` (six-monthly), `2023Q1`
//! (quarterly), `202301` (monthly), `2023W5` (ISO weekly), `20230115` (daily).

use std::fmt;

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result, ValidationCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    SixMonthly,
    Yearly,
}

impl PeriodType {
    /// Name of the pre-computed period column in the analytics tables.
    pub fn column(&self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::SixMonthly => "sixmonthly",
            PeriodType::Yearly => "yearly",
        }
    }

    /// Shift `date` by `count` periods of this type.
    pub fn shift(&self, date: NaiveDate, count: i32) -> NaiveDate {
        match self {
            PeriodType::Daily => date + Duration::days(count as i64),
            PeriodType::Weekly => date + Duration::weeks(count as i64),
            PeriodType::Monthly => shift_months(date, count),
            PeriodType::Quarterly => shift_months(date, count * 3),
            PeriodType::SixMonthly => shift_months(date, count * 6),
            PeriodType::Yearly => shift_months(date, count * 12),
        }
    }
}

pub(crate) fn shift_months(date: NaiveDate, count: i32) -> NaiveDate {
    let months = Months::new(count.unsigned_abs());
    let shifted = if count >= 0 {
        date.checked_add_months(months)
    } else {
        date.checked_sub_months(months)
    };
    shifted.unwrap_or(date)
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Exclusive upper bound used in `col < end` predicates.
    pub fn end_exclusive(&self) -> NaiveDate {
        self.end + Duration::days(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    iso: String,
    period_type: PeriodType,
    start: NaiveDate,
    end: NaiveDate,
}

impl Period {
    pub fn parse(iso: &str) -> Result<Self> {
        let invalid = || AnalyticsError::validation(ValidationCode::InvalidPeriod, iso);
        let iso = iso.trim();
        if iso.len() < 4 || !iso.is_char_boundary(4) {
            return Err(invalid());
        }
        let year: i32 = iso[..4].parse().map_err(|_| invalid())?;
        let rest = &iso[4..];

        let (period_type, start, end) = if rest.is_empty() {
            let start = ymd(year, 1, 1).ok_or_else(invalid)?;
            (PeriodType::Yearly, start, ymd(year, 12, 31).ok_or_else(invalid)?)
        } else if let Some(n) = rest.strip_prefix('Q') {
            let quarter: u32 = n.parse().map_err(|_| invalid())?;
            if !(1..=4).contains(&quarter) {
                return Err(invalid());
            }
            let start = ymd(year, (quarter - 1) * 3 + 1, 1).ok_or_else(invalid)?;
            (PeriodType::Quarterly, start, month_span_end(start, 3))
        } else if let Some(n) = rest.strip_prefix('S') {
            let half: u32 = n.parse().map_err(|_| invalid())?;
            if !(1..=2).contains(&half) {
                return Err(invalid());
            }
            let start = ymd(year, (half - 1) * 6 + 1, 1).ok_or_else(invalid)?;
            (PeriodType::SixMonthly, start, month_span_end(start, 6))
        } else if let Some(n) = rest.strip_prefix('W') {
            let week: u32 = n.parse().map_err(|_| invalid())?;
            let start =
                NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)?;
            (PeriodType::Weekly, start, start + Duration::days(6))
        } else if rest.len() == 2 && rest.bytes().all(|b| b.is_ascii_digit()) {
            let month: u32 = rest.parse().map_err(|_| invalid())?;
            let start = ymd(year, month, 1).ok_or_else(invalid)?;
            (PeriodType::Monthly, start, month_span_end(start, 1))
        } else if rest.len() == 4 && rest.bytes().all(|b| b.is_ascii_digit()) {
            let month: u32 = rest[..2].parse().map_err(|_| invalid())?;
            let day: u32 = rest[2..].parse().map_err(|_| invalid())?;
            let date = ymd(year, month, day).ok_or_else(invalid)?;
            (PeriodType::Daily, date, date)
        } else {
            return Err(invalid());
        };

        Ok(Self {
            iso: iso.to_string(),
            period_type,
            start,
            end,
        })
    }

    pub fn iso(&self) -> &str {
        &self.iso
    }

    pub fn period_type(&self) -> PeriodType {
        self.period_type
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn range(&self) -> DateRange {
        DateRange::new(self.start, self.end)
    }

    /// Calendar years the period touches.
    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start.year()..=self.end.year()
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_span_end(start: NaiveDate, months: i32) -> NaiveDate {
    shift_months(start, months) - Duration::days(1)
}

impl TryFrom<String> for Period {
    type Error = AnalyticsError;

    fn try_from(value: String) -> Result<Self> {
        Period::parse(&value)
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.iso
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iso)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_monthly_and_quarterly() {
        let month = Period::parse("202302").unwrap();
        assert_eq!(month.period_type(), PeriodType::Monthly);
        assert_eq!(month.start(), date(2023, 2, 1));
        assert_eq!(month.end(), date(2023, 2, 28));

        let quarter = Period::parse("2023Q4").unwrap();
        assert_eq!(quarter.period_type(), PeriodType::Quarterly);
        assert_eq!(quarter.end(), date(2023, 12, 31));
    }

    #[test]
    fn parses_weeks_across_year_boundary() {
        let week = Period::parse("2021W1").unwrap();
        assert_eq!(week.start(), date(2021, 1, 4));
        let week = Period::parse("2020W53").unwrap();
        assert_eq!(week.start(), date(2020, 12, 28));
        assert_eq!(week.years().collect::<Vec<_>>(), vec![2020, 2021]);
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "20", "2023Q5", "2023M1", "20231301", "abcd"] {
            assert!(Period::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn shifts_by_period_type() {
        let d = date(2023, 1, 31);
        assert_eq!(PeriodType::Monthly.shift(d, 1), date(2023, 2, 28));
        assert_eq!(PeriodType::Quarterly.shift(d, -1), date(2022, 10, 31));
        assert_eq!(PeriodType::Daily.shift(d, -30), date(2023, 1, 1));
    }
}
