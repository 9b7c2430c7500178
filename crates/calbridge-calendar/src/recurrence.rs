//! Recurrence rules: RRULE text form and occurrence expansion.

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dates;
use crate::error::CalendarError;

/// Upper bound on occurrences produced for a single query window.
pub const MAX_OCCURRENCES: usize = 10_000;

const RRULE_UNTIL_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn rrule_name(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    fn from_rrule_name(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Some(Self::Daily),
            "WEEKLY" => Some(Self::Weekly),
            "MONTHLY" => Some(Self::Monthly),
            "YEARLY" => Some(Self::Yearly),
            _ => None,
        }
    }

    /// Fixed-length period, if the frequency has one.
    fn fixed_period(&self, interval: u32) -> Option<Duration> {
        match self {
            Self::Daily => Some(Duration::days(i64::from(interval))),
            Self::Weekly => Some(Duration::weeks(i64::from(interval))),
            Self::Monthly | Self::Yearly => None,
        }
    }
}

/// How an event or reminder repeats.
///
/// `end_date` takes precedence over `occurrence` when both are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<u32>,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: None,
            end_date: None,
            occurrence: None,
        }
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn until(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn count(mut self, occurrence: u32) -> Self {
        self.occurrence = Some(occurrence);
        self
    }

    /// Effective interval; zero counts as one.
    pub fn interval(&self) -> u32 {
        self.interval.filter(|i| *i > 0).unwrap_or(1)
    }

    /// Drop settings the rule will never use: a zero interval or count, and
    /// the count when an end date is present.
    pub fn normalized(mut self) -> Self {
        if self.interval == Some(0) {
            self.interval = None;
        }
        if self.occurrence == Some(0) || self.end_date.is_some() {
            self.occurrence = None;
        }
        self
    }

    /// RFC 5545 RRULE value, e.g. `FREQ=WEEKLY;INTERVAL=2;COUNT=5`.
    pub fn to_rrule(&self) -> String {
        let mut rrule = format!("FREQ={}", self.frequency.rrule_name());
        if let Some(interval) = self.interval {
            rrule.push_str(&format!(";INTERVAL={}", interval));
        }
        if let Some(end) = self.end_date {
            rrule.push_str(&format!(";UNTIL={}", end.format(RRULE_UNTIL_FORMAT)));
        } else if let Some(count) = self.occurrence {
            rrule.push_str(&format!(";COUNT={}", count));
        }
        rrule
    }

    /// Start instants of the occurrences of a series beginning at `first_start`
    /// whose span `[start, start + duration]` overlaps `[window_start, window_end]`.
    pub fn occurrences_between(
        &self,
        first_start: DateTime<Utc>,
        duration: Duration,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let interval = self.interval();
        let count_limit = if self.end_date.is_none() {
            self.occurrence.filter(|c| *c > 0)
        } else {
            None
        };

        let mut index = self.first_candidate_index(first_start, duration, window_start, interval);
        let mut found = Vec::new();

        loop {
            if count_limit.is_some_and(|limit| index >= limit) {
                break;
            }
            let Some(start) = self.nth_start(first_start, index, interval) else {
                break;
            };
            if self.end_date.is_some_and(|until| start > until) || start > window_end {
                break;
            }
            if start + duration >= window_start {
                if found.len() == MAX_OCCURRENCES {
                    tracing::warn!(
                        rule = %self,
                        limit = MAX_OCCURRENCES,
                        "Recurrence expansion truncated"
                    );
                    break;
                }
                found.push(start);
            }
            index = match index.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }

        found
    }

    /// True if the series beginning at `first_start` has an occurrence starting at `instant`.
    pub fn has_occurrence_at(&self, first_start: DateTime<Utc>, instant: DateTime<Utc>) -> bool {
        self.occurrences_between(first_start, Duration::zero(), instant, instant)
            .contains(&instant)
    }

    /// Skip whole periods that end before the window for fixed-length frequencies.
    fn first_candidate_index(
        &self,
        first_start: DateTime<Utc>,
        duration: Duration,
        window_start: DateTime<Utc>,
        interval: u32,
    ) -> u32 {
        let Some(period) = self.frequency.fixed_period(interval) else {
            return 0;
        };
        let gap = window_start - duration - first_start;
        if gap <= Duration::zero() {
            return 0;
        }
        let periods = gap.num_seconds() / period.num_seconds().max(1);
        u32::try_from(periods).unwrap_or(u32::MAX)
    }

    fn nth_start(&self, first_start: DateTime<Utc>, n: u32, interval: u32) -> Option<DateTime<Utc>> {
        let steps = n.checked_mul(interval)?;
        match self.frequency {
            Frequency::Daily => first_start.checked_add_signed(Duration::days(i64::from(steps))),
            Frequency::Weekly => first_start.checked_add_signed(Duration::weeks(i64::from(steps))),
            Frequency::Monthly => first_start.checked_add_months(Months::new(steps)),
            Frequency::Yearly => {
                first_start.checked_add_months(Months::new(steps.checked_mul(12)?))
            }
        }
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rrule())
    }
}

impl FromStr for RecurrenceRule {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.trim().strip_prefix("RRULE:").unwrap_or(s.trim());
        let mut frequency = None;
        let mut rule_parts = (None, None, None);

        for part in body.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid_rrule(s, "expected KEY=VALUE"))?;
            match key.to_ascii_uppercase().as_str() {
                "FREQ" => {
                    frequency = Some(
                        Frequency::from_rrule_name(value)
                            .ok_or_else(|| invalid_rrule(s, "unsupported FREQ"))?,
                    )
                }
                "INTERVAL" => {
                    rule_parts.0 = Some(value.parse().map_err(|_| invalid_rrule(s, "bad INTERVAL"))?)
                }
                "UNTIL" => rule_parts.1 = Some(parse_until(value).ok_or_else(|| invalid_rrule(s, "bad UNTIL"))?),
                "COUNT" => {
                    rule_parts.2 = Some(value.parse().map_err(|_| invalid_rrule(s, "bad COUNT"))?)
                }
                _ => {}
            }
        }

        let frequency = frequency.ok_or_else(|| invalid_rrule(s, "missing FREQ"))?;
        let (interval, end_date, occurrence) = rule_parts;
        Ok(Self {
            frequency,
            interval,
            end_date,
            occurrence,
        })
    }
}

fn parse_until(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, RRULE_UNTIL_FORMAT) {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .map(dates::start_of_day)
}

fn invalid_rrule(rule: &str, reason: &str) -> CalendarError {
    CalendarError::InvalidArgument(format!("recurrence rule {:?}: {}", rule, reason))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        dates::parse(s).unwrap()
    }

    #[test]
    fn test_to_rrule() {
        let rule = RecurrenceRule::new(Frequency::Weekly).every(2).count(5);
        assert_eq!(rule.to_rrule(), "FREQ=WEEKLY;INTERVAL=2;COUNT=5");

        let rule = RecurrenceRule::new(Frequency::Daily)
            .until(utc("2024-03-01T00:00:00Z"))
            .count(3);
        assert_eq!(rule.to_string(), "FREQ=DAILY;UNTIL=20240301T000000Z");
    }

    #[test]
    fn test_parse_rrule() {
        let rule: RecurrenceRule = "RRULE:FREQ=MONTHLY;INTERVAL=3;UNTIL=20241231;WKST=MO"
            .parse()
            .unwrap();
        assert_eq!(rule.frequency, Frequency::Monthly);
        assert_eq!(rule.interval, Some(3));
        assert_eq!(rule.end_date, Some(utc("2024-12-31T00:00:00Z")));

        assert!("INTERVAL=2".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=HOURLY".parse::<RecurrenceRule>().is_err());
    }

    #[test]
    fn test_normalized_drops_unused_settings() {
        let rule = RecurrenceRule::new(Frequency::Daily)
            .every(0)
            .until(utc("2024-03-01T00:00:00Z"))
            .count(4)
            .normalized();
        assert_eq!(rule.interval, None);
        assert_eq!(rule.occurrence, None);
        assert_eq!(rule.interval(), 1);
    }

    #[test]
    fn test_weekly_count_limits_occurrences() {
        let rule = RecurrenceRule::new(Frequency::Weekly).count(3);
        let first = utc("2024-01-01T09:00:00Z");
        let found = rule.occurrences_between(
            first,
            Duration::hours(1),
            utc("2024-01-01T00:00:00Z"),
            utc("2024-12-31T00:00:00Z"),
        );
        assert_eq!(
            found,
            vec![first, utc("2024-01-08T09:00:00Z"), utc("2024-01-15T09:00:00Z")]
        );
    }

    #[test]
    fn test_until_is_inclusive() {
        let rule = RecurrenceRule::new(Frequency::Daily).until(utc("2024-01-03T09:00:00Z"));
        let found = rule.occurrences_between(
            utc("2024-01-01T09:00:00Z"),
            Duration::minutes(30),
            utc("2024-01-01T00:00:00Z"),
            utc("2024-01-31T00:00:00Z"),
        );
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_window_only_returns_overlapping() {
        let rule = RecurrenceRule::new(Frequency::Daily).every(2);
        let found = rule.occurrences_between(
            utc("2024-01-01T23:00:00Z"),
            Duration::hours(2),
            utc("2024-01-04T00:30:00Z"),
            utc("2024-01-06T00:00:00Z"),
        );
        // Jan 3 23:00-01:00 overlaps the window start; Jan 5 23:00 is inside.
        assert_eq!(found, vec![utc("2024-01-03T23:00:00Z"), utc("2024-01-05T23:00:00Z")]);
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        let rule = RecurrenceRule::new(Frequency::Monthly).count(3);
        let found = rule.occurrences_between(
            utc("2024-01-31T12:00:00Z"),
            Duration::hours(1),
            utc("2024-01-01T00:00:00Z"),
            utc("2024-12-31T00:00:00Z"),
        );
        assert_eq!(
            found,
            vec![
                utc("2024-01-31T12:00:00Z"),
                utc("2024-02-29T12:00:00Z"),
                utc("2024-03-31T12:00:00Z"),
            ]
        );
    }

    #[test]
    fn test_far_future_window_skips_ahead() {
        let rule = RecurrenceRule::new(Frequency::Daily);
        let found = rule.occurrences_between(
            utc("2000-01-01T08:00:00Z"),
            Duration::hours(1),
            utc("2060-06-01T00:00:00Z"),
            utc("2060-06-03T00:00:00Z"),
        );
        assert_eq!(found, vec![utc("2060-06-01T08:00:00Z"), utc("2060-06-02T08:00:00Z")]);
    }

    #[test]
    fn test_long_window_stops_at_limit() {
        let rule = RecurrenceRule::new(Frequency::Daily);
        let first = utc("2000-01-01T08:00:00Z");
        let found = rule.occurrences_between(
            first,
            Duration::hours(1),
            first,
            utc("2030-01-01T00:00:00Z"),
        );
        assert_eq!(found.len(), MAX_OCCURRENCES);
        assert_eq!(found.last(), Some(&(first + Duration::days(MAX_OCCURRENCES as i64 - 1))));

        let bounded = RecurrenceRule::new(Frequency::Daily).count(MAX_OCCURRENCES as u32);
        let found = bounded.occurrences_between(
            first,
            Duration::hours(1),
            first,
            utc("2030-01-01T00:00:00Z"),
        );
        assert_eq!(found.len(), MAX_OCCURRENCES);
    }

    #[test]
    fn test_has_occurrence_at() {
        let rule = RecurrenceRule::new(Frequency::Weekly).count(2);
        let first = utc("2024-01-01T09:00:00Z");
        assert!(rule.has_occurrence_at(first, utc("2024-01-08T09:00:00Z")));
        assert!(!rule.has_occurrence_at(first, utc("2024-01-15T09:00:00Z")));
        assert!(!rule.has_occurrence_at(first, utc("2024-01-08T10:00:00Z")));
    }
}
