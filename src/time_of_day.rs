use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Timelike};

use crate::error::{ScheduleError, ValueKind};

/// A wall-clock time within a day, `00:00:00` through `23:59:59`.
///
/// The derived ordering is chronological and matches the lexicographic order
/// of [`TimeOfDay::canonical_text`], which the target registry relies on.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
    second: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32, second: u32) -> Option<Self> {
        Self::validate(hour, minute, second).then_some(Self {
            hour,
            minute,
            second,
        })
    }

    pub fn validate(hour: u32, minute: u32, second: u32) -> bool {
        hour <= 23 && minute <= 59 && second <= 59
    }

    /// Parses free-form text by keeping its digits and right-aligning them
    /// onto seconds, minutes, then hours (`"930"` is `00:09:30`).
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let (hour, minute, second) = right_aligned_components(input)
            .ok_or_else(|| ScheduleError::invalid(ValueKind::TimeOfDay, input))?;
        Self::new(hour, minute, second)
            .ok_or_else(|| ScheduleError::invalid(ValueKind::TimeOfDay, input))
    }

    pub fn from_datetime<Tz: TimeZone>(value: &DateTime<Tz>) -> Self {
        Self {
            hour: value.hour(),
            minute: value.minute(),
            second: value.second(),
        }
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn second(&self) -> u32 {
        self.second
    }

    pub fn canonical_text(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }

    pub fn to_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, self.second).unwrap_or(NaiveTime::MIN)
    }

    /// Next local instant strictly after `now` at this time of day: today if
    /// still ahead, otherwise tomorrow.
    pub fn next_occurrence(&self, now: &DateTime<Local>) -> DateTime<Local> {
        self.next_occurrence_in_tz(now, &Local)
            .unwrap_or_else(|| *now + chrono::Duration::days(1))
    }

    pub fn next_occurrence_in_tz<Tz>(
        &self,
        now: &DateTime<Tz>,
        timezone: &Tz,
    ) -> Option<DateTime<Tz>>
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        let time = self.to_naive_time();
        // A DST gap can swallow the time on one day; never on three in a row.
        for day_offset in 0_u64..3 {
            let date = now.date_naive().checked_add_days(Days::new(day_offset))?;
            let candidate = match resolve_local_datetime(timezone, date.and_time(time)) {
                Some(value) => value,
                None => continue,
            };

            if candidate > *now {
                return Some(candidate);
            }
        }

        None
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn resolve_local_datetime<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => None,
    }
}

/// Splits the digits of `input` into `(hours, minutes, seconds)`, filling from
/// the right two digits at a time. Accepts one to six digits.
pub(crate) fn right_aligned_components(input: &str) -> Option<(u32, u32, u32)> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() || digits.len() > 6 {
        return None;
    }

    let (rest, seconds) = digits.split_at(digits.len().saturating_sub(2));
    let (hours, minutes) = rest.split_at(rest.len().saturating_sub(2));
    Some((
        parse_component(hours)?,
        parse_component(minutes)?,
        parse_component(seconds)?,
    ))
}

fn parse_component(text: &str) -> Option<u32> {
    if text.is_empty() {
        Some(0)
    } else {
        text.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::America::New_York;

    use super::*;

    fn tod(text: &str) -> TimeOfDay {
        TimeOfDay::parse(text).expect("valid time of day")
    }

    #[test]
    fn digits_fill_from_the_right() {
        assert_eq!(tod("7"), TimeOfDay::new(0, 0, 7).expect("valid"));
        assert_eq!(tod("45"), TimeOfDay::new(0, 0, 45).expect("valid"));
        assert_eq!(tod("930"), TimeOfDay::new(0, 9, 30).expect("valid"));
        assert_eq!(tod("1530"), TimeOfDay::new(0, 15, 30).expect("valid"));
        assert_eq!(tod("73000"), TimeOfDay::new(7, 30, 0).expect("valid"));
        assert_eq!(tod("235959"), TimeOfDay::new(23, 59, 59).expect("valid"));
    }

    #[test]
    fn separators_are_ignored() {
        assert_eq!(tod("07:30:00"), tod("073000"));
        assert_eq!(tod("7h30m00s"), tod("073000"));
        assert_eq!(tod(" 12-00-01 "), TimeOfDay::new(12, 0, 1).expect("valid"));
    }

    #[test]
    fn rejects_bad_lengths_and_ranges() {
        for input in ["", "abc", "1234567", "24:00:00", "00:60:00", "00:00:60", "99"] {
            let err = TimeOfDay::parse(input).expect_err("should reject");
            assert_eq!(
                err,
                ScheduleError::InvalidFormat {
                    kind: ValueKind::TimeOfDay,
                    input: input.to_string(),
                }
            );
        }
    }

    #[test]
    fn canonical_text_round_trips_every_second_of_the_day() {
        for hour in 0..24 {
            for minute in 0..60 {
                for second in 0..60 {
                    let value = TimeOfDay::new(hour, minute, second).expect("valid");
                    assert_eq!(tod(&value.canonical_text()), value);
                }
            }
        }
    }

    #[test]
    fn text_order_matches_chronological_order() {
        let samples = ["00:00:00", "00:00:59", "00:01:00", "09:59:59", "10:00:00", "23:59:59"];
        for a in samples {
            for b in samples {
                let (ta, tb) = (tod(a), tod(b));
                assert_eq!(ta.canonical_text() < tb.canonical_text(), ta < tb, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn next_occurrence_is_today_when_still_ahead() {
        let now = Local
            .with_ymd_and_hms(2026, 6, 10, 9, 0, 0)
            .single()
            .expect("valid");
        let next = tod("10:00:00").next_occurrence(&now);
        assert_eq!(next.date_naive(), now.date_naive());
        assert_eq!(TimeOfDay::from_datetime(&next), tod("10:00:00"));
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow_when_passed_or_equal() {
        let now = Local
            .with_ymd_and_hms(2026, 6, 10, 15, 0, 0)
            .single()
            .expect("valid");
        let tomorrow = NaiveDate::from_ymd_opt(2026, 6, 11).expect("date");
        assert_eq!(tod("10:00:00").next_occurrence(&now).date_naive(), tomorrow);
        assert_eq!(tod("15:00:00").next_occurrence(&now).date_naive(), tomorrow);
    }

    #[test]
    fn dst_gap_moves_to_the_following_day() {
        let now = New_York
            .with_ymd_and_hms(2026, 3, 8, 0, 30, 0)
            .single()
            .expect("valid");
        let next = tod("02:30:00")
            .next_occurrence_in_tz(&now, &New_York)
            .expect("next occurrence");
        assert_eq!(
            next.date_naive(),
            NaiveDate::from_ymd_opt(2026, 3, 9).expect("valid date")
        );
    }

    #[test]
    fn dst_fold_takes_the_first_instant() {
        let now = New_York
            .with_ymd_and_hms(2026, 11, 1, 0, 0, 0)
            .single()
            .expect("valid");
        let naive = NaiveDate::from_ymd_opt(2026, 11, 1)
            .expect("date")
            .and_time(tod("01:30:00").to_naive_time());
        let expected = match New_York.from_local_datetime(&naive) {
            LocalResult::Ambiguous(first, _second) => first,
            _ => panic!("expected ambiguous local time"),
        };
        let actual = tod("01:30:00")
            .next_occurrence_in_tz(&now, &New_York)
            .expect("next");
        assert_eq!(actual, expected);
    }
}
