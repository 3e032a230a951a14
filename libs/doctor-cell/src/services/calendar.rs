//! Calendar arithmetic shared by the slot generator and the slot resolver.
//!
//! Slots are stepped in the rule's local wall-clock time and only converted to
//! UTC once a candidate exists, so both sides reach the same decision for the
//! same instant.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use shared_models::scheduling::{
    intervals_overlap, AvailabilityException, AvailabilityRule, RecurrenceType,
};

use crate::models::AvailabilityError;

pub fn parse_timezone(name: &str) -> Result<Tz, AvailabilityError> {
    name.parse::<Tz>()
        .map_err(|_| AvailabilityError::ValidationError(format!("Unknown timezone: {}", name)))
}

/// Timezone of a stored rule; rules are validated on write, so a failure here
/// only means the row was edited out of band.
pub fn rule_timezone(rule: &AvailabilityRule) -> Option<Tz> {
    match rule.timezone.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            warn!("Skipping rule {} with unknown timezone {}", rule.id, rule.timezone);
            None
        }
    }
}

/// Monday = 0 ... Sunday = 6.
pub fn weekday_index(day: NaiveDate) -> i32 {
    day.weekday().num_days_from_monday() as i32
}

/// The first instant with this wall-clock reading. `None` inside a DST gap.
pub fn localize(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Like [`localize`], but a reading inside a DST gap moves forward past it.
pub fn localize_lenient(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    localize(tz, local).or_else(|| localize(tz, local + Duration::hours(1)))
}

fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to.year() as i64 - from.year() as i64) * 12 + (to.month() as i64 - from.month() as i64)
}

/// Whether an exception, recurring or not, falls on `day`.
pub fn exception_applies_on(exception: &AvailabilityException, day: NaiveDate) -> bool {
    let recurrence = match (exception.is_recurring, exception.recurrence_type) {
        (true, Some(recurrence)) => recurrence,
        _ => return exception.date == day,
    };

    if day < exception.date {
        return false;
    }
    if exception.recurrence_until.is_some_and(|until| day > until) {
        return false;
    }

    let interval = exception.recurrence_interval.max(1) as i64;

    match recurrence {
        RecurrenceType::Weekly => {
            let target = exception.weekday.unwrap_or_else(|| weekday_index(exception.date));
            if weekday_index(day) != target {
                return false;
            }
            // First occurrence is the first target weekday on or after the anchor date.
            let offset = (target - weekday_index(exception.date)).rem_euclid(7) as i64;
            let first = exception.date + Duration::days(offset);
            let elapsed = (day - first).num_days();
            elapsed >= 0 && elapsed % (7 * interval) == 0
        }
        RecurrenceType::Monthly => {
            day.day() == exception.date.day() && months_between(exception.date, day) % interval == 0
        }
    }
}

/// A candidate slot in both the rule's local time and UTC.
#[derive(Debug, Clone, Copy)]
pub struct CandidateSlot {
    pub day: NaiveDate,
    pub local_start: NaiveDateTime,
    pub local_end: NaiveDateTime,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl CandidateSlot {
    pub fn new(tz: Tz, local_start: NaiveDateTime, local_end: NaiveDateTime) -> Option<Self> {
        let start_at = localize(tz, local_start)?;
        let end_at = localize_lenient(tz, local_end)?;
        Some(Self {
            day: local_start.date(),
            local_start,
            local_end,
            start_at,
            end_at,
        })
    }
}

fn blocked_rule_overlaps(rule: &AvailabilityRule, slot: &CandidateSlot) -> bool {
    let Some(tz) = rule_timezone(rule) else {
        return false;
    };

    let first_day = slot.start_at.with_timezone(&tz).date_naive();
    let last_day = (slot.end_at - Duration::seconds(1)).with_timezone(&tz).date_naive();

    let mut days = vec![first_day];
    if last_day != first_day {
        days.push(last_day);
    }

    days.into_iter().any(|day| {
        if weekday_index(day) != rule.day_of_week || !rule.is_effective_on(day) {
            return false;
        }
        let window = (
            localize_lenient(tz, day.and_time(rule.start_time)),
            localize_lenient(tz, day.and_time(rule.end_time)),
        );
        match window {
            (Some(start), Some(end)) => intervals_overlap(start, end, slot.start_at, slot.end_at),
            _ => false,
        }
    })
}

fn exception_window(
    exception: &AvailabilityException,
    day: NaiveDate,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    exception
        .window()
        .map(|(start, end)| (day.and_time(start), day.and_time(end)))
}

/// Final open/closed decision for one candidate.
///
/// Blocked rules form the base layer. Exceptions active on the slot's local
/// day are then applied in their stored order: a blocking exception that
/// overlaps the slot closes it, a re-opening exception whose window contains
/// the slot opens it, and the last one to touch the slot wins. Exception
/// windows are read in the slot's local time.
pub fn slot_is_open(
    slot: &CandidateSlot,
    blocked_rules: &[&AvailabilityRule],
    exceptions: &[AvailabilityException],
) -> bool {
    let mut open = !blocked_rules.iter().any(|rule| blocked_rule_overlaps(rule, slot));

    for exception in exceptions.iter().filter(|e| exception_applies_on(e, slot.day)) {
        let window = exception_window(exception, slot.day);

        if exception.is_blocking {
            if !exception.is_unavailable {
                continue;
            }
            let overlaps = window.map_or(true, |(start, end)| {
                intervals_overlap(start, end, slot.local_start, slot.local_end)
            });
            if overlaps {
                open = false;
            }
        } else {
            let covers = window.map_or(true, |(start, end)| {
                start <= slot.local_start && slot.local_end <= end
            });
            if covers {
                open = true;
            }
        }
    }

    open
}
