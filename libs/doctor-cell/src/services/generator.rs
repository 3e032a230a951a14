use chrono::{Duration, NaiveDate};
use tracing::debug;

use shared_models::scheduling::{Appointment, AvailabilityException, AvailabilityRule};

use crate::models::AvailableSlot;
use crate::services::calendar::{rule_timezone, slot_is_open, weekday_index, CandidateSlot};

/// Project rules and exceptions onto `[date_from, date_to]` and drop every
/// candidate that overlaps a confirmed appointment. Output is sorted by UTC
/// start.
pub fn generate_slots(
    rules: &[AvailabilityRule],
    exceptions: &[AvailabilityException],
    confirmed: &[Appointment],
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Vec<AvailableSlot> {
    if rules.is_empty() {
        return Vec::new();
    }

    let blocked: Vec<&AvailabilityRule> = rules.iter().filter(|r| r.is_blocked).collect();
    let mut slots = Vec::new();

    for day in date_from.iter_days().take_while(|day| *day <= date_to) {
        let weekday = weekday_index(day);

        for rule in rules.iter().filter(|r| !r.is_blocked) {
            if rule.day_of_week != weekday || !rule.is_effective_on(day) {
                continue;
            }
            let Some(tz) = rule_timezone(rule) else {
                continue;
            };
            if rule.slot_duration_minutes <= 0 {
                continue;
            }

            let duration = Duration::minutes(rule.slot_duration_minutes as i64);
            let step = Duration::minutes((rule.slot_duration_minutes + rule.buffer_minutes) as i64);
            let window_end = day.and_time(rule.end_time);
            let mut cursor = day.and_time(rule.start_time);

            while cursor + duration <= window_end {
                if let Some(candidate) = CandidateSlot::new(tz, cursor, cursor + duration) {
                    let taken = confirmed
                        .iter()
                        .any(|a| a.overlaps(candidate.start_at, candidate.end_at));

                    if !taken && slot_is_open(&candidate, &blocked, exceptions) {
                        slots.push(AvailableSlot {
                            start_at: candidate.start_at,
                            end_at: candidate.end_at,
                            timezone: rule.timezone.clone(),
                        });
                    }
                }
                cursor += step;
            }
        }
    }

    slots.sort_by_key(|slot| (slot.start_at, slot.end_at));
    slots.dedup_by(|a, b| a.start_at == b.start_at && a.end_at == b.end_at);

    debug!("Generated {} slots between {} and {}", slots.len(), date_from, date_to);
    slots
}
