use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use shared_database::{BookingTx, RowLock};
use shared_models::scheduling::{AvailabilityException, AvailabilityRule};

use crate::models::{AvailabilityError, ResolvedSlot};
use crate::services::calendar::{rule_timezone, slot_is_open, weekday_index, CandidateSlot};

/// Decide whether `requested_start` is a slot boundary of some open rule,
/// using the same stepping grid and exception handling as the generator.
/// Returns the slot end and the rule's timezone label.
pub fn resolve_candidate(
    rules: &[AvailabilityRule],
    exceptions: &[AvailabilityException],
    requested_start: DateTime<Utc>,
) -> Option<(DateTime<Utc>, String)> {
    let blocked: Vec<&AvailabilityRule> = rules.iter().filter(|r| r.is_blocked).collect();

    for rule in rules.iter().filter(|r| !r.is_blocked) {
        let Some(tz) = rule_timezone(rule) else {
            continue;
        };

        let local_start = requested_start.with_timezone(&tz).naive_local();
        let day = local_start.date();
        if weekday_index(day) != rule.day_of_week || !rule.is_effective_on(day) {
            continue;
        }

        let window_start = day.and_time(rule.start_time);
        let window_end = day.and_time(rule.end_time);
        if local_start < window_start {
            continue;
        }

        let local_end = local_start + Duration::minutes(rule.slot_duration_minutes as i64);
        if local_end > window_end {
            continue;
        }

        let step_seconds = (rule.slot_duration_minutes + rule.buffer_minutes) as i64 * 60;
        let elapsed = (local_start - window_start).num_seconds();
        if rule.slot_duration_minutes <= 0 || step_seconds <= 0 || elapsed % step_seconds != 0 {
            continue;
        }

        let Some(candidate) = CandidateSlot::new(tz, local_start, local_end) else {
            continue;
        };
        // The second pass through an ambiguous hour is not a generated slot.
        if candidate.start_at != requested_start {
            continue;
        }

        if slot_is_open(&candidate, &blocked, exceptions) {
            return Some((candidate.end_at, rule.timezone.clone()));
        }
    }

    None
}

/// Resolve a requested start inside an open transaction. `None` means the
/// instant is not a bookable boundary of the doctor's schedule.
pub async fn resolve_slot(
    tx: &mut dyn BookingTx,
    doctor_id: Uuid,
    requested_start: DateTime<Utc>,
    check_confirmed_conflict: bool,
) -> Result<Option<ResolvedSlot>, AvailabilityError> {
    let rules = tx.list_rules(doctor_id).await?;
    if rules.is_empty() {
        debug!("Doctor {} has no availability rules", doctor_id);
        return Ok(None);
    }
    let exceptions = tx.list_exceptions(doctor_id).await?;

    let Some((end_at, timezone)) = resolve_candidate(&rules, &exceptions, requested_start) else {
        debug!("{} is not a slot boundary for doctor {}", requested_start, doctor_id);
        return Ok(None);
    };

    let has_conflict = if check_confirmed_conflict {
        tx.find_confirmed_overlap(doctor_id, requested_start, end_at, None, RowLock::None)
            .await?
            .is_some()
    } else {
        false
    };

    Ok(Some(ResolvedSlot {
        end_at,
        timezone,
        has_conflict,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    use crate::services::generator::generate_slots;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn rule(day_of_week: i32, start: NaiveTime, end: NaiveTime, timezone: &str) -> AvailabilityRule {
        AvailabilityRule {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            day_of_week,
            start_time: start,
            end_time: end,
            timezone: timezone.to_string(),
            slot_duration_minutes: 50,
            buffer_minutes: 10,
            is_blocked: false,
            effective_from: None,
            effective_to: None,
            created_at: Utc::now(),
        }
    }

    fn weekly_block(anchor: NaiveDate, start: NaiveTime, end: NaiveTime) -> AvailabilityException {
        AvailabilityException {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            date: anchor,
            is_unavailable: true,
            is_blocking: true,
            is_recurring: true,
            recurrence_type: Some(shared_models::scheduling::RecurrenceType::Weekly),
            recurrence_interval: 1,
            recurrence_until: None,
            weekday: None,
            start_time: Some(start),
            end_time: Some(end),
            note: None,
            sort_order: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_accepts_grid_boundaries_only() {
        let rules = vec![rule(0, time(9, 0), time(12, 0), "Asia/Amman")];

        // 10:00 Amman is 07:00 UTC.
        let on_grid = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
        let (end, tz) = resolve_candidate(&rules, &[], on_grid).unwrap();
        assert_eq!(end, on_grid + Duration::minutes(50));
        assert_eq!(tz, "Asia/Amman");

        let off_grid = Utc.with_ymd_and_hms(2026, 3, 2, 7, 10, 0).unwrap();
        assert!(resolve_candidate(&rules, &[], off_grid).is_none());

        // 11:50 local would end after the window.
        let overflow = Utc.with_ymd_and_hms(2026, 3, 2, 8, 50, 0).unwrap();
        assert!(resolve_candidate(&rules, &[], overflow).is_none());

        let wrong_day = Utc.with_ymd_and_hms(2026, 3, 3, 7, 0, 0).unwrap();
        assert!(resolve_candidate(&rules, &[], wrong_day).is_none());
    }

    #[test]
    fn test_every_generated_slot_resolves() {
        let mut closed = rule(2, time(13, 0), time(14, 0), "America/New_York");
        closed.is_blocked = true;
        let rules = vec![
            rule(0, time(9, 0), time(12, 0), "Asia/Amman"),
            rule(2, time(8, 0), time(17, 0), "America/New_York"),
            rule(6, time(0, 30), time(5, 0), "America/New_York"),
            closed,
        ];
        let exceptions = vec![weekly_block(date(2026, 3, 4), time(10, 0), time(11, 0))];

        let from = date(2026, 2, 23);
        let to = date(2026, 4, 20);
        let slots = generate_slots(&rules, &exceptions, &[], from, to);
        assert!(!slots.is_empty());

        for slot in &slots {
            let resolved = resolve_candidate(&rules, &exceptions, slot.start_at);
            assert_eq!(
                resolved,
                Some((slot.end_at, slot.timezone.clone())),
                "slot starting {} did not resolve",
                slot.start_at
            );
        }
    }

    #[test]
    fn test_rejects_instants_the_generator_skips() {
        let rules = vec![rule(2, time(8, 0), time(12, 0), "UTC")];
        let exceptions = vec![weekly_block(date(2026, 3, 4), time(9, 0), time(10, 0))];

        // Wednesday 09:00 is blocked by the weekly exception.
        let blocked = Utc.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap();
        assert!(resolve_candidate(&rules, &exceptions, blocked).is_none());

        let open = Utc.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap();
        assert!(resolve_candidate(&rules, &exceptions, open).is_some());
    }
}
