use chrono::{Duration, NaiveDate, NaiveTime};

use crate::models::{Appointment, AppointmentType, TimeSlot};
use crate::store::SnapshotStore;

const SLOT_STEP_MINUTES: i64 = 15;

pub fn find_available_slots(
    store: &SnapshotStore,
    date: NaiveDate,
    appointment_type: AppointmentType,
    dentist: Option<&str>,
) -> Vec<TimeSlot> {
    find_available_slots_excluding(store, date, appointment_type, dentist, None)
}

/// Slot search with one appointment left out of the conflict set, so a
/// reschedule can land back on the time it already occupies.
pub fn find_available_slots_excluding(
    store: &SnapshotStore,
    date: NaiveDate,
    appointment_type: AppointmentType,
    dentist: Option<&str>,
    exclude_id: Option<&str>,
) -> Vec<TimeSlot> {
    let avail = match store.availability() {
        Some(avail) => avail,
        None => return Vec::new(),
    };
    if avail.is_holiday(date) {
        return Vec::new();
    }

    let hours = match avail.hours_for(date) {
        Some(hours) if !hours.is_closed() => hours,
        _ => return Vec::new(),
    };
    let (open_time, close_time) = match (hours.open_time(), hours.close_time()) {
        (Some(open), Some(close)) => (open, close),
        _ => return Vec::new(),
    };

    let duration = match avail.duration_for(appointment_type) {
        Some(duration) => duration,
        None => return Vec::new(),
    };

    let (lunch_start, lunch_end) = avail.lunch_window();

    // Conflicts are clinic-wide; the dentist on a slot is a tag, not a filter.
    let existing: Vec<&Appointment> = store
        .appointments()
        .filter(|a| a.datetime.date() == date && a.blocks_calendar())
        .filter(|a| exclude_id != Some(a.id.as_str()))
        .collect();

    let mut slots = Vec::new();
    let mut current = date.and_time(open_time);

    // Candidates advance in 15-minute steps; the date guards stop the walk
    // from wrapping past midnight when hours run late.
    while current.date() == date && current.time() <= close_time {
        let slot_end = current + Duration::minutes(duration as i64);

        if slot_end.date() == date
            && slot_end.time() <= close_time
            && !overlaps_lunch(current.time(), slot_end.time(), lunch_start, lunch_end)
        {
            let conflict = existing
                .iter()
                .any(|appt| current < appt.end() && slot_end > appt.datetime);
            if !conflict {
                slots.push(TimeSlot {
                    start_time: current.time(),
                    end_time: slot_end.time(),
                    available: true,
                    dentist: dentist.map(|d| d.to_string()),
                });
            }
        }

        current += Duration::minutes(SLOT_STEP_MINUTES);
    }

    slots
}

fn overlaps_lunch(
    start: NaiveTime,
    end: NaiveTime,
    lunch_start: NaiveTime,
    lunch_end: NaiveTime,
) -> bool {
    start < lunch_end && end > lunch_start
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    use crate::models::AppointmentStatus;

    const AVAILABILITY: &str = r#"{
        "clinic_hours": {
            "monday": {"open": "08:00", "close": "17:00"},
            "tuesday": {"open": "08:00", "close": "17:00"},
            "saturday": {"open": "09:00", "close": "14:00"},
            "sunday": {"open": "closed", "close": "closed"}
        },
        "appointment_types": {
            "regular_checkup": {"duration": 60, "description": "Routine cleaning and exam"},
            "deep_cleaning": {"duration": 90, "description": "Periodontal cleaning"},
            "emergency": {"duration": 600, "description": "Same-day emergency"}
        },
        "time_slot_rules": {"lunch_break": {"start": "12:00", "end": "13:00"}},
        "holidays_2025": ["2025-07-04"]
    }"#;

    fn store_with_availability(dir: &TempDir) -> SnapshotStore {
        std::fs::write(dir.path().join("availability.json"), AVAILABILITY).unwrap();
        SnapshotStore::open(dir.path()).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn appt(id: &str, when: &str, duration: i32, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: id.to_string(),
            patient_id: "P001".to_string(),
            patient_name: "Alice Johnson".to_string(),
            datetime: NaiveDateTime::parse_from_str(when, "%Y-%m-%d %H:%M").unwrap(),
            duration,
            appointment_type: AppointmentType::RegularCheckup,
            status,
            notes: None,
            dentist: None,
        }
    }

    fn starts(slots: &[TimeSlot]) -> Vec<NaiveTime> {
        slots.iter().map(|s| s.start_time).collect()
    }

    #[test]
    fn test_monday_checkup_slots_skip_lunch() {
        let dir = TempDir::new().unwrap();
        let store = store_with_availability(&dir);

        // 2025-06-16 is a Monday
        let slots = find_available_slots(
            &store,
            date("2025-06-16"),
            AppointmentType::RegularCheckup,
            None,
        );
        let starts = starts(&slots);

        assert_eq!(slots.len(), 26);
        assert_eq!(starts[0], time("08:00"));
        assert_eq!(*starts.last().unwrap(), time("16:00"));
        // 11:00-12:00 touches the lunch boundary without overlapping
        assert!(starts.contains(&time("11:00")));
        assert!(!starts.contains(&time("11:30")));
        assert!(!starts.contains(&time("12:00")));
        assert!(!starts.contains(&time("12:45")));
        assert!(starts.contains(&time("13:00")));
    }

    #[test]
    fn test_slots_are_chronological_and_end_matches_duration() {
        let dir = TempDir::new().unwrap();
        let store = store_with_availability(&dir);

        let slots = find_available_slots(
            &store,
            date("2025-06-16"),
            AppointmentType::DeepCleaning,
            None,
        );
        assert!(slots.windows(2).all(|w| w[0].start_time < w[1].start_time));
        for slot in &slots {
            assert_eq!(slot.end_time, slot.start_time + Duration::minutes(90));
        }
        // 90 minutes cannot end by noon after 10:30
        assert!(!starts(&slots).contains(&time("10:45")));
    }

    #[test]
    fn test_holiday_yields_no_slots() {
        let dir = TempDir::new().unwrap();
        let store = store_with_availability(&dir);

        // 2025-07-04 is a Friday but listed as a holiday
        let slots = find_available_slots(
            &store,
            date("2025-07-04"),
            AppointmentType::RegularCheckup,
            None,
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn test_closed_and_unlisted_days_yield_no_slots() {
        let dir = TempDir::new().unwrap();
        let store = store_with_availability(&dir);

        // Sunday is marked closed, Wednesday has no entry at all
        assert!(find_available_slots(
            &store,
            date("2025-06-15"),
            AppointmentType::RegularCheckup,
            None
        )
        .is_empty());
        assert!(find_available_slots(
            &store,
            date("2025-06-18"),
            AppointmentType::RegularCheckup,
            None
        )
        .is_empty());
    }

    #[test]
    fn test_missing_availability_or_duration_yields_no_slots() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(find_available_slots(
            &store,
            date("2025-06-16"),
            AppointmentType::RegularCheckup,
            None
        )
        .is_empty());

        let dir = TempDir::new().unwrap();
        let store = store_with_availability(&dir);
        // No configured duration for crowns in the fixture
        assert!(
            find_available_slots(&store, date("2025-06-16"), AppointmentType::Crown, None)
                .is_empty()
        );
    }

    #[test]
    fn test_duration_longer_than_open_window_yields_no_slots() {
        let dir = TempDir::new().unwrap();
        let store = store_with_availability(&dir);

        // 600 minutes never fits inside 08:00-17:00
        let slots = find_available_slots(
            &store,
            date("2025-06-16"),
            AppointmentType::Emergency,
            None,
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn test_existing_appointment_blocks_overlapping_slots() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_availability(&dir);
        store
            .upsert_appointment(appt(
                "A001",
                "2025-06-16 10:00",
                60,
                AppointmentStatus::Scheduled,
            ))
            .unwrap();

        let starts = starts(&find_available_slots(
            &store,
            date("2025-06-16"),
            AppointmentType::RegularCheckup,
            None,
        ));
        assert!(starts.contains(&time("09:00")));
        assert!(!starts.contains(&time("09:15")));
        assert!(!starts.contains(&time("10:00")));
        assert!(!starts.contains(&time("10:45")));
        // Back-to-back is fine: starts exactly when the other ends
        assert!(starts.contains(&time("11:00")));
    }

    #[test]
    fn test_cancelled_and_completed_appointments_do_not_block() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_availability(&dir);
        store
            .upsert_appointment(appt(
                "A001",
                "2025-06-16 10:00",
                60,
                AppointmentStatus::Cancelled,
            ))
            .unwrap();
        store
            .upsert_appointment(appt(
                "A002",
                "2025-06-16 14:00",
                60,
                AppointmentStatus::Completed,
            ))
            .unwrap();

        let starts = starts(&find_available_slots(
            &store,
            date("2025-06-16"),
            AppointmentType::RegularCheckup,
            None,
        ));
        assert!(starts.contains(&time("10:00")));
        assert!(starts.contains(&time("14:00")));
    }

    #[test]
    fn test_excluded_appointment_frees_its_own_slot() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_availability(&dir);
        store
            .upsert_appointment(appt(
                "A001",
                "2025-06-16 10:00",
                60,
                AppointmentStatus::Scheduled,
            ))
            .unwrap();

        let blocked = find_available_slots(
            &store,
            date("2025-06-16"),
            AppointmentType::RegularCheckup,
            None,
        );
        assert!(!starts(&blocked).contains(&time("10:00")));

        let freed = find_available_slots_excluding(
            &store,
            date("2025-06-16"),
            AppointmentType::RegularCheckup,
            None,
            Some("A001"),
        );
        assert!(starts(&freed).contains(&time("10:00")));
    }

    #[test]
    fn test_requested_dentist_is_tagged_on_slots() {
        let dir = TempDir::new().unwrap();
        let store = store_with_availability(&dir);

        let slots = find_available_slots(
            &store,
            date("2025-06-16"),
            AppointmentType::RegularCheckup,
            Some("Dr. Sarah Chen"),
        );
        assert!(slots
            .iter()
            .all(|s| s.dentist.as_deref() == Some("Dr. Sarah Chen")));
    }

    #[test]
    fn test_malformed_hours_yield_no_slots() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("availability.json"),
            r#"{
                "clinic_hours": {"monday": {"open": "8am", "close": "17:00"}},
                "appointment_types": {"regular_checkup": {"duration": 60, "description": ""}}
            }"#,
        )
        .unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        assert!(find_available_slots(
            &store,
            date("2025-06-16"),
            AppointmentType::RegularCheckup,
            None
        )
        .is_empty());
    }
}
