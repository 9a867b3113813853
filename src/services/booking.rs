use chrono::{Duration, Local, NaiveDate, NaiveDateTime};

use crate::models::{Appointment, AppointmentStatus, AppointmentType, TimeSlot};
use crate::services::slots;
use crate::store::{SnapshotStore, StoreError};

/// A requested time counts as hitting a slot when it lands within a minute
/// of the slot start, absorbing jitter from text-parsed timestamps.
const SLOT_TOLERANCE_SECONDS: i64 = 60;

#[derive(Debug)]
pub enum BookingError {
    PatientNotFound { patient_id: String },
    AppointmentNotFound { appointment_id: String },
    SlotUnavailable { requested: NaiveDateTime },
    Store(StoreError),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::PatientNotFound { patient_id } => {
                write!(f, "no patient record matches {patient_id}")
            }
            BookingError::AppointmentNotFound { appointment_id } => {
                write!(f, "no appointment matches {appointment_id}")
            }
            BookingError::SlotUnavailable { requested } => {
                write!(
                    f,
                    "Sorry, {} isn't available. Could you pick a different time?",
                    requested.format("%Y-%m-%d %H:%M")
                )
            }
            BookingError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        BookingError::Store(err)
    }
}

/// Book a new appointment at the requested time. The snapshot is re-read
/// first so a stale in-memory copy cannot double-book a slot another writer
/// just took.
pub fn schedule(
    store: &mut SnapshotStore,
    patient_id: &str,
    requested: NaiveDateTime,
    appointment_type: AppointmentType,
    dentist: Option<&str>,
    notes: Option<String>,
) -> Result<Appointment, BookingError> {
    store.reload()?;

    let patient = match store.patient(patient_id) {
        Some(patient) => patient.clone(),
        None => {
            return Err(BookingError::PatientNotFound {
                patient_id: patient_id.to_string(),
            })
        }
    };

    if requested < Local::now().naive_local() {
        return Err(BookingError::SlotUnavailable { requested });
    }
    if !slot_matches(store, requested, appointment_type, dentist, None) {
        return Err(BookingError::SlotUnavailable { requested });
    }

    let duration = store
        .availability()
        .and_then(|avail| avail.duration_for(appointment_type))
        .unwrap_or(60);

    let appointment = Appointment {
        id: store.next_appointment_id(),
        patient_id: patient.id.clone(),
        patient_name: patient.name.clone(),
        datetime: requested,
        duration,
        appointment_type,
        status: AppointmentStatus::Scheduled,
        notes,
        dentist: dentist.map(|d| d.to_string()),
    };
    store.upsert_appointment(appointment.clone())?;

    tracing::info!(
        appointment_id = %appointment.id,
        patient_id = %patient.id,
        datetime = %requested,
        "scheduled appointment"
    );
    Ok(appointment)
}

/// Cancelling is idempotent: an already-cancelled appointment just stays
/// cancelled.
pub fn cancel(
    store: &mut SnapshotStore,
    appointment_id: &str,
) -> Result<Appointment, BookingError> {
    store.reload()?;

    let appointment = match store.appointment_mut(appointment_id) {
        Some(appointment) => {
            appointment.status = AppointmentStatus::Cancelled;
            appointment.clone()
        }
        None => {
            return Err(BookingError::AppointmentNotFound {
                appointment_id: appointment_id.to_string(),
            })
        }
    };
    store.persist_appointments()?;

    tracing::info!(appointment_id = %appointment_id, "cancelled appointment");
    Ok(appointment)
}

pub fn confirm(
    store: &mut SnapshotStore,
    appointment_id: &str,
) -> Result<Appointment, BookingError> {
    store.reload()?;

    let appointment = match store.appointment_mut(appointment_id) {
        Some(appointment) => {
            appointment.status = AppointmentStatus::Confirmed;
            appointment.clone()
        }
        None => {
            return Err(BookingError::AppointmentNotFound {
                appointment_id: appointment_id.to_string(),
            })
        }
    };
    store.persist_appointments()?;

    tracing::info!(appointment_id = %appointment_id, "confirmed appointment");
    Ok(appointment)
}

/// Move an appointment to a new time, keeping its type and dentist. The
/// appointment itself is excluded from the conflict check so moving within
/// its own window (or back to the same time) succeeds.
pub fn reschedule(
    store: &mut SnapshotStore,
    appointment_id: &str,
    new_datetime: NaiveDateTime,
) -> Result<Appointment, BookingError> {
    store.reload()?;

    let (appointment_type, dentist) = match store.appointment(appointment_id) {
        Some(appointment) => (appointment.appointment_type, appointment.dentist.clone()),
        None => {
            return Err(BookingError::AppointmentNotFound {
                appointment_id: appointment_id.to_string(),
            })
        }
    };

    if !slot_matches(
        store,
        new_datetime,
        appointment_type,
        dentist.as_deref(),
        Some(appointment_id),
    ) {
        return Err(BookingError::SlotUnavailable {
            requested: new_datetime,
        });
    }

    let appointment = match store.appointment_mut(appointment_id) {
        Some(appointment) => {
            appointment.datetime = new_datetime;
            appointment.status = AppointmentStatus::Rescheduled;
            appointment.clone()
        }
        None => {
            return Err(BookingError::AppointmentNotFound {
                appointment_id: appointment_id.to_string(),
            })
        }
    };
    store.persist_appointments()?;

    tracing::info!(
        appointment_id = %appointment_id,
        new_datetime = %new_datetime,
        "rescheduled appointment"
    );
    Ok(appointment)
}

/// Open slots per candidate date, skipping dates with nothing free. Defaults
/// to the next seven days starting tomorrow; explicit dates keep their order.
pub fn suggest(
    store: &SnapshotStore,
    patient_id: &str,
    dates: Option<Vec<NaiveDate>>,
    appointment_type: AppointmentType,
    dentist: Option<&str>,
) -> Result<Vec<(NaiveDate, Vec<TimeSlot>)>, BookingError> {
    if store.patient(patient_id).is_none() {
        return Err(BookingError::PatientNotFound {
            patient_id: patient_id.to_string(),
        });
    }

    let dates = dates.unwrap_or_else(|| {
        let today = Local::now().date_naive();
        (1..=7).map(|offset| today + Duration::days(offset)).collect()
    });

    Ok(dates
        .into_iter()
        .map(|date| {
            (
                date,
                slots::find_available_slots(store, date, appointment_type, dentist),
            )
        })
        .filter(|(_, slots)| !slots.is_empty())
        .collect())
}

fn slot_matches(
    store: &SnapshotStore,
    requested: NaiveDateTime,
    appointment_type: AppointmentType,
    dentist: Option<&str>,
    exclude_id: Option<&str>,
) -> bool {
    let slots = slots::find_available_slots_excluding(
        store,
        requested.date(),
        appointment_type,
        dentist,
        exclude_id,
    );
    slots.iter().any(|slot| {
        let slot_start = requested.date().and_time(slot.start_time);
        (slot_start - requested).num_seconds().abs() < SLOT_TOLERANCE_SECONDS
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
    use tempfile::TempDir;

    use crate::models::Patient;

    const AVAILABILITY: &str = r#"{
        "clinic_hours": {
            "monday": {"open": "08:00", "close": "17:00"},
            "tuesday": {"open": "08:00", "close": "17:00"},
            "saturday": {"open": "09:00", "close": "14:00"}
        },
        "appointment_types": {
            "regular_checkup": {"duration": 60, "description": ""},
            "deep_cleaning": {"duration": 90, "description": ""}
        },
        "time_slot_rules": {"lunch_break": {"start": "12:00", "end": "13:00"}},
        "holidays_2025": ["2025-07-04"]
    }"#;

    fn store_with_patient(dir: &TempDir) -> SnapshotStore {
        std::fs::write(dir.path().join("availability.json"), AVAILABILITY).unwrap();
        let mut store = SnapshotStore::open(dir.path()).unwrap();
        store
            .insert_patient(Patient {
                id: "P001".to_string(),
                name: "Alice Johnson".to_string(),
                phone: "555-010-0000".to_string(),
                email: "alice@example.com".to_string(),
                date_of_birth: NaiveDate::parse_from_str("1990-01-15", "%Y-%m-%d").unwrap(),
                insurance_info: None,
                notes: None,
            })
            .unwrap();
        store
    }

    /// Booking rejects past times, so tests aim at the next Monday.
    fn next_monday_at(hhmm: &str) -> NaiveDateTime {
        let mut date = Local::now().date_naive() + Duration::days(1);
        while date.weekday() != Weekday::Mon {
            date += Duration::days(1);
        }
        date.and_time(NaiveTime::parse_from_str(hhmm, "%H:%M").unwrap())
    }

    #[test]
    fn test_schedule_creates_persisted_appointment() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_patient(&dir);

        let appt = schedule(
            &mut store,
            "P001",
            next_monday_at("10:00"),
            AppointmentType::RegularCheckup,
            Some("Dr. Sarah Chen"),
            None,
        )
        .unwrap();

        assert_eq!(appt.id, "A001");
        assert_eq!(appt.status, AppointmentStatus::Scheduled);
        assert_eq!(appt.duration, 60);
        assert_eq!(appt.datetime, next_monday_at("10:00"));
        assert_eq!(appt.patient_name, "Alice Johnson");

        let reopened = SnapshotStore::open(dir.path()).unwrap();
        assert!(reopened.appointment("A001").is_some());
    }

    #[test]
    fn test_schedule_unknown_patient_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_patient(&dir);

        let err = schedule(
            &mut store,
            "P999",
            next_monday_at("10:00"),
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BookingError::PatientNotFound { .. }));
    }

    #[test]
    fn test_schedule_tolerates_sub_minute_offsets_only() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_patient(&dir);

        let near = next_monday_at("10:00") + Duration::seconds(30);
        assert!(schedule(
            &mut store,
            "P001",
            near,
            AppointmentType::RegularCheckup,
            None,
            None
        )
        .is_ok());

        let off = next_monday_at("14:07");
        let err = schedule(
            &mut store,
            "P001",
            off,
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable { .. }));
    }

    #[test]
    fn test_schedule_rejects_past_times() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_patient(&dir);

        let yesterday = Local::now().naive_local() - Duration::days(1);
        let err = schedule(
            &mut store,
            "P001",
            yesterday,
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable { .. }));
    }

    #[test]
    fn test_second_overlapping_schedule_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_patient(&dir);

        schedule(
            &mut store,
            "P001",
            next_monday_at("10:00"),
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap();

        let err = schedule(
            &mut store,
            "P001",
            next_monday_at("10:30"),
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable { .. }));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_patient(&dir);

        let appt = schedule(
            &mut store,
            "P001",
            next_monday_at("10:00"),
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap();

        let cancelled = cancel(&mut store, &appt.id).unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

        let again = cancel(&mut store, &appt.id).unwrap();
        assert_eq!(again.status, AppointmentStatus::Cancelled);

        let err = cancel(&mut store, "A999").unwrap_err();
        assert!(matches!(err, BookingError::AppointmentNotFound { .. }));
    }

    #[test]
    fn test_confirm_marks_appointment_confirmed() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_patient(&dir);

        let appt = schedule(
            &mut store,
            "P001",
            next_monday_at("10:00"),
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap();

        let confirmed = confirm(&mut store, &appt.id).unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    }

    #[test]
    fn test_reschedule_to_own_slot_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_patient(&dir);

        let appt = schedule(
            &mut store,
            "P001",
            next_monday_at("10:00"),
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap();

        let moved = reschedule(&mut store, &appt.id, next_monday_at("10:00")).unwrap();
        assert_eq!(moved.status, AppointmentStatus::Rescheduled);
        assert_eq!(moved.datetime, next_monday_at("10:00"));
    }

    #[test]
    fn test_reschedule_onto_other_appointment_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_patient(&dir);

        schedule(
            &mut store,
            "P001",
            next_monday_at("10:00"),
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap();
        let second = schedule(
            &mut store,
            "P001",
            next_monday_at("14:00"),
            AppointmentType::RegularCheckup,
            None,
            None,
        )
        .unwrap();

        let err = reschedule(&mut store, &second.id, next_monday_at("10:30")).unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable { .. }));

        let moved = reschedule(&mut store, &second.id, next_monday_at("11:00")).unwrap();
        assert_eq!(moved.datetime, next_monday_at("11:00"));
    }

    #[test]
    fn test_suggest_skips_dates_without_slots() {
        let dir = TempDir::new().unwrap();
        let store = store_with_patient(&dir);

        // A holiday followed by an ordinary Monday, in that order
        let holiday = NaiveDate::parse_from_str("2025-07-04", "%Y-%m-%d").unwrap();
        let monday = next_monday_at("08:00").date();
        let suggestions = suggest(
            &store,
            "P001",
            Some(vec![holiday, monday]),
            AppointmentType::RegularCheckup,
            None,
        )
        .unwrap();

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].0, monday);
        assert!(!suggestions[0].1.is_empty());
    }

    #[test]
    fn test_suggest_defaults_to_week_ahead() {
        let dir = TempDir::new().unwrap();
        let store = store_with_patient(&dir);

        let today = Local::now().date_naive();
        let suggestions = suggest(
            &store,
            "P001",
            None,
            AppointmentType::RegularCheckup,
            None,
        )
        .unwrap();

        assert!(!suggestions.is_empty());
        for (date, slots) in &suggestions {
            assert!(*date > today && *date <= today + Duration::days(7));
            assert!(!slots.is_empty());
        }

        let err = suggest(&store, "P999", None, AppointmentType::RegularCheckup, None).unwrap_err();
        assert!(matches!(err, BookingError::PatientNotFound { .. }));
    }
}
