use chrono::{Local, NaiveDate};

use crate::models::{Appointment, Patient, PatientDetails, PatientLookup};
use crate::store::{SnapshotStore, StoreError};

const EXACT_NAME_SCORE: i32 = 3;
const PARTIAL_NAME_SCORE: i32 = 1;
const PHONE_SCORE: i32 = 3;
const EMAIL_SCORE: i32 = 2;
const AMBIGUITY_MARGIN: i32 = 1;
const MAX_AMBIGUOUS_CANDIDATES: usize = 3;

/// Score every patient against the supplied identifiers and classify the
/// outcome. A known patient id wins outright; otherwise name, phone and
/// email contribute weighted points and close scores come back ambiguous.
pub fn find_by_identifiers(
    store: &SnapshotStore,
    name: Option<&str>,
    phone: Option<&str>,
    email: Option<&str>,
    patient_id: Option<&str>,
) -> PatientLookup {
    if let Some(id) = patient_id {
        if let Some(patient) = store.patient(id) {
            return PatientLookup::Match(patient.clone());
        }
    }

    let name_query = name
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty());
    let phone_query = phone.map(normalize_phone).filter(|p| !p.is_empty());
    let email_query = email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());

    let mut matches: Vec<(&Patient, i32)> = Vec::new();
    for patient in store.patients() {
        let mut score = 0;

        if let Some(query) = &name_query {
            let stored = patient.name.to_lowercase();
            if stored.trim() == query {
                score += EXACT_NAME_SCORE;
            } else if stored.contains(query.as_str()) {
                score += PARTIAL_NAME_SCORE;
            }
        }
        if let Some(query) = &phone_query {
            if normalize_phone(&patient.phone) == *query {
                score += PHONE_SCORE;
            }
        }
        if let Some(query) = &email_query {
            if patient.email.trim().to_lowercase() == *query {
                score += EMAIL_SCORE;
            }
        }

        if score > 0 {
            matches.push((patient, score));
        }
    }

    matches.sort_by(|a, b| b.1.cmp(&a.1));

    if matches.is_empty() {
        return PatientLookup::NewPatient {
            missing_fields: required_fields_for_new_patient(name, phone, email),
        };
    }
    if matches.len() == 1 || matches[0].1 > matches[1].1 {
        return PatientLookup::Match(matches[0].0.clone());
    }
    if matches[0].1 - matches[1].1 <= AMBIGUITY_MARGIN {
        let candidates = matches
            .iter()
            .take(MAX_AMBIGUOUS_CANDIDATES)
            .map(|(patient, _)| (*patient).clone())
            .collect();
        return PatientLookup::Ambiguous { candidates };
    }
    PatientLookup::Match(matches[0].0.clone())
}

/// Phone numbers compare digits-only, so formatting never splits a match.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// date_of_birth and insurance_info are always requested for a new patient,
/// on top of whichever identifiers the caller left out.
fn required_fields_for_new_patient(
    name: Option<&str>,
    phone: Option<&str>,
    email: Option<&str>,
) -> Vec<String> {
    let mut missing = Vec::new();
    if name.map_or(true, str::is_empty) {
        missing.push("name".to_string());
    }
    if phone.map_or(true, str::is_empty) {
        missing.push("phone".to_string());
    }
    if email.map_or(true, str::is_empty) {
        missing.push("email".to_string());
    }
    missing.push("date_of_birth".to_string());
    missing.push("insurance_info".to_string());
    missing
}

pub fn create_patient(
    store: &mut SnapshotStore,
    name: &str,
    phone: &str,
    email: &str,
    date_of_birth: NaiveDate,
    insurance_info: Option<&str>,
    notes: Option<&str>,
) -> Result<Patient, StoreError> {
    store.reload()?;

    let patient = Patient {
        id: store.next_patient_id(),
        name: name.trim().to_string(),
        phone: phone.trim().to_string(),
        email: email.trim().to_string(),
        date_of_birth,
        insurance_info: insurance_info
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        notes: notes.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
    };
    store.insert_patient(patient.clone())?;

    tracing::info!(patient_id = %patient.id, name = %patient.name, "created patient");
    Ok(patient)
}

/// All validation problems are reported at once, not just the first.
pub fn validate_patient_data(details: &PatientDetails) -> (bool, Vec<String>) {
    let mut errors = Vec::new();

    let required = [
        ("name", details.name.as_deref()),
        ("phone", details.phone.as_deref()),
        ("email", details.email.as_deref()),
        ("date_of_birth", details.date_of_birth.as_deref()),
    ];
    for (field, value) in required {
        if value.map_or(true, str::is_empty) {
            errors.push(format!("Missing required field: {field}"));
        }
    }

    if let Some(email) = &details.email {
        if !email.contains('@') {
            errors.push("Invalid email format".to_string());
        }
    }
    if let Some(phone) = &details.phone {
        if normalize_phone(phone).len() < 10 {
            errors.push("Phone number must have at least 10 digits".to_string());
        }
    }
    if let Some(name) = &details.name {
        if name.trim().len() < 2 {
            errors.push("Name must be at least 2 characters long".to_string());
        }
    }

    (errors.is_empty(), errors)
}

/// Every appointment tied to the patient by id or by name, newest first.
pub fn patient_appointments(store: &SnapshotStore, patient: &Patient) -> Vec<Appointment> {
    let mut appts: Vec<Appointment> = store
        .appointments()
        .filter(|a| a.patient_id == patient.id || a.patient_name == patient.name)
        .cloned()
        .collect();
    appts.sort_by(|a, b| b.datetime.cmp(&a.datetime));
    appts
}

/// Future appointments that still hold calendar time, soonest first.
pub fn upcoming_appointments(store: &SnapshotStore, patient: &Patient) -> Vec<Appointment> {
    let now = Local::now().naive_local();
    let mut upcoming: Vec<Appointment> = patient_appointments(store, patient)
        .into_iter()
        .filter(|a| a.datetime > now && a.blocks_calendar())
        .collect();
    upcoming.sort_by(|a, b| a.datetime.cmp(&b.datetime));
    upcoming
}
