use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{PatientDetails, PatientLookup, PatientRegistrationRequest};
use crate::services::patients;
use crate::state::AppState;

// GET /patients
#[derive(Deserialize)]
pub struct PatientsQuery {
    pub patient_id: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PatientsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let patients = {
        let store = state.store.lock().unwrap();
        store
            .patients()
            .filter(|p| query.patient_id.as_ref().map_or(true, |id| &p.id == id))
            .filter(|p| query.name.as_ref().map_or(true, |name| &p.name == name))
            .filter(|p| query.phone.as_ref().map_or(true, |phone| &p.phone == phone))
            .filter(|p| query.email.as_ref().map_or(true, |email| &p.email == email))
            .map(|p| {
                serde_json::json!({
                    "id": p.id,
                    "name": p.name,
                    "phone": p.phone,
                    "email": p.email,
                    "insurance_info": p.insurance_info,
                    "notes": p.notes,
                })
            })
            .collect::<Vec<_>>()
    };

    Ok(Json(serde_json::json!({ "patients": patients })))
}

// POST /register-patient
pub async fn register_patient(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PatientRegistrationRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let details = PatientDetails {
        name: Some(request.name.clone()),
        phone: Some(request.phone.clone()),
        email: Some(request.email.clone()),
        date_of_birth: Some(request.date_of_birth.clone()),
        insurance_info: request.insurance_info.clone(),
    };
    let (valid, errors) = patients::validate_patient_data(&details);
    if !valid {
        return Err(AppError::Validation(errors));
    }

    let date_of_birth =
        NaiveDate::parse_from_str(&request.date_of_birth, "%Y-%m-%d").map_err(|_| {
            AppError::Validation(vec![
                "Invalid date_of_birth format. Use YYYY-MM-DD".to_string()
            ])
        })?;

    let patient = {
        let mut store = state.store.lock().unwrap();
        let existing = patients::find_by_identifiers(
            &store,
            Some(&request.name),
            Some(&request.phone),
            Some(&request.email),
            None,
        );
        if existing.confident().is_some() {
            return Err(AppError::Conflict(
                "A patient with this information already exists in our system".to_string(),
            ));
        }
        patients::create_patient(
            &mut store,
            &request.name,
            &request.phone,
            &request.email,
            date_of_birth,
            request.insurance_info.as_deref(),
            request.notes.as_deref(),
        )?
    };

    Ok(Json(serde_json::json!({
        "message": "Patient registered successfully",
        "patient": {
            "id": patient.id,
            "name": patient.name,
            "phone": patient.phone,
            "email": patient.email,
        }
    })))
}

// POST /find-patient
#[derive(Deserialize)]
pub struct FindPatientQuery {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

pub async fn find_patient(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FindPatientQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let lookup = {
        let store = state.store.lock().unwrap();
        patients::find_by_identifiers(
            &store,
            query.name.as_deref(),
            query.phone.as_deref(),
            query.email.as_deref(),
            None,
        )
    };

    let body = match lookup {
        PatientLookup::Match(patient) => serde_json::json!({
            "found": true,
            "patient": {
                "id": patient.id,
                "name": patient.name,
                "phone": patient.phone,
                "email": patient.email,
            }
        }),
        PatientLookup::Ambiguous { candidates } => serde_json::json!({
            "found": false,
            "multiple_matches": candidates
                .iter()
                .map(|p| serde_json::json!({
                    "id": p.id,
                    "name": p.name,
                    "phone": p.phone,
                    "email": p.email,
                }))
                .collect::<Vec<_>>(),
            "message": "Multiple patients found. Please provide more specific information."
        }),
        PatientLookup::NewPatient { .. } => serde_json::json!({
            "found": false,
            "message": "No patient found with the provided information. Would you like to register as a new patient?"
        }),
    };

    Ok(Json(body))
}
