use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{Appointment, AppointmentType};
use crate::services::{booking, patients};
use crate::state::AppState;
use crate::store::SnapshotStore;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_datetime(raw: &str) -> Result<NaiveDateTime, AppError> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| AppError::BadRequest("Invalid datetime format. Use ISO datetime.".to_string()))
}

/// Date-only filter values expand to the start or end of that day; full
/// datetimes are taken as-is.
pub(crate) fn parse_filter_bound(raw: &str, end_of_day: bool) -> Result<NaiveDateTime, AppError> {
    if raw.len() == 10 {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest("Invalid date format. Use YYYY-MM-DD or ISO datetime.".to_string())
        })?;
        let time = if end_of_day {
            NaiveTime::from_hms_opt(23, 59, 59).unwrap()
        } else {
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        };
        return Ok(date.and_time(time));
    }
    parse_datetime(raw).map_err(|_| {
        AppError::BadRequest("Invalid date format. Use YYYY-MM-DD or ISO datetime.".to_string())
    })
}

// GET /appointments
#[derive(Deserialize)]
pub struct AppointmentsQuery {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub keyword: Option<String>,
    #[serde(default)]
    pub upcoming: bool,
}

pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let start = query
        .date_from
        .as_deref()
        .map(|raw| parse_filter_bound(raw, false))
        .transpose()?;
    let end = query
        .date_to
        .as_deref()
        .map(|raw| parse_filter_bound(raw, true))
        .transpose()?;

    let appointments = {
        let store = state.store.lock().unwrap();
        let mut appointments: Vec<Appointment> = store.appointments().cloned().collect();

        if let Some(patient_id) = &query.patient_id {
            appointments.retain(|a| &a.patient_id == patient_id);
        }
        if let Some(patient_name) = &query.patient_name {
            appointments.retain(|a| &a.patient_name == patient_name);
        }
        if let Some(status) = &query.status {
            appointments.retain(|a| a.status.as_str() == status);
        }
        if let Some(start) = start {
            appointments.retain(|a| a.datetime >= start);
        }
        if let Some(end) = end {
            appointments.retain(|a| a.datetime <= end);
        }
        if let Some(keyword) = &query.keyword {
            let keyword = keyword.to_lowercase();
            appointments.retain(|a| {
                a.notes.as_deref().unwrap_or("").to_lowercase().contains(&keyword)
                    || a.patient_name.to_lowercase().contains(&keyword)
                    || a.dentist.as_deref().unwrap_or("").to_lowercase().contains(&keyword)
            });
        }
        if query.upcoming {
            let now = Local::now().naive_local();
            appointments.retain(|a| a.datetime > now && a.blocks_calendar());
        }
        appointments
    };

    Ok(Json(serde_json::json!({ "appointments": appointments })))
}

// POST /appointments
#[derive(Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub datetime: String,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub dentist: Option<String>,
    pub notes: Option<String>,
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let requested = parse_datetime(&request.datetime)?;

    let appointment = {
        let mut store = state.store.lock().unwrap();
        let patient_id = resolve_patient(
            &store,
            request.patient_id.as_deref(),
            request.patient_name.as_deref(),
        )?;
        booking::schedule(
            &mut store,
            &patient_id,
            requested,
            request.appointment_type,
            request.dentist.as_deref(),
            request.notes.clone(),
        )?
    };

    Ok(Json(serde_json::json!({
        "message": "Appointment created successfully",
        "appointment": appointment,
    })))
}

/// A patient id wins when both identifiers are present; a name alone must
/// match a single record.
fn resolve_patient(
    store: &SnapshotStore,
    patient_id: Option<&str>,
    patient_name: Option<&str>,
) -> Result<String, AppError> {
    let lookup = patients::find_by_identifiers(store, patient_name, None, None, patient_id);
    match lookup.confident() {
        Some(patient) => Ok(patient.id.clone()),
        None => Err(AppError::NotFound("Patient not found".to_string())),
    }
}

// POST /appointment/:id/confirm
pub async fn confirm_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    {
        let mut store = state.store.lock().unwrap();
        booking::confirm(&mut store, &appointment_id)?;
    }
    Ok(Json(serde_json::json!({
        "message": "Appointment confirmed successfully"
    })))
}

// POST /appointment/:id/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    {
        let mut store = state.store.lock().unwrap();
        booking::cancel(&mut store, &appointment_id)?;
    }
    Ok(Json(serde_json::json!({
        "message": "Appointment cancelled successfully"
    })))
}

// POST /appointment/:id/reschedule
#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub new_datetime: String,
}

pub async fn reschedule_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<String>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let new_datetime = parse_datetime(&request.new_datetime)?;

    let appointment = {
        let mut store = state.store.lock().unwrap();
        booking::reschedule(&mut store, &appointment_id, new_datetime)?
    };

    Ok(Json(serde_json::json!({
        "message": "Appointment rescheduled successfully",
        "appointment": appointment,
    })))
}

// GET /appointments/suggestions
#[derive(Deserialize)]
pub struct SuggestionsQuery {
    pub patient_id: String,
    #[serde(rename = "type")]
    pub appointment_type: Option<AppointmentType>,
    pub dentist: Option<String>,
    pub days: Option<i64>,
}

pub async fn appointment_suggestions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SuggestionsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let appointment_type = query
        .appointment_type
        .unwrap_or(AppointmentType::RegularCheckup);
    let days = query.days.unwrap_or(7);
    if !(1..=365).contains(&days) {
        return Err(AppError::BadRequest(
            "Invalid days value. Use a number between 1 and 365.".to_string(),
        ));
    }

    let suggestions = {
        let store = state.store.lock().unwrap();
        let today = Local::now().date_naive();
        let dates: Vec<NaiveDate> = (1..=days).map(|offset| today + Duration::days(offset)).collect();
        booking::suggest(
            &store,
            &query.patient_id,
            Some(dates),
            appointment_type,
            query.dentist.as_deref(),
        )?
    };

    let suggestions: Vec<serde_json::Value> = suggestions
        .into_iter()
        .map(|(date, slots)| serde_json::json!({ "date": date, "slots": slots }))
        .collect();

    Ok(Json(serde_json::json!({ "suggestions": suggestions })))
}
