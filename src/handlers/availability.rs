use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::AppointmentType;
use crate::services::slots;
use crate::state::AppState;

// GET /availability
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date_str: String,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let date = NaiveDate::parse_from_str(&query.date_str, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest("Invalid date format. Use YYYY-MM-DD.".to_string()))?;

    let mut availability = serde_json::Map::new();
    {
        let store = state.store.lock().unwrap();
        for appointment_type in [
            AppointmentType::RegularCheckup,
            AppointmentType::InitialConsultation,
        ] {
            let open = slots::find_available_slots(&store, date, appointment_type, None);
            availability.insert(
                appointment_type.as_str().to_string(),
                serde_json::to_value(open).unwrap_or_default(),
            );
        }
    }

    Ok(Json(serde_json::json!({
        "date": query.date_str,
        "availability": availability,
    })))
}
