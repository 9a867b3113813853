use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::appointment::AppointmentStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub patient_phone: Option<String>,
    pub patient_email: Option<String>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub is_new_patient_registration: bool,
    pub patient_registration_data: Option<PatientRegistrationRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub schedule_update: Option<ScheduleUpdate>,
    pub conversation_id: String,
    pub timestamp: NaiveDateTime,
}

/// Structured booking mutation carried by an assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub patient_name: Option<String>,
    pub status: AppointmentStatus,
    pub original_appointment: Option<NaiveDateTime>,
    pub new_appointment: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRegistrationRequest {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub date_of_birth: String,
    pub insurance_info: Option<String>,
    pub notes: Option<String>,
}
