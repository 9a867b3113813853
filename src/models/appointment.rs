use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub datetime: NaiveDateTime,
    pub duration: i32,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub dentist: Option<String>,
}

impl Appointment {
    pub fn end(&self) -> NaiveDateTime {
        self.datetime + Duration::minutes(self.duration as i64)
    }

    /// Cancelled and completed appointments no longer block calendar time.
    pub fn blocks_calendar(&self) -> bool {
        !matches!(
            self.status,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Cancelled,
    Completed,
    Rescheduled,
    Pending,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Rescheduled => "rescheduled",
            AppointmentStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "completed" => Some(AppointmentStatus::Completed),
            "rescheduled" => Some(AppointmentStatus::Rescheduled),
            "pending" => Some(AppointmentStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    RegularCheckup,
    InitialConsultation,
    FollowUp,
    Emergency,
    DeepCleaning,
    Filling,
    Crown,
    Extraction,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::RegularCheckup => "regular_checkup",
            AppointmentType::InitialConsultation => "initial_consultation",
            AppointmentType::FollowUp => "follow_up",
            AppointmentType::Emergency => "emergency",
            AppointmentType::DeepCleaning => "deep_cleaning",
            AppointmentType::Filling => "filling",
            AppointmentType::Crown => "crown",
            AppointmentType::Extraction => "extraction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regular_checkup" => Some(AppointmentType::RegularCheckup),
            "initial_consultation" => Some(AppointmentType::InitialConsultation),
            "follow_up" => Some(AppointmentType::FollowUp),
            "emergency" => Some(AppointmentType::Emergency),
            "deep_cleaning" => Some(AppointmentType::DeepCleaning),
            "filling" => Some(AppointmentType::Filling),
            "crown" => Some(AppointmentType::Crown),
            "extraction" => Some(AppointmentType::Extraction),
            _ => None,
        }
    }
}
