use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::models::appointment::AppointmentType;

/// Clinic calendar configuration, loaded once from `availability.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicAvailability {
    #[serde(default)]
    pub clinic_hours: HashMap<String, ClinicHours>,
    #[serde(default)]
    pub appointment_types: HashMap<AppointmentType, AppointmentTypeRule>,
    #[serde(default)]
    pub time_slot_rules: TimeSlotRules,
    #[serde(default)]
    pub dentist_availability: HashMap<String, DentistAvailability>,
    #[serde(default, alias = "holidays_2025")]
    pub holidays: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicHours {
    pub open: String,
    pub close: String,
}

impl ClinicHours {
    /// Closed days are marked with the literal string "closed".
    pub fn is_closed(&self) -> bool {
        self.open == "closed"
    }

    pub fn open_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.open, "%H:%M").ok()
    }

    pub fn close_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.close, "%H:%M").ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentTypeRule {
    pub duration: i32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeSlotRules {
    #[serde(default)]
    pub lunch_break: Option<LunchBreak>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LunchBreak {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DentistAvailability {
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub schedule: HashMap<String, String>,
}

impl ClinicAvailability {
    pub fn hours_for(&self, date: NaiveDate) -> Option<&ClinicHours> {
        let weekday = date.format("%A").to_string().to_lowercase();
        self.clinic_hours.get(&weekday)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn duration_for(&self, appointment_type: AppointmentType) -> Option<i32> {
        self.appointment_types
            .get(&appointment_type)
            .map(|rule| rule.duration)
    }

    /// Lunch break window; 12:00-13:00 unless configured otherwise.
    pub fn lunch_window(&self) -> (NaiveTime, NaiveTime) {
        let lunch = self.time_slot_rules.lunch_break.as_ref();
        let start = lunch
            .and_then(|lb| NaiveTime::parse_from_str(&lb.start, "%H:%M").ok())
            .unwrap_or_else(|| NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        let end = lunch
            .and_then(|lb| NaiveTime::parse_from_str(&lb.end, "%H:%M").ok())
            .unwrap_or_else(|| NaiveTime::from_hms_opt(13, 0, 0).unwrap());
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_hours_lookup_by_weekday() {
        let avail: ClinicAvailability = serde_json::from_str(
            r#"{"clinic_hours":{"monday":{"open":"08:00","close":"17:00"},"sunday":{"open":"closed","close":"closed"}}}"#,
        )
        .unwrap();

        // 2025-06-16 is a Monday
        let monday = avail.hours_for(date("2025-06-16")).unwrap();
        assert_eq!(monday.open, "08:00");
        assert!(!monday.is_closed());

        // 2025-06-15 is a Sunday
        let sunday = avail.hours_for(date("2025-06-15")).unwrap();
        assert!(sunday.is_closed());

        let empty: ClinicAvailability = serde_json::from_str(r#"{"clinic_hours":{}}"#).unwrap();
        assert!(empty.hours_for(date("2025-06-16")).is_none());
    }

    #[test]
    fn test_holidays_alias_key() {
        let avail: ClinicAvailability =
            serde_json::from_str(r#"{"holidays_2025":["2025-01-01","2025-12-25"]}"#).unwrap();
        assert!(avail.is_holiday(date("2025-01-01")));
        assert!(!avail.is_holiday(date("2025-01-02")));
    }

    #[test]
    fn test_lunch_window_defaults() {
        let avail: ClinicAvailability = serde_json::from_str(r#"{}"#).unwrap();
        let (start, end) = avail.lunch_window();
        assert_eq!(start.to_string(), "12:00:00");
        assert_eq!(end.to_string(), "13:00:00");

        let avail: ClinicAvailability = serde_json::from_str(
            r#"{"time_slot_rules":{"lunch_break":{"start":"11:30","end":"12:30"}}}"#,
        )
        .unwrap();
        let (start, end) = avail.lunch_window();
        assert_eq!(start.to_string(), "11:30:00");
        assert_eq!(end.to_string(), "12:30:00");
    }

    #[test]
    fn test_duration_per_appointment_type() {
        let avail: ClinicAvailability = serde_json::from_str(
            r#"{"appointment_types":{"regular_checkup":{"duration":60,"description":"Routine cleaning and exam"},"deep_cleaning":{"duration":90,"description":""}}}"#,
        )
        .unwrap();
        assert_eq!(avail.duration_for(AppointmentType::RegularCheckup), Some(60));
        assert_eq!(avail.duration_for(AppointmentType::DeepCleaning), Some(90));
        assert_eq!(avail.duration_for(AppointmentType::Crown), None);
    }
}
