use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// An open interval on the clinic calendar. Computed on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub available: bool,
    pub dentist: Option<String>,
}
