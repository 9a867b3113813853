use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub insurance_info: Option<String>,
    pub notes: Option<String>,
}

/// Outcome of resolving caller-supplied identifiers against the patient records.
#[derive(Debug, Clone)]
pub enum PatientLookup {
    /// Exactly one patient matched with no competing candidate.
    Match(Patient),
    /// Nothing matched; lists the registration fields still needed.
    NewPatient { missing_fields: Vec<String> },
    /// Two or more candidates scored too close to tell apart.
    Ambiguous { candidates: Vec<Patient> },
}

impl PatientLookup {
    pub fn confident(&self) -> Option<&Patient> {
        match self {
            PatientLookup::Match(patient) => Some(patient),
            _ => None,
        }
    }
}

/// Partially-known patient fields, as extracted from free text or supplied
/// piecemeal by the caller. Validated before any record is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientDetails {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<String>,
    pub insurance_info: Option<String>,
}

impl PatientDetails {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.date_of_birth.is_none()
            && self.insurance_info.is_none()
    }
}
