use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::models::{Appointment, ClinicAvailability, Patient};

pub mod conversations;

pub use conversations::ConversationLog;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PatientsFile {
    #[serde(default)]
    patients: Vec<Patient>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AppointmentsFile {
    #[serde(default)]
    appointments: Vec<Appointment>,
}

/// In-memory copy of the clinic records, backed by JSON files in the data
/// directory. Absent files mean empty collections; a file that exists but
/// does not parse is an error the caller must deal with.
#[derive(Debug)]
pub struct SnapshotStore {
    data_dir: PathBuf,
    patients: BTreeMap<String, Patient>,
    appointments: BTreeMap<String, Appointment>,
    availability: Option<ClinicAvailability>,
}

impl SnapshotStore {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|source| StoreError::Write {
            path: data_dir.clone(),
            source,
        })?;

        let mut store = SnapshotStore {
            data_dir,
            patients: BTreeMap::new(),
            appointments: BTreeMap::new(),
            availability: None,
        };
        store.reload()?;
        store.availability = load_json(&store.data_dir.join("availability.json"))?;

        tracing::info!(
            patients = store.patients.len(),
            appointments = store.appointments.len(),
            availability_loaded = store.availability.is_some(),
            "loaded clinic snapshot from {}",
            store.data_dir.display()
        );
        Ok(store)
    }

    /// Re-read patients and appointments from disk. Availability is
    /// configuration and is only read at startup.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let patients: PatientsFile = load_json(&self.patients_path())?.unwrap_or_default();
        self.patients = patients
            .patients
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let appointments: AppointmentsFile =
            load_json(&self.appointments_path())?.unwrap_or_default();
        self.appointments = appointments
            .appointments
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        Ok(())
    }

    pub fn availability(&self) -> Option<&ClinicAvailability> {
        self.availability.as_ref()
    }

    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.patients.get(id)
    }

    pub fn patients(&self) -> impl Iterator<Item = &Patient> {
        self.patients.values()
    }

    pub fn appointment(&self, id: &str) -> Option<&Appointment> {
        self.appointments.get(id)
    }

    pub fn appointment_mut(&mut self, id: &str) -> Option<&mut Appointment> {
        self.appointments.get_mut(id)
    }

    pub fn appointments(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.values()
    }

    pub fn insert_patient(&mut self, patient: Patient) -> Result<(), StoreError> {
        self.patients.insert(patient.id.clone(), patient);
        self.persist_patients()
    }

    pub fn upsert_appointment(&mut self, appointment: Appointment) -> Result<(), StoreError> {
        self.appointments.insert(appointment.id.clone(), appointment);
        self.persist_appointments()
    }

    pub fn persist_patients(&self) -> Result<(), StoreError> {
        let file = PatientsFile {
            patients: self.patients.values().cloned().collect(),
        };
        write_json(&self.patients_path(), &file)
    }

    pub fn persist_appointments(&self) -> Result<(), StoreError> {
        let file = AppointmentsFile {
            appointments: self.appointments.values().cloned().collect(),
        };
        write_json(&self.appointments_path(), &file)
    }

    /// Next free id in the `P###` sequence. Ids that do not fit the pattern
    /// are skipped rather than treated as errors.
    pub fn next_patient_id(&self) -> String {
        next_id(self.patients.keys(), 'P')
    }

    pub fn next_appointment_id(&self) -> String {
        next_id(self.appointments.keys(), 'A')
    }

    fn patients_path(&self) -> PathBuf {
        self.data_dir.join("patients.json")
    }

    fn appointments_path(&self) -> PathBuf {
        self.data_dir.join("appointments.json")
    }
}

fn next_id<'a>(ids: impl Iterator<Item = &'a String>, prefix: char) -> String {
    let max = ids
        .filter_map(|id| id.strip_prefix(prefix).and_then(|n| n.parse::<u32>().ok()))
        .max()
        .unwrap_or(0);
    format!("{}{:03}", prefix, max + 1)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let value = serde_json::from_slice(&raw).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

/// Write through a temp file in the same directory and rename over the
/// target, so a crash mid-write never leaves a truncated snapshot.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.write_all(&json).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.persist(path).map_err(|err| StoreError::Write {
        path: path.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}
