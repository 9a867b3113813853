pub mod appointment;
pub mod availability;
pub mod chat;
pub mod conversation;
pub mod intent;
pub mod patient;
pub mod slot;

pub use appointment::{Appointment, AppointmentStatus, AppointmentType};
pub use availability::{ClinicAvailability, ClinicHours};
pub use chat::{ChatRequest, ChatResponse, PatientRegistrationRequest, ScheduleUpdate};
pub use conversation::{Conversation, ConversationMessage};
pub use intent::Intent;
pub use patient::{Patient, PatientDetails, PatientLookup};
pub use slot::TimeSlot;
