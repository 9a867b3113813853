pub mod appointments;
pub mod availability;
pub mod chat;
pub mod conversations;
pub mod health;
pub mod patients;
