pub mod ai;
pub mod booking;
pub mod chat;
pub mod extract;
pub mod patients;
pub mod slots;
