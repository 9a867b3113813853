use serde::{Deserialize, Serialize};

/// What the caller wants, as classified from their message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Book,
    Reschedule,
    Cancel,
    Confirm,
    GeneralQuestion,
}
