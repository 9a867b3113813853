use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;

use super::{LlmProvider, Message};
use crate::models::{AppointmentStatus, ConversationMessage, ScheduleUpdate};

const SYSTEM_PROMPT: &str = r#"You are the scheduling assistant for a dental clinic. Help patients book, reschedule, confirm, and cancel appointments, and answer questions about the clinic.

Guidelines:
- Be warm, professional, and concise.
- Always restate the exact date and time before finalizing any change.
- Only offer times that appear in the patient context you are given; never invent availability.
- If no patient record is attached, ask for the caller's full name or patient ID before making changes.

When your reply results in a concrete scheduling change, append a machine-readable block on its own line at the end:

schedule_update: {"patient_name": "...", "status": "scheduled|confirmed|cancelled|rescheduled", "original_appointment": "YYYY-MM-DDTHH:MM:SS or null", "new_appointment": "YYYY-MM-DDTHH:MM:SS or null", "notes": "...", "reason": "..."}

Use original_appointment for the appointment being changed and new_appointment for the newly agreed time. Omit the block entirely when nothing changed."#;

/// How many prior messages accompany each LLM call.
const HISTORY_WINDOW: usize = 10;

/// Ask the LLM for a reply to the latest patient message. Returns the text
/// to show the patient and any scheduling change the model committed to.
pub async fn generate_reply(
    llm: &dyn LlmProvider,
    history: &[ConversationMessage],
    message: &str,
    patient_context: Option<&serde_json::Value>,
) -> anyhow::Result<(String, Option<ScheduleUpdate>)> {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut messages: Vec<Message> = history[start..]
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .map(|m| Message {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();

    let mut current = message.to_string();
    if let Some(context) = patient_context {
        current.push_str("\n\nCurrent Patient Context:\n");
        current.push_str(&serde_json::to_string_pretty(context).unwrap_or_default());
    }
    messages.push(Message {
        role: "user".to_string(),
        content: current,
    });

    let response = llm.chat(SYSTEM_PROMPT, &messages).await?;

    let update = extract_schedule_update(&response);
    let reply = clean_response_text(&response);
    Ok((reply, update))
}

#[derive(Debug, Deserialize)]
struct ScheduleUpdateWire {
    #[serde(default)]
    patient_name: Option<String>,
    status: String,
    #[serde(default)]
    original_appointment: Option<String>,
    #[serde(default)]
    new_appointment: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl ScheduleUpdateWire {
    fn into_update(self) -> Option<ScheduleUpdate> {
        let status = AppointmentStatus::parse(&self.status)?;
        let original_appointment = match self.original_appointment {
            Some(raw) => Some(parse_wire_datetime(&raw)?),
            None => None,
        };
        let new_appointment = match self.new_appointment {
            Some(raw) => Some(parse_wire_datetime(&raw)?),
            None => None,
        };
        Some(ScheduleUpdate {
            patient_name: self.patient_name,
            status,
            original_appointment,
            new_appointment,
            notes: self.notes,
            reason: self.reason,
        })
    }
}

/// Pull the `schedule_update: {...}` block out of an LLM reply. A block
/// with an unknown status or a datetime that will not parse is dropped
/// whole rather than half-applied.
pub fn extract_schedule_update(response: &str) -> Option<ScheduleUpdate> {
    let block = Regex::new(r"(?s)schedule_update:\s*(\{.*?\})").unwrap();
    let caps = block.captures(response)?;

    let wire: ScheduleUpdateWire = match serde_json::from_str(&caps[1]) {
        Ok(wire) => wire,
        Err(err) => {
            tracing::warn!(error = %err, "failed to parse schedule_update block");
            return None;
        }
    };

    match wire.into_update() {
        Some(update) => Some(update),
        None => {
            tracing::warn!("schedule_update block had an unknown status or datetime, dropping it");
            None
        }
    }
}

/// Strip the machine-readable block so the patient only sees prose.
pub fn clean_response_text(response: &str) -> String {
    let block = Regex::new(r"(?s)schedule_update:\s*\{.*?\}").unwrap();
    block.replace_all(response, "").trim().to_string()
}

// The model is not strict about ISO-8601, so accept the close-by shapes too.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_wire_datetime(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_extract_schedule_update() {
        let response = "You're all set!\n\nschedule_update: {\"patient_name\": \"Alice Johnson\", \"status\": \"confirmed\", \"original_appointment\": \"2025-06-16T10:00:00\", \"notes\": \"Confirmed by patient\"}";
        let update = extract_schedule_update(response).unwrap();
        assert_eq!(update.status, AppointmentStatus::Confirmed);
        assert_eq!(update.original_appointment, Some(dt(2025, 6, 16, 10, 0)));
        assert!(update.new_appointment.is_none());
        assert_eq!(update.patient_name.as_deref(), Some("Alice Johnson"));
    }

    #[test]
    fn test_extract_accepts_space_separated_datetime() {
        let response = "Done.\n\nschedule_update: {\"status\": \"rescheduled\", \"original_appointment\": \"2025-06-16 10:00\", \"new_appointment\": \"2025-06-17 14:00\"}";
        let update = extract_schedule_update(response).unwrap();
        assert_eq!(update.status, AppointmentStatus::Rescheduled);
        assert_eq!(update.original_appointment, Some(dt(2025, 6, 16, 10, 0)));
        assert_eq!(update.new_appointment, Some(dt(2025, 6, 17, 14, 0)));
    }

    #[test]
    fn test_unknown_status_drops_update() {
        let response =
            "schedule_update: {\"status\": \"postponed\", \"new_appointment\": \"2025-06-17T14:00:00\"}";
        assert!(extract_schedule_update(response).is_none());
    }

    #[test]
    fn test_missing_status_drops_update() {
        let response = "schedule_update: {\"new_appointment\": \"2025-06-17T14:00:00\"}";
        assert!(extract_schedule_update(response).is_none());
    }

    #[test]
    fn test_garbled_datetime_drops_update() {
        let response =
            "schedule_update: {\"status\": \"scheduled\", \"new_appointment\": \"next Tuesday\"}";
        assert!(extract_schedule_update(response).is_none());
    }

    #[test]
    fn test_clean_response_removes_block() {
        let response = "See you Monday!\n\nschedule_update: {\"status\": \"confirmed\"}";
        assert_eq!(clean_response_text(response), "See you Monday!");
    }

    #[test]
    fn test_plain_response_untouched() {
        assert_eq!(clean_response_text("We open at 8am."), "We open at 8am.");
        assert!(extract_schedule_update("We open at 8am.").is_none());
    }
}
