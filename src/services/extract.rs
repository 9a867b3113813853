use regex::Regex;

use crate::models::{Intent, PatientDetails};

/// Keyword classification of a patient message. First match wins, so
/// "cancel my appointment" is a cancellation, not a booking.
pub fn classify_intent(message: &str) -> Intent {
    let lower = message.to_lowercase();
    if lower.contains("confirm") {
        Intent::Confirm
    } else if lower.contains("cancel") {
        Intent::Cancel
    } else if lower.contains("reschedule")
        || lower.contains("change")
        || lower.contains("different time")
    {
        Intent::Reschedule
    } else if lower.contains("book") || lower.contains("schedule") || lower.contains("appointment")
    {
        Intent::Book
    } else {
        Intent::GeneralQuestion
    }
}

/// Best-effort extraction of registration details from a free-text message.
/// Labeled forms ("my name is …", "phone: …") are tried first, then a
/// comma-separated fallback for messages like
/// "Carol Wu, 555 010 2222, carol@example.com, 1985-12-01".
pub fn extract_patient_details(text: &str) -> PatientDetails {
    let mut details = PatientDetails::default();

    let labeled_name =
        Regex::new(r"(?i)(?:my name is|name\s*:)\s*([A-Za-z][A-Za-z'.-]*(?:\s+[A-Za-z][A-Za-z'.-]*)?)")
            .unwrap();
    if let Some(caps) = labeled_name.captures(text) {
        details.name = Some(caps[1].trim().to_string());
    } else {
        // Self-introductions only count when the words look like a proper
        // name, so "I'm looking for an appointment" never becomes one.
        let introduction =
            Regex::new(r"(?i:i am|i'm|this is)\s+([A-Z][A-Za-z'.-]*(?:\s+[A-Z][A-Za-z'.-]*){0,2})")
                .unwrap();
        if let Some(caps) = introduction.captures(text) {
            details.name = Some(caps[1].trim().to_string());
        }
    }

    let labeled_phone =
        Regex::new(r"(?i)(?:phone|mobile|cell)(?:\s+number)?\s*(?:is|:)?\s*([0-9()+\-. ]{6,})")
            .unwrap();
    if let Some(caps) = labeled_phone.captures(text) {
        let digits = digits_only(&caps[1]);
        if !digits.is_empty() {
            details.phone = Some(digits);
        }
    } else if let Some(m) = Regex::new(r"\d{7,}").unwrap().find(text) {
        details.phone = Some(m.as_str().to_string());
    }

    if let Some(m) = Regex::new(r"[A-Za-z0-9_.+-]+@[A-Za-z0-9_.-]+").unwrap().find(text) {
        details.email = Some(m.as_str().to_string());
    }

    if let Some(m) = Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap().find(text) {
        details.date_of_birth = Some(m.as_str().to_string());
    }

    let insurance = Regex::new(r"(?i)insurance(?:\s+info(?:rmation)?)?\s*(?:is|:)?\s*([^\n,.]+)")
        .unwrap();
    if let Some(caps) = insurance.captures(text) {
        let value = caps[1].trim();
        if !value.is_empty() {
            details.insurance_info = Some(value.to_string());
        }
    }

    if details.name.is_none()
        || details.phone.is_none()
        || details.email.is_none()
        || details.date_of_birth.is_none()
    {
        fill_from_tokens(&mut details, text);
    }

    details
}

/// Fallback for bare comma- or line-separated details. Each token is claimed
/// by the first field it plausibly belongs to; the first unclaimed token
/// becomes the name.
fn fill_from_tokens(details: &mut PatientDetails, text: &str) {
    let tokens: Vec<&str> = Regex::new(r"[,;\n]+")
        .unwrap()
        .split(text)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() < 2 {
        return;
    }

    let email = Regex::new(r"[A-Za-z0-9_.+-]+@[A-Za-z0-9_.-]+").unwrap();
    let date = Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap();

    let mut unclaimed = Vec::new();
    for token in tokens {
        if details.email.is_none() && email.is_match(token) {
            details.email = Some(token.to_string());
            continue;
        }
        if details.date_of_birth.is_none() && date.is_match(token) {
            details.date_of_birth = Some(token.to_string());
            continue;
        }
        if details.phone.is_none() {
            let digits = digits_only(token);
            if digits.len() >= 7 {
                details.phone = Some(digits);
                continue;
            }
        }
        unclaimed.push(token);
    }

    if details.name.is_none() {
        if let Some(first) = unclaimed.first() {
            details.name = Some((*first).to_string());
        }
    }
}

fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}
