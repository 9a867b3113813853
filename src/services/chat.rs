use chrono::{Local, NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    Appointment, AppointmentStatus, AppointmentType, ChatRequest, ChatResponse, Intent, Patient,
    PatientDetails, PatientLookup, PatientRegistrationRequest, ScheduleUpdate, TimeSlot,
};
use crate::services::ai::scheduling;
use crate::services::{booking, extract, patients};
use crate::state::AppState;
use crate::store::{SnapshotStore, StoreError};

/// Drive one turn of the scheduling conversation: identify the caller,
/// produce a reply through the LLM or the canned fallback, persist any
/// scheduling change the reply committed to, and log the exchange.
pub async fn process_message(
    state: &AppState,
    mut request: ChatRequest,
) -> Result<ChatResponse, AppError> {
    let conversation_id = match request.conversation_id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("conv_{}", Uuid::new_v4()),
    };

    let awaiting_registration = {
        let mut conversations = state.conversations.lock().unwrap();
        conversations
            .get_or_create(&conversation_id)
            .awaiting_registration
    };
    if awaiting_registration {
        if let Some(response) =
            try_complete_registration(state, &conversation_id, &request.message)?
        {
            return Ok(response);
        }
    }

    let bound_patient = {
        let conversations = state.conversations.lock().unwrap();
        conversations
            .get(&conversation_id)
            .and_then(|c| c.patient_id.clone())
    };
    if bound_patient.is_none() {
        // Let a one-line self-introduction stand in for the identity fields
        // the frontend did not send.
        let details = extract::extract_patient_details(&request.message);
        if request.patient_name.is_none() {
            request.patient_name = details.name.clone();
        }
        if request.patient_phone.is_none() {
            request.patient_phone = details.phone.clone();
        }
        if request.patient_email.is_none() {
            request.patient_email = details.email.clone();
        }

        // A single message with the complete details registers the caller
        // immediately, without entering registration mode.
        let complete = details.name.is_some()
            && details.phone.is_some()
            && details.email.is_some()
            && details.date_of_birth.is_some();
        if complete {
            let (is_valid, errors) = patients::validate_patient_data(&details);
            if !is_valid {
                return reply_and_record(
                    state,
                    &conversation_id,
                    &request.message,
                    registration_problems_reply(&errors),
                    None,
                );
            }
            let lookup = {
                let store = state.store.lock().unwrap();
                patients::find_by_identifiers(
                    &store,
                    details.name.as_deref(),
                    details.phone.as_deref(),
                    details.email.as_deref(),
                    None,
                )
            };
            if matches!(lookup, PatientLookup::NewPatient { .. }) {
                return register_new_patient(state, &conversation_id, &request.message, &details);
            }
        }
    }

    let (patient, special_action) = identify_patient(state, &conversation_id, &request);
    if let Some(action) = special_action {
        return special_action_response(state, &conversation_id, &request.message, action);
    }

    if let Some(patient) = &patient {
        let mut conversations = state.conversations.lock().unwrap();
        let conversation = conversations.get_or_create(&conversation_id);
        conversation.patient_id = Some(patient.id.clone());
        conversation.patient_name = Some(patient.name.clone());
    }

    let history = {
        let conversations = state.conversations.lock().unwrap();
        conversations
            .get(&conversation_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    };
    let context = {
        let store = state.store.lock().unwrap();
        patient.as_ref().map(|p| patient_context(&store, p))
    };

    let (reply, schedule_update) = match &state.llm {
        Some(llm) => {
            match scheduling::generate_reply(
                llm.as_ref(),
                &history,
                &request.message,
                context.as_ref(),
            )
            .await
            {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(error = %err, "LLM call failed");
                    (
                        "I'm having trouble connecting to our scheduling system right now. Please try again later."
                            .to_string(),
                        None,
                    )
                }
            }
        }
        None => {
            let store = state.store.lock().unwrap();
            respond_without_llm(&store, patient.as_ref(), &request.message)
        }
    };

    if let Some(update) = &schedule_update {
        let mut store = state.store.lock().unwrap();
        if let Err(err) = apply_schedule_update(&mut store, patient.as_ref(), update) {
            tracing::error!(error = %err, "failed to persist schedule update");
        }
    }

    reply_and_record(
        state,
        &conversation_id,
        &request.message,
        reply,
        schedule_update,
    )
}

/// While a conversation waits for new-patient details, each message is first
/// treated as a registration attempt. Returns `None` when the message holds
/// no identifiable fields, which drops the conversation back to normal flow.
fn try_complete_registration(
    state: &AppState,
    conversation_id: &str,
    message: &str,
) -> Result<Option<ChatResponse>, AppError> {
    let details = extract::extract_patient_details(message);

    let has_any = details.name.is_some()
        || details.phone.is_some()
        || details.email.is_some()
        || details.date_of_birth.is_some();
    if !has_any {
        let mut conversations = state.conversations.lock().unwrap();
        conversations
            .get_or_create(conversation_id)
            .awaiting_registration = false;
        conversations.save()?;
        return Ok(None);
    }

    let (is_valid, errors) = patients::validate_patient_data(&details);
    if !is_valid {
        return reply_and_record(
            state,
            conversation_id,
            message,
            registration_problems_reply(&errors),
            None,
        )
        .map(Some);
    }

    register_new_patient(state, conversation_id, message, &details).map(Some)
}

fn register_new_patient(
    state: &AppState,
    conversation_id: &str,
    message: &str,
    details: &PatientDetails,
) -> Result<ChatResponse, AppError> {
    let (name, phone, email, dob_raw) = match (
        details.name.as_deref(),
        details.phone.as_deref(),
        details.email.as_deref(),
        details.date_of_birth.as_deref(),
    ) {
        (Some(name), Some(phone), Some(email), Some(dob)) => (name, phone, email, dob),
        _ => {
            let (_, errors) = patients::validate_patient_data(details);
            return reply_and_record(
                state,
                conversation_id,
                message,
                registration_problems_reply(&errors),
                None,
            );
        }
    };

    let date_of_birth = match NaiveDate::parse_from_str(dob_raw, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            return reply_and_record(
                state,
                conversation_id,
                message,
                "That date of birth doesn't look right. Please use YYYY-MM-DD, for example 1985-12-01."
                    .to_string(),
                None,
            )
        }
    };

    let created = {
        let mut store = state.store.lock().unwrap();
        patients::create_patient(
            &mut store,
            name,
            phone,
            email,
            date_of_birth,
            details.insurance_info.as_deref(),
            None,
        )
    };
    let patient = match created {
        Ok(patient) => patient,
        Err(err) => {
            tracing::error!(error = %err, "failed to create patient from chat");
            return reply_and_record(
                state,
                conversation_id,
                message,
                "Something went wrong while creating your patient record. Please try again later or contact the clinic front desk."
                    .to_string(),
                None,
            );
        }
    };

    {
        let mut conversations = state.conversations.lock().unwrap();
        let conversation = conversations.get_or_create(conversation_id);
        conversation.patient_id = Some(patient.id.clone());
        conversation.patient_name = Some(patient.name.clone());
        conversation.awaiting_registration = false;
    }

    let reply = format!(
        "All set, {}! I've registered you in our system.\nWhat kind of dental appointment would you like to book?",
        patient.name
    );
    reply_and_record(state, conversation_id, message, reply, None)
}

fn registration_problems_reply(errors: &[String]) -> String {
    let mut reply =
        String::from("Thanks! I received some of your information, but there are a few problems:\n");
    for error in errors {
        reply.push_str("- ");
        reply.push_str(error);
        reply.push('\n');
    }
    reply.push_str(
        "\nPlease send it again, for example:\nname, phone, email, date of birth (YYYY-MM-DD), and your insurance info if you have it.",
    );
    reply
}

enum SpecialAction {
    NewPatientRegistration,
    MultipleMatches(Vec<Patient>),
    ValidationError(Vec<String>),
    RegistrationError(String),
}

/// Resolve who is talking. A patient already bound to the conversation wins;
/// an explicit registration payload creates one; otherwise the identifiers
/// on the request go through the fuzzy matcher.
fn identify_patient(
    state: &AppState,
    conversation_id: &str,
    request: &ChatRequest,
) -> (Option<Patient>, Option<SpecialAction>) {
    let bound = {
        let conversations = state.conversations.lock().unwrap();
        conversations
            .get(conversation_id)
            .and_then(|c| c.patient_id.clone())
    };
    if let Some(id) = bound {
        let store = state.store.lock().unwrap();
        if let Some(patient) = store.patient(&id) {
            return (Some(patient.clone()), None);
        }
    }

    if request.is_new_patient_registration {
        if let Some(data) = &request.patient_registration_data {
            return register_explicit(state, data);
        }
    }

    let lookup = {
        let store = state.store.lock().unwrap();
        patients::find_by_identifiers(
            &store,
            request.patient_name.as_deref(),
            request.patient_phone.as_deref(),
            request.patient_email.as_deref(),
            request.patient_id.as_deref(),
        )
    };

    let has_any_identifier = [
        request.patient_name.as_deref(),
        request.patient_phone.as_deref(),
        request.patient_email.as_deref(),
        request.patient_id.as_deref(),
    ]
    .iter()
    .any(|value| value.map_or(false, |s| !s.is_empty()));

    match lookup {
        PatientLookup::Match(patient) => (Some(patient), None),
        PatientLookup::NewPatient { .. } if has_any_identifier => {
            (None, Some(SpecialAction::NewPatientRegistration))
        }
        PatientLookup::Ambiguous { candidates } => {
            (None, Some(SpecialAction::MultipleMatches(candidates)))
        }
        PatientLookup::NewPatient { .. } => (None, None),
    }
}

fn register_explicit(
    state: &AppState,
    data: &PatientRegistrationRequest,
) -> (Option<Patient>, Option<SpecialAction>) {
    let details = PatientDetails {
        name: Some(data.name.clone()),
        phone: Some(data.phone.clone()),
        email: Some(data.email.clone()),
        date_of_birth: Some(data.date_of_birth.clone()),
        insurance_info: data.insurance_info.clone(),
    };
    let (is_valid, errors) = patients::validate_patient_data(&details);
    if !is_valid {
        return (None, Some(SpecialAction::ValidationError(errors)));
    }

    let date_of_birth = match NaiveDate::parse_from_str(&data.date_of_birth, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            return (
                None,
                Some(SpecialAction::RegistrationError(
                    "date of birth must be YYYY-MM-DD".to_string(),
                )),
            )
        }
    };

    let created = {
        let mut store = state.store.lock().unwrap();
        patients::create_patient(
            &mut store,
            &data.name,
            &data.phone,
            &data.email,
            date_of_birth,
            data.insurance_info.as_deref(),
            data.notes.as_deref(),
        )
    };
    match created {
        Ok(patient) => (Some(patient), None),
        Err(err) => (None, Some(SpecialAction::RegistrationError(err.to_string()))),
    }
}

fn special_action_response(
    state: &AppState,
    conversation_id: &str,
    message: &str,
    action: SpecialAction,
) -> Result<ChatResponse, AppError> {
    let reply = match action {
        SpecialAction::NewPatientRegistration => {
            {
                let mut conversations = state.conversations.lock().unwrap();
                conversations
                    .get_or_create(conversation_id)
                    .awaiting_registration = true;
            }
            "Welcome! I don't see your information in our system. To get you set up as a new patient, I'll need some information from you. Could you please provide:\n1. Your full name\n2. Your phone number\n3. Your email address\n4. Your date of birth (YYYY-MM-DD)\n5. Your insurance information (if applicable)"
                .to_string()
        }
        SpecialAction::MultipleMatches(candidates) => {
            let patient_list = candidates
                .iter()
                .map(|p| format!("- {} (Phone: {}, Email: {})", p.name, p.phone, p.email))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "I found multiple patients with similar information. Could you help me identify you?\n{patient_list}\n\nCould you please provide your patient ID or additional information to help me find the correct record?"
            )
        }
        SpecialAction::ValidationError(errors) => format!(
            "There are some issues with the information provided: {}. Please correct these and try again.",
            errors.join(", ")
        ),
        SpecialAction::RegistrationError(reason) => format!(
            "I encountered an error while creating your patient record: {reason}. Please try again or contact the clinic."
        ),
    };
    reply_and_record(state, conversation_id, message, reply, None)
}

/// The context block injected into the LLM call for an identified patient.
fn patient_context(store: &SnapshotStore, patient: &Patient) -> serde_json::Value {
    let upcoming = patients::upcoming_appointments(store, patient);
    json!({
        "patient_id": patient.id,
        "patient_name": patient.name,
        "phone": patient.phone,
        "email": patient.email,
        "date_of_birth": patient.date_of_birth.to_string(),
        "insurance_info": patient.insurance_info,
        "notes": patient.notes,
        "upcoming_appointments": upcoming
            .iter()
            .take(3)
            .map(|appt| json!({
                "id": appt.id,
                "datetime": appt.datetime.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "type": appt.appointment_type.as_str(),
                "status": appt.status.as_str(),
                "duration": appt.duration,
                "dentist": appt.dentist,
                "notes": appt.notes,
            }))
            .collect::<Vec<_>>(),
    })
}

/// Deterministic replies for when no LLM is configured. Keyword intents map
/// to the patient's next upcoming appointment.
fn respond_without_llm(
    store: &SnapshotStore,
    patient: Option<&Patient>,
    message: &str,
) -> (String, Option<ScheduleUpdate>) {
    let patient = match patient {
        Some(patient) => patient,
        None => {
            return (
                "I couldn't find your patient record. Could you please provide your full name or patient ID?"
                    .to_string(),
                None,
            )
        }
    };

    let upcoming = patients::upcoming_appointments(store, patient);

    match extract::classify_intent(message) {
        Intent::Confirm => match upcoming.first() {
            Some(appointment) => (
                format!(
                    "Perfect! I've confirmed your appointment on {}. We look forward to seeing you!",
                    appointment.datetime.format("%B %d at %I:%M %p")
                ),
                Some(ScheduleUpdate {
                    patient_name: Some(patient.name.clone()),
                    status: AppointmentStatus::Confirmed,
                    original_appointment: Some(appointment.datetime),
                    new_appointment: None,
                    notes: Some("Appointment confirmed by patient".to_string()),
                    reason: None,
                }),
            ),
            None => (
                "I don't see any upcoming appointments for you. Would you like to schedule one?"
                    .to_string(),
                None,
            ),
        },
        Intent::Cancel => match upcoming.first() {
            Some(appointment) => (
                format!(
                    "I've cancelled your appointment on {}. Would you like to reschedule for a different time?",
                    appointment.datetime.format("%B %d at %I:%M %p")
                ),
                Some(ScheduleUpdate {
                    patient_name: Some(patient.name.clone()),
                    status: AppointmentStatus::Cancelled,
                    original_appointment: Some(appointment.datetime),
                    new_appointment: None,
                    notes: Some("Appointment cancelled by patient".to_string()),
                    reason: None,
                }),
            ),
            None => (
                "I don't see any upcoming appointments that can be cancelled.".to_string(),
                None,
            ),
        },
        Intent::Reschedule => match upcoming.first() {
            Some(appointment) => {
                let suggestions = booking::suggest(
                    store,
                    &patient.id,
                    None,
                    appointment.appointment_type,
                    appointment.dentist.as_deref(),
                )
                .unwrap_or_default();
                match first_opening(&suggestions) {
                    Some((date, start)) => (
                        format!(
                            "I understand you need to reschedule. I have an opening on {} at {}. Would that work for you?",
                            date.format("%B %d"),
                            start.format("%I:%M %p")
                        ),
                        None,
                    ),
                    None => (
                        "I'd be happy to help you reschedule. Let me check what's available and get back to you with some options."
                            .to_string(),
                        None,
                    ),
                }
            }
            None => (
                "I don't see any upcoming appointments to reschedule.".to_string(),
                None,
            ),
        },
        Intent::Book => {
            let suggestions = booking::suggest(
                store,
                &patient.id,
                None,
                AppointmentType::RegularCheckup,
                None,
            )
            .unwrap_or_default();
            match first_opening(&suggestions) {
                Some((date, start)) => (
                    format!(
                        "I'd be happy to get you booked in. The next opening is on {} at {}. Would that time work for you?",
                        date.format("%B %d"),
                        start.format("%I:%M %p")
                    ),
                    None,
                ),
                None => (
                    "I'd be happy to get you booked in. Let me check what's available and get back to you with some options."
                        .to_string(),
                    None,
                ),
            }
        }
        Intent::GeneralQuestion => match upcoming.first() {
            Some(appointment) => (
                format!(
                    "Your next appointment is scheduled for {} for a {}. Would you like to confirm or make any changes?",
                    appointment.datetime.format("%B %d at %I:%M %p"),
                    appointment.appointment_type.as_str().replace('_', " ")
                ),
                None,
            ),
            None => (
                "I don't see any upcoming appointments for you. Would you like to schedule a new appointment?"
                    .to_string(),
                None,
            ),
        },
    }
}

fn first_opening(suggestions: &[(NaiveDate, Vec<TimeSlot>)]) -> Option<(NaiveDate, NaiveTime)> {
    suggestions
        .first()
        .and_then(|(date, slots)| slots.first().map(|slot| (*date, slot.start_time)))
}

/// Write a schedule update through to the appointment snapshot. An update
/// matching an existing appointment by patient and original time mutates it;
/// otherwise a new appointment is created when a new time is present.
fn apply_schedule_update(
    store: &mut SnapshotStore,
    patient: Option<&Patient>,
    update: &ScheduleUpdate,
) -> Result<(), StoreError> {
    store.reload()?;

    let patient_id = patient.map(|p| p.id.clone());
    let patient_name = patient
        .map(|p| p.name.clone())
        .or_else(|| update.patient_name.clone());

    let matches_patient = |appt: &Appointment| {
        if let Some(id) = &patient_id {
            if appt.patient_id == *id {
                return true;
            }
        }
        if let Some(name) = &patient_name {
            if appt.patient_name == *name {
                return true;
            }
        }
        false
    };

    if let Some(original) = update.original_appointment {
        let target_id = store
            .appointments()
            .find(|appt| matches_patient(appt) && appt.datetime == original)
            .map(|appt| appt.id.clone());
        if let Some(id) = target_id {
            if let Some(appointment) = store.appointment_mut(&id) {
                appointment.status = update.status.clone();
                if let Some(new_dt) = update.new_appointment {
                    appointment.datetime = new_dt;
                }
                if let Some(notes) = &update.notes {
                    appointment.notes = Some(notes.clone());
                }
            }
            store.persist_appointments()?;
            tracing::info!(appointment_id = %id, "applied schedule update to existing appointment");
            return Ok(());
        }
    }

    let new_dt = match update.new_appointment {
        Some(dt) => dt,
        None => {
            tracing::debug!("schedule update matched nothing and has no new time, skipping");
            return Ok(());
        }
    };

    let notes = update.notes.clone().unwrap_or_default();
    let notes_lower = notes.to_lowercase();
    let appointment_type = if notes_lower.contains("consult") {
        AppointmentType::InitialConsultation
    } else if notes_lower.contains("follow") {
        AppointmentType::FollowUp
    } else {
        AppointmentType::RegularCheckup
    };
    let duration = if notes.contains("90") { 90 } else { 60 };

    let appointment = Appointment {
        id: store.next_appointment_id(),
        patient_id: patient_id.unwrap_or_else(|| "UNKNOWN".to_string()),
        patient_name: patient_name.unwrap_or_else(|| "Unknown Patient".to_string()),
        datetime: new_dt,
        duration,
        appointment_type,
        status: update.status.clone(),
        notes: if notes.is_empty() {
            Some("Scheduled via chat assistant".to_string())
        } else {
            Some(notes)
        },
        dentist: Some("Dr. Sarah Chen".to_string()),
    };
    let id = appointment.id.clone();
    store.upsert_appointment(appointment)?;
    tracing::info!(appointment_id = %id, "created appointment from schedule update");
    Ok(())
}

fn reply_and_record(
    state: &AppState,
    conversation_id: &str,
    user_message: &str,
    reply: String,
    schedule_update: Option<ScheduleUpdate>,
) -> Result<ChatResponse, AppError> {
    let mut conversations = state.conversations.lock().unwrap();
    conversations.record_exchange(conversation_id, user_message, &reply)?;
    Ok(ChatResponse {
        message: reply,
        schedule_update,
        conversation_id: conversation_id.to_string(),
        timestamp: Local::now().naive_local(),
    })
}
