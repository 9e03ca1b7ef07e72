use serde_json::{json, Map, Value};
use stylist_contracts::closet::{ImageAsset, ImageUpload};
use stylist_contracts::errors::StylistError;
use stylist_contracts::events::{EventPayload, EventWriter};
use stylist_contracts::models::{ModelId, ModelRegistry, ModelSpec};
use stylist_contracts::transcript::{ChatMessage, ChatRole};
use uuid::Uuid;

use crate::images::validate_upload;
use crate::providers::{request_summary, GenerationClient, GenerationRequest};

pub const STYLIST_SYSTEM_INSTRUCTION: &str = "You are an AI Fashion Stylist with Agentic Vision. \
Identify specific clothing items, colors, and textures from the images. \
Create a complete outfit recommendation based ONLY on these items. \
If an outfit is missing a key piece (like shoes), suggest a specific style to match.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No photos yet; chat is locked.
    Empty,
    Idle,
    AwaitingReply,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    images: Vec<ImageAsset>,
    transcript: Vec<ChatMessage>,
    model: ModelId,
    awaiting_reply: bool,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        if self.awaiting_reply {
            SessionPhase::AwaitingReply
        } else if self.images.is_empty() {
            SessionPhase::Empty
        } else {
            SessionPhase::Idle
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddImagesReport {
    /// Names of the photos appended, in upload order.
    pub added: Vec<String>,
    /// One `InvalidImage` per rejected photo.
    pub rejected: Vec<StylistError>,
    pub closet_size: usize,
}

impl AddImagesReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Replied(ChatMessage),
    Failed { error: StylistError, message: String },
}

/// Owns one session's closet and transcript and assembles every model
/// request. Sessions share nothing; build one controller per conversation.
pub struct SessionController {
    session_id: String,
    state: SessionState,
    registry: ModelRegistry,
    system_instruction: String,
    events: Option<EventWriter>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(ModelId::default())
    }
}

impl SessionController {
    pub fn new(model: ModelId) -> Self {
        Self {
            session_id: format!("session-{}", Uuid::new_v4().simple()),
            state: SessionState {
                model,
                ..SessionState::default()
            },
            registry: ModelRegistry::default(),
            system_instruction: STYLIST_SYSTEM_INSTRUCTION.to_string(),
            events: None,
        }
    }

    /// Starts logging to `events` under this session's id.
    pub fn with_events(mut self, events: &EventWriter) -> Self {
        self.events = Some(events.for_session(self.session_id.clone()));
        self.emit(
            "session_started",
            json_object(json!({
                "model": self.state.model.as_str(),
            })),
        );
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn images(&self) -> &[ImageAsset] {
        &self.state.images
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.state.transcript
    }

    pub fn model(&self) -> ModelId {
        self.state.model
    }

    pub fn model_spec(&self) -> Option<&ModelSpec> {
        self.registry.get(self.state.model)
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Validates each upload on its own; good photos are kept even when others
    /// in the same batch are rejected.
    pub fn add_images(&mut self, uploads: impl IntoIterator<Item = ImageUpload>) -> AddImagesReport {
        let mut report = AddImagesReport::default();
        for upload in uploads {
            match validate_upload(upload) {
                Ok(asset) => {
                    report.added.push(asset.name().to_string());
                    self.state.images.push(asset);
                }
                Err(err) => {
                    if let StylistError::InvalidImage { name, reason } = &err {
                        self.emit(
                            "image_rejected",
                            json_object(json!({ "name": name, "reason": reason })),
                        );
                    }
                    report.rejected.push(err);
                }
            }
        }
        report.closet_size = self.state.images.len();
        if !report.added.is_empty() {
            self.emit(
                "images_added",
                json_object(json!({
                    "names": report.added,
                    "closet_size": report.closet_size,
                })),
            );
        }
        report
    }

    /// Empties the closet. Refused while a reply is outstanding.
    pub fn clear_closet(&mut self) -> Result<usize, StylistError> {
        if self.state.awaiting_reply {
            return Err(StylistError::ReplyPending);
        }
        let removed = self.state.images.len();
        self.state.images.clear();
        self.emit("closet_cleared", json_object(json!({ "removed": removed })));
        Ok(removed)
    }

    pub fn select_model(&mut self, name: &str) -> Result<ModelId, StylistError> {
        let model = self.registry.lookup(name)?.id;
        let previous = self.state.model;
        self.state.model = model;
        self.emit(
            "model_selected",
            json_object(json!({
                "model": model.as_str(),
                "previous": previous.as_str(),
            })),
        );
        Ok(model)
    }

    /// Records the user's turn and assembles the request for it.
    ///
    /// Only the latest text is sent, together with the whole closet; earlier
    /// turns stay in the transcript but never reach the model.
    pub fn submit_user_message(&mut self, text: &str) -> Result<GenerationRequest, StylistError> {
        if self.state.awaiting_reply {
            return Err(StylistError::ReplyPending);
        }
        if self.state.images.is_empty() {
            return Err(StylistError::EmptyCloset);
        }
        if text.trim().is_empty() {
            return Err(StylistError::EmptyPrompt);
        }

        let transport_model = self
            .model_spec()
            .map(|spec| spec.transport_name.clone())
            .unwrap_or_else(|| self.state.model.as_str().to_string());

        self.state.transcript.push(ChatMessage::user(text));
        self.state.awaiting_reply = true;
        self.emit(
            "user_message",
            json_object(json!({
                "content": text,
                "turn": self.state.transcript.len(),
            })),
        );

        Ok(GenerationRequest {
            model: self.state.model,
            transport_model,
            system_instruction: self.system_instruction.clone(),
            images: self.state.images.clone(),
            user_text: text.to_string(),
        })
    }

    pub fn record_assistant_reply(
        &mut self,
        text: impl Into<String>,
    ) -> Result<&ChatMessage, StylistError> {
        if !self.state.awaiting_reply {
            return Err(StylistError::NoPendingRequest);
        }
        let message = ChatMessage::assistant(text);
        self.state.awaiting_reply = false;
        self.emit(
            "assistant_reply",
            json_object(json!({
                "content": message.content,
                "turn": self.state.transcript.len() + 1,
            })),
        );
        self.state.transcript.push(message);
        self.state
            .transcript
            .last()
            .ok_or(StylistError::NoPendingRequest)
    }

    /// Closes a failed turn. The user's message stays; nothing is appended.
    /// Returns the text to show the user.
    pub fn record_failure(&mut self, error: &StylistError) -> String {
        self.state.awaiting_reply = false;
        let message = format!("API Error: {error}");
        self.emit(
            "generation_failed",
            json_object(json!({ "error": error.to_string() })),
        );
        message
    }

    /// One full turn: submit, call `client`, record the outcome.
    ///
    /// Validation failures come back as `Err` and leave the session untouched.
    /// Generation failures come back as `TurnOutcome::Failed`.
    pub fn converse(
        &mut self,
        client: &dyn GenerationClient,
        text: &str,
    ) -> Result<TurnOutcome, StylistError> {
        let request = self.submit_user_message(text)?;
        let mut started = request_summary(&request);
        started.insert("client".to_string(), json!(client.name()));
        self.emit("generation_started", started);

        match client.generate(&request) {
            Ok(response) => {
                self.emit(
                    "generation_finished",
                    json_object(json!({
                        "client": client.name(),
                        "model": response.model,
                        "input_tokens": response.input_tokens,
                        "output_tokens": response.output_tokens,
                    })),
                );
                let reply = self.record_assistant_reply(response.text)?.clone();
                Ok(TurnOutcome::Replied(reply))
            }
            Err(error) => {
                let message = self.record_failure(&error);
                Ok(TurnOutcome::Failed { error, message })
            }
        }
    }

    /// Last `(user, assistant)` pair, if the transcript ends with one.
    pub fn last_exchange(&self) -> Option<(&ChatMessage, &ChatMessage)> {
        match self.state.transcript.as_slice() {
            [.., user, reply] if user.role == ChatRole::User && reply.role == ChatRole::Assistant => {
                Some((user, reply))
            }
            _ => None,
        }
    }

    fn emit(&self, event_type: &str, payload: EventPayload) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit(event_type, payload) {
            eprintln!("stylist: failed to log {event_type} event: {err:#}");
        }
    }
}

fn json_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
