//! Cross-frame message protocol between a billing prompt and the hosted
//! payment surface.
//!
//! Inbound messages arrive on a process-wide channel, so every message is
//! gated twice before it is decoded: the sender origin must be the trusted
//! payment origin, and the `id` must be the session id of the prompt doing
//! the decoding. Anything that fails either check, or whose payload does not
//! match one of the known shapes, is dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::origin::TrustedOrigin;
use crate::plans::Plan;
use crate::session::{PromptSession, SessionRegistry};

/// A message as delivered by the host page's message event.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInboundEvent {
    pub origin: String,
    pub data: Value,
}

impl RawInboundEvent {
    #[must_use]
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentToken {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The surface wants the host to focus the frame for `plan`.
    ShowPrompt { plan: String },
    Token { token: PaymentToken, plan: String },
    Error { detail: Value },
}

impl InboundMessage {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ShowPrompt { .. } => "show_prompt",
            Self::Token { .. } => "token",
            Self::Error { .. } => "error",
        }
    }

    /// Token and error messages both close the focused checkout view.
    #[must_use]
    pub fn ends_focus(&self) -> bool {
        matches!(self, Self::Token { .. } | Self::Error { .. })
    }
}

/// Every field is kept as raw JSON so one badly typed field cannot hide the
/// others; each is checked where it is classified.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundPayload {
    #[serde(default)]
    show_prompt: Option<Value>,
    #[serde(default)]
    plan: Option<Value>,
    #[serde(default)]
    token: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct MessageHandler {
    trusted_origin: TrustedOrigin,
}

impl MessageHandler {
    #[must_use]
    pub fn new(trusted_origin: TrustedOrigin) -> Self {
        Self { trusted_origin }
    }

    #[must_use]
    pub fn trusted_origin(&self) -> &TrustedOrigin {
        &self.trusted_origin
    }

    /// Decode `event` for `session`, or `None` if it is not for us.
    #[must_use]
    pub fn handle(
        &self,
        event: &RawInboundEvent,
        session: &PromptSession,
    ) -> Option<InboundMessage> {
        if !self.trusted_origin.is_trusted(&event.origin) {
            tracing::debug!(
                origin = %event.origin,
                expected = %self.trusted_origin.as_str(),
                "billing message dropped: untrusted origin"
            );
            return None;
        }

        let message_id = event.data.get("id").and_then(Value::as_u64)?;
        if !SessionRegistry::matches(message_id, session) {
            tracing::trace!(
                message_id,
                session_id = session.id,
                "billing message dropped: addressed to another prompt"
            );
            return None;
        }

        let payload = match serde_json::from_value::<InboundPayload>(event.data.clone()) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    session_id = session.id,
                    "billing message payload malformed"
                );
                return None;
            }
        };
        classify(payload)
    }
}

fn classify(payload: InboundPayload) -> Option<InboundMessage> {
    let plan = payload
        .plan
        .as_ref()
        .and_then(Value::as_str)
        .map(str::to_string);

    if payload.show_prompt.as_ref().and_then(Value::as_bool) == Some(true)
        && let Some(plan) = plan.clone()
    {
        return Some(InboundMessage::ShowPrompt { plan });
    }

    if let Some(raw_token) = payload.token.filter(Value::is_object) {
        let token = serde_json::from_value::<PaymentToken>(raw_token).ok()?;
        let plan = plan?;
        return Some(InboundMessage::Token { token, plan });
    }

    match payload.error {
        Some(detail) if !detail.is_null() => Some(InboundMessage::Error { detail }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundMessage {
    OpenDialog,
}

impl OutboundMessage {
    #[must_use]
    pub fn to_value(self) -> Value {
        match self {
            Self::OpenDialog => json!({ "openDialog": true }),
        }
    }
}

/// Parameters handed to a payment frame when it is rendered. The surface
/// echoes `id` and `planName` back on every message it posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDescriptor {
    pub name: String,
    pub description: String,
    pub amount: u64,
    pub panel_label: String,
    pub id: u64,
    pub plan_name: String,
    pub email: String,
}

impl CheckoutDescriptor {
    /// `None` when the user has no primary email to prefill.
    #[must_use]
    pub fn for_plan(
        session: &PromptSession,
        plan: &Plan,
        primary_email: Option<&str>,
        product_name: &str,
    ) -> Option<Self> {
        let email = primary_email
            .map(str::trim)
            .filter(|value| !value.is_empty())?;
        Some(Self {
            name: product_name.to_string(),
            description: format!("{} Plan", title_case(&plan.id)),
            amount: plan.price,
            panel_label: "{{amount}} / Month".to_string(),
            id: session.id,
            plan_name: plan.id.clone(),
            email: email.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn title_case(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
