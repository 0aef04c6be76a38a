pub mod config;
pub mod controller;
pub mod error;
pub mod origin;
pub mod plans;
pub mod popup;
pub mod prompt;
pub mod protocol;
pub mod rails;
pub mod reconciler;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::BillingConfig;
pub use controller::{
    CompletionCallback, CreateReply, EventStep, MessageOutcome, PaymentSurface,
    PlanSelectionController, PromptServices, ReplyFuture, SelectOutcome, SelectStep,
    SelectionState, UpdateReply, UserNotifier,
};
pub use error::{BillingError, ConfigError, RemoteError, StoreError};
pub use origin::TrustedOrigin;
pub use plans::{FREE_PLAN_ID, Plan, PlanView, UNKNOWN_PLAN_ID, annotate_plans};
pub use popup::{BillingPopup, PopupAction};
pub use prompt::{BillingPrompt, MessageChannel, PromptCommand, PromptEvent, PromptHandle};
pub use protocol::{
    CheckoutDescriptor, InboundMessage, MessageHandler, OutboundMessage, PaymentToken,
    RawInboundEvent,
};
pub use rails::methods::MethodRailsClient;
pub use rails::{BillingFeed, SubscriptionMethods};
pub use reconciler::CacheReconciler;
pub use session::{PromptSession, SessionRegistry};
pub use store::{BillingSnapshot, BillingStore, PaymentMethod, SubscriptionState};
