use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BillingError, RemoteError};
use crate::plans::{FREE_PLAN_ID, Plan, PlanView, annotate_plans};
use crate::protocol::{
    CheckoutDescriptor, InboundMessage, MessageHandler, OutboundMessage, PaymentToken,
    RawInboundEvent,
};
use crate::rails::{BillingFeed, SubscriptionMethods};
use crate::reconciler::CacheReconciler;
use crate::session::PromptSession;
use crate::store::{BillingStore, PaymentMethod};

/// Delivers messages into the payment frame rendered for a plan.
pub trait PaymentSurface: Send + Sync {
    fn post_to_frame(&self, plan_id: &str, message: OutboundMessage);
}

/// Blocking, user-visible notice for failed plan changes.
pub trait UserNotifier: Send + Sync {
    fn notify_error(&self, error: &BillingError);
}

pub type CompletionCallback = Box<dyn FnMut(bool) + Send>;

/// Collaborators a prompt talks to. Cheap to clone; the store is shared by
/// every prompt built from the same services.
#[derive(Clone)]
pub struct PromptServices {
    pub store: Arc<BillingStore>,
    pub methods: Arc<dyn SubscriptionMethods>,
    pub feed: Arc<dyn BillingFeed>,
    pub surface: Arc<dyn PaymentSurface>,
    pub notifier: Arc<dyn UserNotifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    DirectUpdateInFlight { plan_id: String },
    AwaitingPaymentSurface { plan_id: String },
}

impl SelectionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DirectUpdateInFlight { .. } => "direct_update_in_flight",
            Self::AwaitingPaymentSurface { .. } => "awaiting_payment_surface",
        }
    }

    /// Plan whose card should show a spinner.
    #[must_use]
    pub fn selecting_plan(&self) -> Option<&str> {
        match self {
            Self::DirectUpdateInFlight { plan_id } => Some(plan_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The current plan was clicked; treated as a dismissal.
    Dismissed,
    Updated { plan_id: String },
    AwaitingPaymentSurface { plan_id: String },
    Failed { plan_id: String, error: RemoteError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Not trusted, not addressed to this prompt, or not a known shape.
    Ignored,
    Focused { plan_id: String },
    Subscribed { plan_id: String },
    Failed { plan_id: String, error: RemoteError },
    SurfaceError,
}

/// Where [`PlanSelectionController::begin_select`] left the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectStep {
    Done(SelectOutcome),
    /// A direct `update_user_subscription` call is due.
    Update { plan_id: String },
}

/// Where [`PlanSelectionController::begin_event`] left the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStep {
    Done(MessageOutcome),
    /// The surface issued a token; `create_user_subscription` is due.
    Create { token: PaymentToken, plan_id: String },
}

pub type ReplyFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReply {
    pub plan_id: String,
    pub result: Result<(), RemoteError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReply {
    pub token: PaymentToken,
    pub plan_id: String,
    pub result: Result<Option<PaymentMethod>, RemoteError>,
}

/// Drives one prompt's plan change from click to completion.
///
/// Completion is reported at most once; after it fires the controller
/// refuses new selections and ignores further messages.
pub struct PlanSelectionController {
    session: PromptSession,
    handler: MessageHandler,
    services: PromptServices,
    reconciler: CacheReconciler,
    account_plan: String,
    state: SelectionState,
    focused_frame: Option<String>,
    completion: Option<CompletionCallback>,
}

impl PlanSelectionController {
    #[must_use]
    pub fn new(
        session: PromptSession,
        handler: MessageHandler,
        services: PromptServices,
        recheck_delay: Duration,
        completion: CompletionCallback,
    ) -> Self {
        let reconciler = CacheReconciler::new(
            services.store.clone(),
            services.feed.clone(),
            recheck_delay,
        );
        Self {
            session,
            handler,
            services,
            reconciler,
            account_plan: FREE_PLAN_ID.to_string(),
            state: SelectionState::Idle,
            focused_frame: None,
            completion: Some(completion),
        }
    }

    /// Plan recorded on the user's account; users without one are on the
    /// free plan.
    #[must_use]
    pub fn with_account_plan(mut self, account_plan: Option<&str>) -> Self {
        self.account_plan = account_plan
            .map(str::trim)
            .filter(|plan| !plan.is_empty())
            .unwrap_or(FREE_PLAN_ID)
            .to_string();
        self
    }

    #[must_use]
    pub fn session(&self) -> &PromptSession {
        &self.session
    }

    #[must_use]
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    #[must_use]
    pub fn focused_frame(&self) -> Option<&str> {
        self.focused_frame.as_deref()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completion.is_none()
    }

    #[must_use]
    pub fn reconciler(&self) -> &CacheReconciler {
        &self.reconciler
    }

    pub fn current_plan_id(&self) -> Result<Option<String>, BillingError> {
        Ok(self.services.store.subscription_plan_id()?)
    }

    pub fn plan_views(&self, catalog: &[Plan]) -> Result<Vec<PlanView>, BillingError> {
        let current = self.services.store.subscription_plan_id()?;
        Ok(annotate_plans(catalog, current.as_deref()))
    }

    pub fn payment_method_count(&self) -> Result<usize, BillingError> {
        Ok(self.services.store.payment_method_count()?)
    }

    #[must_use]
    pub fn checkout_descriptor(
        &self,
        plan: &Plan,
        primary_email: Option<&str>,
        product_name: &str,
    ) -> Option<CheckoutDescriptor> {
        CheckoutDescriptor::for_plan(&self.session, plan, primary_email, product_name)
    }

    pub async fn select_plan(&mut self, view: &PlanView) -> Result<SelectOutcome, BillingError> {
        match self.begin_select(view)? {
            SelectStep::Done(outcome) => Ok(outcome),
            SelectStep::Update { plan_id } => {
                let reply = self.dispatch_update(plan_id).await;
                self.finish_update(reply)
            }
        }
    }

    /// First half of [`Self::select_plan`]. When it returns
    /// [`SelectStep::Update`] the controller is already `DirectUpdateInFlight`
    /// and the caller runs [`Self::dispatch_update`] then
    /// [`Self::finish_update`].
    pub fn begin_select(&mut self, view: &PlanView) -> Result<SelectStep, BillingError> {
        if self.is_finished() {
            return Err(BillingError::Finished);
        }
        let plan_id = view.plan.id.clone();

        if view.is_current && self.account_plan == plan_id {
            tracing::debug!(
                session_id = self.session.id,
                plan_id = %plan_id,
                "current plan selected; dismissing"
            );
            self.complete(false);
            return Ok(SelectStep::Done(SelectOutcome::Dismissed));
        }

        if self.services.store.payment_method_count()? > 0 || view.plan.is_free() {
            self.state = SelectionState::DirectUpdateInFlight {
                plan_id: plan_id.clone(),
            };
            return Ok(SelectStep::Update { plan_id });
        }

        tracing::debug!(
            session_id = self.session.id,
            plan_id = %plan_id,
            "no payment method on file; opening payment dialog"
        );
        self.state = SelectionState::AwaitingPaymentSurface {
            plan_id: plan_id.clone(),
        };
        self.services
            .surface
            .post_to_frame(&plan_id, OutboundMessage::OpenDialog);
        Ok(SelectStep::Done(SelectOutcome::AwaitingPaymentSurface {
            plan_id,
        }))
    }

    /// The `update_user_subscription` call, detached from the controller so
    /// it can be raced against other input or dropped to abandon it.
    #[must_use]
    pub fn dispatch_update(&self, plan_id: String) -> ReplyFuture<UpdateReply> {
        let methods = self.services.methods.clone();
        Box::pin(async move {
            let result = methods.update_user_subscription(&plan_id).await;
            UpdateReply { plan_id, result }
        })
    }

    pub fn finish_update(&mut self, reply: UpdateReply) -> Result<SelectOutcome, BillingError> {
        let UpdateReply { plan_id, result } = reply;
        self.state = SelectionState::Idle;

        match result {
            Ok(()) => {
                self.services.store.set_subscription_plan(&plan_id)?;
                self.reconciler.schedule_recheck();
                tracing::debug!(session_id = self.session.id, plan_id = %plan_id, "plan updated");
                self.complete(true);
                Ok(SelectOutcome::Updated { plan_id })
            }
            Err(error) => {
                tracing::warn!(
                    session_id = self.session.id,
                    plan_id = %plan_id,
                    error = %error,
                    "plan update failed"
                );
                self.services
                    .notifier
                    .notify_error(&BillingError::Remote(error.clone()));
                Ok(SelectOutcome::Failed { plan_id, error })
            }
        }
    }

    pub async fn handle_event(
        &mut self,
        event: &RawInboundEvent,
    ) -> Result<MessageOutcome, BillingError> {
        match self.begin_event(event) {
            EventStep::Done(outcome) => Ok(outcome),
            EventStep::Create { token, plan_id } => {
                let reply = self.dispatch_create(token, plan_id).await;
                self.finish_create(reply)
            }
        }
    }

    /// First half of [`Self::handle_event`]. A token message leaves the
    /// controller `AwaitingPaymentSurface` and returns [`EventStep::Create`].
    pub fn begin_event(&mut self, event: &RawInboundEvent) -> EventStep {
        if self.is_finished() {
            return EventStep::Done(MessageOutcome::Ignored);
        }
        let Some(message) = self.handler.handle(event, &self.session) else {
            return EventStep::Done(MessageOutcome::Ignored);
        };
        tracing::debug!(
            session_id = self.session.id,
            kind = message.kind(),
            state = self.state.as_str(),
            "payment surface message"
        );
        if message.ends_focus() {
            self.focused_frame = None;
        }

        match message {
            InboundMessage::ShowPrompt { plan } => {
                self.focused_frame = Some(plan.clone());
                EventStep::Done(MessageOutcome::Focused { plan_id: plan })
            }
            InboundMessage::Token { token, plan } => {
                self.state = SelectionState::AwaitingPaymentSurface {
                    plan_id: plan.clone(),
                };
                EventStep::Create {
                    token,
                    plan_id: plan,
                }
            }
            InboundMessage::Error { detail } => {
                tracing::debug!(
                    session_id = self.session.id,
                    detail = %detail,
                    "payment surface reported an error"
                );
                self.state = SelectionState::Idle;
                EventStep::Done(MessageOutcome::SurfaceError)
            }
        }
    }

    #[must_use]
    pub fn dispatch_create(
        &self,
        token: PaymentToken,
        plan_id: String,
    ) -> ReplyFuture<CreateReply> {
        let methods = self.services.methods.clone();
        Box::pin(async move {
            let result = methods
                .create_user_subscription(&token.id, &token.email, &plan_id)
                .await;
            CreateReply {
                token,
                plan_id,
                result,
            }
        })
    }

    pub fn finish_create(&mut self, reply: CreateReply) -> Result<MessageOutcome, BillingError> {
        let CreateReply {
            token,
            plan_id,
            result,
        } = reply;
        self.state = SelectionState::Idle;

        match result {
            Ok(payment_method) => {
                let store = &self.services.store;
                store.upsert_subscription(&token.email, &plan_id)?;
                if let Some(payment_method) = payment_method {
                    store.upsert_payment_method(payment_method)?;
                }
                self.reconciler.schedule_recheck();
                tracing::debug!(
                    session_id = self.session.id,
                    plan_id = %plan_id,
                    "subscription created"
                );
                self.complete(true);
                Ok(MessageOutcome::Subscribed { plan_id })
            }
            Err(error) => {
                tracing::warn!(
                    session_id = self.session.id,
                    plan_id = %plan_id,
                    error = %error,
                    "subscription creation failed"
                );
                self.services
                    .notifier
                    .notify_error(&BillingError::Remote(error.clone()));
                Ok(MessageOutcome::Failed { plan_id, error })
            }
        }
    }

    /// The user closed the prompt. Reports `false` unless completion already
    /// fired, and tears down the pending recheck.
    pub fn dismiss(&mut self) {
        self.state = SelectionState::Idle;
        self.focused_frame = None;
        self.complete(false);
        self.reconciler.cancel();
    }

    fn complete(&mut self, success: bool) {
        match self.completion.take() {
            Some(mut callback) => callback(success),
            None => tracing::debug!(
                session_id = self.session.id,
                success,
                "completion already reported"
            ),
        }
    }
}
