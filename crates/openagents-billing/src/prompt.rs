//! A mounted billing prompt: one controller, one listener on the shared
//! message channel, and one event loop that owns both.
//!
//! The loop ends when the prompt closes or the host drops its
//! [`PromptHandle`]. Either way the listener is released and the pending
//! cache recheck is cancelled.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::config::BillingConfig;
use crate::controller::{
    CreateReply, EventStep, PlanSelectionController, PromptServices, ReplyFuture, SelectStep,
    SelectionState, UpdateReply,
};
use crate::error::BillingError;
use crate::origin::TrustedOrigin;
use crate::plans::{Plan, PlanView};
use crate::popup::{BillingPopup, PopupAction};
use crate::protocol::{CheckoutDescriptor, MessageHandler, RawInboundEvent};
use crate::session::SessionRegistry;

type Listener = mpsc::UnboundedSender<RawInboundEvent>;

/// Process-wide channel the host page forwards every inbound message onto.
///
/// Every listener owns an unbounded queue, so a prompt that is busy with a
/// remote call still sees all of its messages, in order, once it gets back
/// to them.
#[derive(Debug, Clone, Default)]
pub struct MessageChannel {
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl MessageChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many listeners received the event.
    pub fn post(&self, event: RawInboundEvent) -> usize {
        let mut listeners = self.lock_listeners();
        listeners.retain(|listener| listener.send(event.clone()).is_ok());
        listeners.len()
    }

    /// Register a listener. Dropping the receiver unregisters it.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RawInboundEvent> {
        let (listener, receiver) = mpsc::unbounded_channel();
        self.lock_listeners().push(listener);
        receiver
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.lock_listeners();
        listeners.retain(|listener| !listener.is_closed());
        listeners.len()
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptCommand {
    SelectPlan(PlanView),
    Continue,
    Dismiss,
}

/// View-state changes for the host to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
    StateChanged(SelectionState),
    FocusChanged(Option<String>),
    PlanChanged {
        old_plan: String,
        new_plan: Option<String>,
    },
    Closed {
        success: bool,
    },
}

#[derive(Debug, Clone)]
pub struct PromptHandle {
    session_id: u64,
    commands: mpsc::UnboundedSender<PromptCommand>,
}

impl PromptHandle {
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// `false` once the prompt has closed.
    pub fn send(&self, command: PromptCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn select_plan(&self, view: PlanView) -> bool {
        self.send(PromptCommand::SelectPlan(view))
    }

    pub fn continue_after_success(&self) -> bool {
        self.send(PromptCommand::Continue)
    }

    pub fn dismiss(&self) -> bool {
        self.send(PromptCommand::Dismiss)
    }
}

enum RemoteReply {
    Update(UpdateReply),
    Create(CreateReply),
}

enum Step {
    Completed(bool),
    Reply(RemoteReply),
    Command(Option<PromptCommand>),
    Message(Option<RawInboundEvent>),
}

pub struct BillingPrompt {
    controller: PlanSelectionController,
    popup: BillingPopup,
    messages: mpsc::UnboundedReceiver<RawInboundEvent>,
    messages_open: bool,
    commands: mpsc::UnboundedReceiver<PromptCommand>,
    completions: mpsc::UnboundedReceiver<bool>,
    events: mpsc::UnboundedSender<PromptEvent>,
    last_state: SelectionState,
    last_focus: Option<String>,
    product_name: String,
}

impl BillingPrompt {
    /// Mount a prompt for the page at `page_url`. The returned prompt does
    /// nothing until [`BillingPrompt::run`] is polled.
    pub fn mount(
        config: &BillingConfig,
        page_url: &str,
        services: PromptServices,
        channel: &MessageChannel,
        account_plan: Option<&str>,
    ) -> Result<(Self, PromptHandle, mpsc::UnboundedReceiver<PromptEvent>), BillingError> {
        let origin = TrustedOrigin::from_page_url(
            page_url,
            &config.wildcard_host,
            &config.payments_service,
        )?;
        let handler = MessageHandler::new(origin);
        let session = SessionRegistry::global().assign();
        let session_id = session.id;
        tracing::debug!(
            session_id,
            trusted_origin = handler.trusted_origin().as_str(),
            "billing prompt mounted"
        );

        let (completion_tx, completions) = mpsc::unbounded_channel();
        let controller = PlanSelectionController::new(
            session,
            handler,
            services,
            config.recheck_delay,
            Box::new(move |success| {
                let _ = completion_tx.send(success);
            }),
        )
        .with_account_plan(account_plan);

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let prompt = Self {
            controller,
            popup: BillingPopup::new(account_plan),
            messages: channel.subscribe(),
            messages_open: true,
            commands,
            completions,
            events,
            last_state: SelectionState::Idle,
            last_focus: None,
            product_name: config.product_name.clone(),
        };
        let handle = PromptHandle {
            session_id,
            commands: commands_tx,
        };
        Ok((prompt, handle, events_rx))
    }

    #[must_use]
    pub fn controller(&self) -> &PlanSelectionController {
        &self.controller
    }

    /// Checkout payloads for the plan cards that embed a payment frame, in
    /// catalog order. Empty without a primary email.
    pub fn checkout_descriptors(
        &self,
        catalog: &[Plan],
        primary_email: Option<&str>,
    ) -> Result<Vec<CheckoutDescriptor>, BillingError> {
        let card_count = self.controller.payment_method_count()?;
        Ok(self
            .controller
            .plan_views(catalog)?
            .iter()
            .filter(|view| view.shows_payment_frame(card_count))
            .filter_map(|view| {
                self.controller
                    .checkout_descriptor(&view.plan, primary_email, &self.product_name)
            })
            .collect())
    }

    /// Drive the prompt until it closes. Returns the success value reported
    /// to the host, or `None` if the host went away first.
    ///
    /// While a remote call is in flight, inbound messages stay queued and
    /// commands keep flowing; a dismiss abandons the call.
    pub async fn run(mut self) -> Option<bool> {
        if let Err(error) = self.controller.reconciler().refresh_now().await {
            tracing::warn!(error = %error, "initial billing refresh failed");
        }

        let mut in_flight: Option<ReplyFuture<RemoteReply>> = None;
        let result = loop {
            let step = tokio::select! {
                biased;
                Some(success) = self.completions.recv() => Step::Completed(success),
                reply = next_reply(&mut in_flight), if in_flight.is_some() => Step::Reply(reply),
                command = self.commands.recv() => Step::Command(command),
                message = self.messages.recv(), if self.messages_open && in_flight.is_none() => {
                    Step::Message(message)
                }
            };

            match step {
                Step::Completed(success) => match self.popup.on_selection_complete(success) {
                    PopupAction::ShowConfirmation { old_plan } => {
                        let new_plan = self.controller.current_plan_id().ok().flatten();
                        self.emit(PromptEvent::PlanChanged { old_plan, new_plan });
                    }
                    PopupAction::Close { success } => break Some(success),
                },
                Step::Reply(reply) => {
                    in_flight = None;
                    self.finish_remote_call(reply);
                }
                Step::Command(None) => {
                    tracing::debug!(
                        session_id = self.controller.session().id,
                        "prompt handle dropped; unmounting"
                    );
                    self.abandon_remote_call(in_flight.take());
                    self.controller.dismiss();
                    break None;
                }
                Step::Command(Some(PromptCommand::SelectPlan(view))) => {
                    if in_flight.is_some() {
                        tracing::debug!(
                            plan_id = %view.plan.id,
                            "plan change already in flight; selection ignored"
                        );
                    } else {
                        in_flight = self.begin_selection(&view);
                    }
                }
                Step::Command(Some(PromptCommand::Continue)) => {
                    if let Some(PopupAction::Close { success }) = self.popup.continue_clicked() {
                        break Some(success);
                    }
                }
                Step::Command(Some(PromptCommand::Dismiss)) => {
                    self.abandon_remote_call(in_flight.take());
                    self.controller.dismiss();
                    break Some(false);
                }
                Step::Message(Some(event)) => {
                    if let EventStep::Create { token, plan_id } =
                        self.controller.begin_event(&event)
                    {
                        let call = self.controller.dispatch_create(token, plan_id);
                        in_flight = Some(Box::pin(async move { RemoteReply::Create(call.await) }));
                    }
                }
                Step::Message(None) => {
                    tracing::debug!("message channel closed");
                    self.messages_open = false;
                }
            }
            self.emit_view_changes();
        };

        self.controller.reconciler().cancel();
        if let Some(success) = result {
            self.emit(PromptEvent::Closed { success });
        }
        result
    }

    fn begin_selection(&mut self, view: &PlanView) -> Option<ReplyFuture<RemoteReply>> {
        match self.controller.begin_select(view) {
            Ok(SelectStep::Done(_)) => None,
            Ok(SelectStep::Update { plan_id }) => {
                let call = self.controller.dispatch_update(plan_id);
                Some(Box::pin(async move { RemoteReply::Update(call.await) }))
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    plan_id = %view.plan.id,
                    "plan selection failed"
                );
                None
            }
        }
    }

    fn finish_remote_call(&mut self, reply: RemoteReply) {
        let finished = match reply {
            RemoteReply::Update(reply) => self.controller.finish_update(reply).map(|_| ()),
            RemoteReply::Create(reply) => self.controller.finish_create(reply).map(|_| ()),
        };
        if let Err(error) = finished {
            tracing::warn!(error = %error, "plan change could not be applied");
        }
    }

    fn abandon_remote_call(&self, call: Option<ReplyFuture<RemoteReply>>) {
        if let Some(call) = call {
            drop(call);
            tracing::debug!(
                session_id = self.controller.session().id,
                state = self.controller.state().as_str(),
                "abandoning in-flight plan change"
            );
        }
    }

    fn emit_view_changes(&mut self) {
        let state = self.controller.state().clone();
        if state != self.last_state {
            self.last_state = state.clone();
            self.emit(PromptEvent::StateChanged(state));
        }
        let focus = self.controller.focused_frame().map(str::to_string);
        if focus != self.last_focus {
            self.last_focus = focus.clone();
            self.emit(PromptEvent::FocusChanged(focus));
        }
    }

    fn emit(&self, event: PromptEvent) {
        let _ = self.events.send(event);
    }
}

async fn next_reply(in_flight: &mut Option<ReplyFuture<RemoteReply>>) -> RemoteReply {
    match in_flight.as_mut() {
        Some(call) => call.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::MessageChannel;
    use crate::protocol::RawInboundEvent;

    #[test]
    fn slow_listener_keeps_every_message_in_order() {
        let channel = MessageChannel::new();
        let mut slow = channel.subscribe();
        for id in 0..1_000_u64 {
            assert_eq!(
                channel.post(RawInboundEvent::new("https://a.example.com", json!({ "id": id }))),
                1
            );
        }

        let ids: Vec<u64> = std::iter::from_fn(|| slow.try_recv().ok())
            .filter_map(|event| event.data.get("id").and_then(serde_json::Value::as_u64))
            .collect();
        assert_eq!(ids, (0..1_000).collect::<Vec<_>>());
    }

    #[test]
    fn dropped_listener_is_released() {
        let channel = MessageChannel::new();
        let kept = channel.subscribe();
        let dropped = channel.subscribe();
        assert_eq!(channel.listener_count(), 2);

        drop(dropped);
        assert_eq!(channel.listener_count(), 1);
        assert_eq!(
            channel.post(RawInboundEvent::new("https://a.example.com", json!({ "id": 1 }))),
            1
        );
        drop(kept);
        assert_eq!(channel.listener_count(), 0);
    }
}
