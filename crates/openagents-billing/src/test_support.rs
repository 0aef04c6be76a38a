use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::controller::{PaymentSurface, PromptServices, UserNotifier};
use crate::error::{BillingError, RemoteError};
use crate::origin::TrustedOrigin;
use crate::plans::{Plan, PlanView};
use crate::protocol::{MessageHandler, OutboundMessage};
use crate::rails::{BillingFeed, SubscriptionMethods};
use crate::session::{PromptSession, SessionRegistry};
use crate::store::{BillingSnapshot, BillingStore, PaymentMethod, SubscriptionState};

pub const PAYMENTS_ORIGIN: &str = "https://payments.oasis.example.com";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodCall {
    Update(String),
    Create {
        token_id: String,
        email: String,
        plan_id: String,
    },
}

#[derive(Default)]
pub struct FakeMethods {
    calls: Mutex<Vec<MethodCall>>,
    fail_next: Mutex<Option<String>>,
    payment_method: Mutex<Option<PaymentMethod>>,
}

impl FakeMethods {
    pub fn calls(&self) -> Vec<MethodCall> {
        locked(&self.calls).clone()
    }

    pub fn fail_next(&self, code: &str) {
        *locked(&self.fail_next) = Some(code.to_string());
    }

    pub fn return_payment_method(&self, method: PaymentMethod) {
        *locked(&self.payment_method) = Some(method);
    }

    fn take_failure(&self) -> Result<(), RemoteError> {
        match locked(&self.fail_next).take() {
            Some(code) => Err(RemoteError::Api {
                status: 400,
                code: code.clone(),
                message: code,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SubscriptionMethods for FakeMethods {
    async fn update_user_subscription(&self, plan_id: &str) -> Result<(), RemoteError> {
        locked(&self.calls).push(MethodCall::Update(plan_id.to_string()));
        self.take_failure()
    }

    async fn create_user_subscription(
        &self,
        token_id: &str,
        email: &str,
        plan_id: &str,
    ) -> Result<Option<PaymentMethod>, RemoteError> {
        locked(&self.calls).push(MethodCall::Create {
            token_id: token_id.to_string(),
            email: email.to_string(),
            plan_id: plan_id.to_string(),
        });
        self.take_failure()?;
        Ok(locked(&self.payment_method).clone())
    }
}

pub struct StaticFeed {
    snapshot: BillingSnapshot,
}

#[async_trait]
impl BillingFeed for StaticFeed {
    async fn fetch_billing_snapshot(&self) -> Result<BillingSnapshot, RemoteError> {
        Ok(self.snapshot.clone())
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    posts: Mutex<Vec<(String, OutboundMessage)>>,
}

impl RecordingSurface {
    pub fn posts(&self) -> Vec<(String, OutboundMessage)> {
        locked(&self.posts).clone()
    }
}

impl PaymentSurface for RecordingSurface {
    fn post_to_frame(&self, plan_id: &str, message: OutboundMessage) {
        locked(&self.posts).push((plan_id.to_string(), message));
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<String> {
        locked(&self.notices).clone()
    }
}

impl UserNotifier for RecordingNotifier {
    fn notify_error(&self, error: &BillingError) {
        let notice = match error {
            BillingError::Remote(RemoteError::Api { code, .. }) => code.clone(),
            other => other.to_string(),
        };
        locked(&self.notices).push(notice);
    }
}

pub struct Fixture {
    pub session: PromptSession,
    pub handler: MessageHandler,
    pub services: PromptServices,
    pub catalog: Vec<Plan>,
    pub methods: Arc<FakeMethods>,
    pub surface: Arc<RecordingSurface>,
    pub notifier: Arc<RecordingNotifier>,
}

/// A prompt environment whose store holds `subscription_plan` and
/// `card_count` payment methods. The feed serves that same state back.
pub fn fixture(subscription_plan: Option<&str>, card_count: usize) -> Fixture {
    let snapshot = BillingSnapshot {
        subscription: subscription_plan.map(|plan| SubscriptionState {
            email: None,
            subscription_plan_id: plan.to_string(),
        }),
        payment_methods: (0..card_count)
            .map(|index| PaymentMethod::new(format!("card_{index}")))
            .collect(),
    };
    let methods = Arc::new(FakeMethods::default());
    let surface = Arc::new(RecordingSurface::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let services = PromptServices {
        store: Arc::new(BillingStore::with_snapshot(snapshot.clone())),
        methods: methods.clone(),
        feed: Arc::new(StaticFeed { snapshot }),
        surface: surface.clone(),
        notifier: notifier.clone(),
    };
    let origin = TrustedOrigin::for_service("https:", "*.oasis.example.com", "payments")
        .unwrap_or_else(|error| panic!("fixture origin: {error}"));

    Fixture {
        session: SessionRegistry::global().assign(),
        handler: MessageHandler::new(origin),
        services,
        catalog: vec![
            Plan::new("free", 0),
            Plan::new("standard", 900),
            Plan::new("pro", 2_900),
        ],
        methods,
        surface,
        notifier,
    }
}

pub fn view_for(views: &[PlanView], plan_id: &str) -> PlanView {
    views
        .iter()
        .find(|view| view.plan.id == plan_id)
        .cloned()
        .unwrap_or_else(|| panic!("plan {plan_id} missing from catalog"))
}
