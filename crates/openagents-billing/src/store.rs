use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Key of the one subscription row the client mirrors.
pub const SUBSCRIPTION_ROW_ID: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "subscription", alias = "subscription_plan_id")]
    pub subscription_plan_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<u32>,
}

impl PaymentMethod {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            brand: None,
            last4: None,
            exp_month: None,
            exp_year: None,
        }
    }
}

/// Authoritative billing data as served by the billing feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSnapshot {
    #[serde(default)]
    pub subscription: Option<SubscriptionState>,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
}

/// Client-side mirror of the user's subscription row and payment methods.
///
/// Shared by every open prompt; the last write wins.
#[derive(Debug, Default)]
pub struct BillingStore {
    subscriptions: Mutex<HashMap<String, SubscriptionState>>,
    payment_methods: Mutex<BTreeMap<String, PaymentMethod>>,
}

impl BillingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_snapshot(snapshot: BillingSnapshot) -> Self {
        let store = Self::new();
        if let Ok(mut subscriptions) = store.subscriptions.lock() {
            if let Some(subscription) = snapshot.subscription {
                subscriptions.insert(SUBSCRIPTION_ROW_ID.to_string(), subscription);
            }
        }
        if let Ok(mut payment_methods) = store.payment_methods.lock() {
            for method in snapshot.payment_methods {
                payment_methods.insert(method.id.clone(), method);
            }
        }
        store
    }

    fn lock_error(label: &str) -> StoreError {
        StoreError::Internal(format!("mutex poisoned: {label}"))
    }

    pub fn subscription(&self) -> Result<Option<SubscriptionState>, StoreError> {
        let subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| Self::lock_error("subscriptions"))?;
        Ok(subscriptions.get(SUBSCRIPTION_ROW_ID).cloned())
    }

    pub fn subscription_plan_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .subscription()?
            .map(|subscription| subscription.subscription_plan_id))
    }

    /// Set only the plan id, keeping any known email. Creates the row when the
    /// feed has not delivered it yet.
    pub fn set_subscription_plan(&self, plan_id: &str) -> Result<(), StoreError> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| Self::lock_error("subscriptions"))?;
        subscriptions
            .entry(SUBSCRIPTION_ROW_ID.to_string())
            .and_modify(|row| row.subscription_plan_id = plan_id.to_string())
            .or_insert_with(|| SubscriptionState {
                email: None,
                subscription_plan_id: plan_id.to_string(),
            });
        Ok(())
    }

    /// Replace the subscription row with `email` and `plan_id`.
    pub fn upsert_subscription(&self, email: &str, plan_id: &str) -> Result<(), StoreError> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| Self::lock_error("subscriptions"))?;
        subscriptions.insert(
            SUBSCRIPTION_ROW_ID.to_string(),
            SubscriptionState {
                email: Some(email.to_string()),
                subscription_plan_id: plan_id.to_string(),
            },
        );
        Ok(())
    }

    pub fn upsert_payment_method(&self, method: PaymentMethod) -> Result<(), StoreError> {
        let mut payment_methods = self
            .payment_methods
            .lock()
            .map_err(|_| Self::lock_error("payment_methods"))?;
        payment_methods.insert(method.id.clone(), method);
        Ok(())
    }

    pub fn payment_method_count(&self) -> Result<usize, StoreError> {
        let payment_methods = self
            .payment_methods
            .lock()
            .map_err(|_| Self::lock_error("payment_methods"))?;
        Ok(payment_methods.len())
    }

    pub fn payment_methods(&self) -> Result<Vec<PaymentMethod>, StoreError> {
        let payment_methods = self
            .payment_methods
            .lock()
            .map_err(|_| Self::lock_error("payment_methods"))?;
        Ok(payment_methods.values().cloned().collect())
    }

    pub fn snapshot(&self) -> Result<BillingSnapshot, StoreError> {
        Ok(BillingSnapshot {
            subscription: self.subscription()?,
            payment_methods: self.payment_methods()?,
        })
    }

    /// Overwrite the local mirror with server state. Returns `true` when the
    /// local copy had drifted from it.
    pub fn replace_with_snapshot(&self, snapshot: BillingSnapshot) -> Result<bool, StoreError> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| Self::lock_error("subscriptions"))?;
        let mut payment_methods = self
            .payment_methods
            .lock()
            .map_err(|_| Self::lock_error("payment_methods"))?;

        let incoming_methods = snapshot
            .payment_methods
            .into_iter()
            .map(|method| (method.id.clone(), method))
            .collect::<BTreeMap<_, _>>();

        let drifted = subscriptions.get(SUBSCRIPTION_ROW_ID) != snapshot.subscription.as_ref()
            || *payment_methods != incoming_methods;

        subscriptions.clear();
        if let Some(subscription) = snapshot.subscription {
            subscriptions.insert(SUBSCRIPTION_ROW_ID.to_string(), subscription);
        }
        *payment_methods = incoming_methods;
        Ok(drifted)
    }
}
