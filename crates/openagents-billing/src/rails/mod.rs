use async_trait::async_trait;

use crate::error::RemoteError;
use crate::store::{BillingSnapshot, PaymentMethod};

pub mod methods;

/// Server-side subscription mutations.
#[async_trait]
pub trait SubscriptionMethods: Send + Sync {
    /// Switch plans using the payment method already on file (or none, for
    /// free plans).
    async fn update_user_subscription(&self, plan_id: &str) -> Result<(), RemoteError>;

    /// Create or update the subscription from a freshly collected payment
    /// token. The server may return the new default payment method.
    async fn create_user_subscription(
        &self,
        token_id: &str,
        email: &str,
        plan_id: &str,
    ) -> Result<Option<PaymentMethod>, RemoteError>;
}

/// Read side of the billing data the client mirrors.
#[async_trait]
pub trait BillingFeed: Send + Sync {
    async fn fetch_billing_snapshot(&self) -> Result<BillingSnapshot, RemoteError>;
}
