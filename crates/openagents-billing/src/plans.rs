use serde::{Deserialize, Serialize};

/// Plan id reported when the subscription row has not loaded yet.
pub const UNKNOWN_PLAN_ID: &str = "unknown";
/// Plan a user without an explicit plan is on.
pub const FREE_PLAN_ID: &str = "free";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Monthly price in cents.
    pub price: u64,
}

impl Plan {
    #[must_use]
    pub fn new(id: impl Into<String>, price: u64) -> Self {
        Self {
            id: id.into(),
            price,
        }
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.price == 0
    }
}

/// A catalog plan annotated relative to the user's active subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanView {
    pub plan: Plan,
    pub is_current: bool,
    /// Only meaningful when `is_current` is false.
    pub is_upgrade: bool,
}

impl PlanView {
    /// Whether this plan's card should embed a payment frame instead of a
    /// plain "select" action.
    #[must_use]
    pub fn shows_payment_frame(&self, payment_method_count: usize) -> bool {
        !self.plan.is_free() && !self.is_current && payment_method_count == 0
    }
}

#[must_use]
pub fn annotate_plans(catalog: &[Plan], subscription_plan_id: Option<&str>) -> Vec<PlanView> {
    let current_id = subscription_plan_id.unwrap_or(UNKNOWN_PLAN_ID);
    let current = catalog.iter().find(|plan| plan.id == current_id);

    catalog
        .iter()
        .map(|plan| {
            let is_current = plan.id == current_id;
            let is_upgrade = !is_current
                && current.is_none_or(|current| plan.price > current.price);
            PlanView {
                plan: plan.clone(),
                is_current,
                is_upgrade,
            }
        })
        .collect()
}
