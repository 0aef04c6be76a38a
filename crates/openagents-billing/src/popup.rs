use crate::plans::FREE_PLAN_ID;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupAction {
    /// Keep the popup open on the "plan changed" confirmation.
    ShowConfirmation { old_plan: String },
    /// Close the popup and report `success` to whoever opened it.
    Close { success: bool },
}

/// Wraps a plan selection with a confirmation step. Success is held until
/// the user acknowledges it; failure and dismissal close right away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingPopup {
    old_plan: String,
    complete: bool,
}

impl BillingPopup {
    #[must_use]
    pub fn new(account_plan: Option<&str>) -> Self {
        Self {
            old_plan: account_plan
                .map(str::trim)
                .filter(|plan| !plan.is_empty())
                .unwrap_or(FREE_PLAN_ID)
                .to_string(),
            complete: false,
        }
    }

    #[must_use]
    pub fn old_plan(&self) -> &str {
        &self.old_plan
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn on_selection_complete(&mut self, success: bool) -> PopupAction {
        if success {
            self.complete = true;
            PopupAction::ShowConfirmation {
                old_plan: self.old_plan.clone(),
            }
        } else {
            PopupAction::Close { success: false }
        }
    }

    /// `None` until a selection has succeeded.
    pub fn continue_clicked(&mut self) -> Option<PopupAction> {
        self.complete.then_some(PopupAction::Close { success: true })
    }
}
