use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::BillingConfig;
use crate::error::RemoteError;
use crate::rails::{BillingFeed, SubscriptionMethods};
use crate::store::{BillingSnapshot, PaymentMethod};

pub const METHOD_UPDATE_USER_SUBSCRIPTION: &str = "updateUserSubscription";
pub const METHOD_CREATE_USER_SUBSCRIPTION: &str = "createUserSubscription";
pub const METHOD_GET_BILLING_DATA: &str = "getBillingData";

/// Reply to a method call. The server may report a fault with any status,
/// so the fault shape is tried first.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MethodReply<T> {
    Fault { error: MethodFault },
    Returned { result: T },
}

/// Accepts both `{code, message}` and the account server's `{error, reason}`.
#[derive(Debug, Deserialize)]
struct MethodFault {
    #[serde(alias = "error")]
    code: String,
    #[serde(default, alias = "reason")]
    message: String,
}

#[derive(Debug, Serialize)]
struct MethodCallBody<'a> {
    params: &'a [Value],
}

/// HTTP bridge to the account server's billing methods.
///
/// Every call is `POST {base_url}/methods/{name}` with `{"params": [...]}`;
/// successful responses carry `{"result": ...}`.
#[derive(Debug, Clone)]
pub struct MethodRailsClient {
    base_url: String,
    auth_token: Option<String>,
    http: reqwest::Client,
}

impl MethodRailsClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: auth_token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &BillingConfig) -> Self {
        Self::new(config.methods_base_url.clone(), config.auth_token.clone())
    }

    async fn call<TRes>(&self, method: &str, params: &[Value]) -> Result<TRes, RemoteError>
    where
        TRes: for<'de> Deserialize<'de>,
    {
        let url = format!(
            "{}/methods/{method}",
            self.base_url.trim_end_matches('/')
        );
        let mut request = self.http.post(url).json(&MethodCallBody { params });
        if let Some(token) = self.auth_token.as_ref() {
            request = request.header("authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|error| RemoteError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| RemoteError::Transport(error.to_string()))?;

        match serde_json::from_slice::<MethodReply<TRes>>(&body) {
            Ok(MethodReply::Fault { error }) => Err(RemoteError::Api {
                status: status.as_u16(),
                code: error.code,
                message: error.message,
            }),
            Ok(MethodReply::Returned { result }) if status.is_success() => Ok(result),
            Err(error) if status.is_success() => {
                Err(RemoteError::Parse(format!("{method} reply: {error}")))
            }
            _ => {
                tracing::debug!(
                    method,
                    status = status.as_u16(),
                    "billing method failed without a fault"
                );
                Err(RemoteError::Api {
                    status: status.as_u16(),
                    code: unexplained_failure_code(status).to_string(),
                    message: String::from_utf8_lossy(&body).trim().to_string(),
                })
            }
        }
    }
}

/// Code for a failed call whose body carries no fault.
fn unexplained_failure_code(status: reqwest::StatusCode) -> &'static str {
    if status.is_server_error() {
        "billing_unavailable"
    } else {
        "billing_rejected"
    }
}

#[async_trait]
impl SubscriptionMethods for MethodRailsClient {
    async fn update_user_subscription(&self, plan_id: &str) -> Result<(), RemoteError> {
        let _: Option<Value> = self
            .call(METHOD_UPDATE_USER_SUBSCRIPTION, &[json!(plan_id)])
            .await?;
        Ok(())
    }

    async fn create_user_subscription(
        &self,
        token_id: &str,
        email: &str,
        plan_id: &str,
    ) -> Result<Option<PaymentMethod>, RemoteError> {
        self.call(
            METHOD_CREATE_USER_SUBSCRIPTION,
            &[json!(token_id), json!(email), json!(plan_id)],
        )
        .await
    }
}

#[async_trait]
impl BillingFeed for MethodRailsClient {
    async fn fetch_billing_snapshot(&self) -> Result<BillingSnapshot, RemoteError> {
        self.call(METHOD_GET_BILLING_DATA, &[]).await
    }
}
