//! REST client for the microloan backend.
//!
//! Wraps every endpoint the app uses behind typed methods, carries the
//! bearer token of the current [`Session`], and drops that session as soon as
//! the backend answers 401.

use crate::config::ApiConfig;
use crate::domain::loan::{CreditScore, DashboardStats, Loan, LoanApplication};
use crate::domain::money::Amount;
use crate::domain::payment_session::ChargeStatus;
use crate::domain::phone::PhoneNumber;
use crate::domain::ports::{MobileMoneyGateway, RepaymentLedger};
use crate::domain::repayment::{LoanId, NewRepayment, Repayment};
use crate::domain::session::Session;
use crate::domain::user::{AuthResponse, LoginCredentials, ProfileUpdate, RegisterCredentials, User};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StkPushBody<'a> {
    phone_number: &'a PhoneNumber,
    amount: Amount,
    account_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
}

#[derive(Debug, Deserialize)]
struct StkStatusResponse {
    #[serde(rename = "ResultCode", default, deserialize_with = "deserialize_code")]
    result_code: Option<String>,
    #[serde(rename = "ResultDesc", default)]
    result_desc: Option<String>,
    #[serde(rename = "MpesaReceiptNumber", default)]
    receipt_number: Option<String>,
}

impl From<StkStatusResponse> for ChargeStatus {
    fn from(response: StkStatusResponse) -> Self {
        Self {
            // No result code yet means the prompt is still open.
            result_code: response.result_code.unwrap_or_default(),
            result_description: response.result_desc,
            transaction_reference: response.receipt_number.filter(|r| !r.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Result codes arrive as `"0"` from some gateway versions and `0` from others.
fn deserialize_code<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<JsonValue> = Option::deserialize(deserializer)?;
    match value {
        Some(JsonValue::Number(n)) => Ok(Some(n.to_string())),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(JsonValue::Null) | None => Ok(None),
        _ => Err(D::Error::custom("expected number or string for result code")),
    }
}

/// Typed client for the backend REST API.
pub struct ApiClient {
    http: Client,
    base_url: Url,
    session: RwLock<Option<Session>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            Error::ValidationError(format!("Invalid API URL {}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::ValidationError(format!(
                "Invalid API URL {}",
                config.base_url
            )));
        }
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url,
            session: RwLock::new(None),
        })
    }

    pub fn with_session(self, session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
            ..self
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn logout(&self) {
        if self.session.write().await.take().is_some() {
            debug!("session cleared");
        }
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User> {
        let response: AuthResponse = self
            .send(self.request(Method::POST, &["auth", "login"])?.json(credentials))
            .await?;
        Ok(self.install(response).await)
    }

    pub async fn register(&self, credentials: &RegisterCredentials) -> Result<User> {
        let response: AuthResponse = self
            .send(self.request(Method::POST, &["auth", "register"])?.json(credentials))
            .await?;
        Ok(self.install(response).await)
    }

    /// Fetches the logged-in user and caches it on the session.
    pub async fn current_user(&self) -> Result<User> {
        let user: User = self.send(self.request(Method::GET, &["user"])?).await?;
        if let Some(session) = self.session.write().await.as_mut() {
            session.set_user(user.clone());
        }
        Ok(user)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        let user: User = self
            .send(self.request(Method::PUT, &["user"])?.json(update))
            .await?;
        if let Some(session) = self.session.write().await.as_mut() {
            session.set_user(user.clone());
        }
        Ok(user)
    }

    pub async fn apply_for_loan(&self, application: &LoanApplication) -> Result<Loan> {
        self.send(self.request(Method::POST, &["loans"])?.json(application))
            .await
    }

    pub async fn loans(&self) -> Result<Vec<Loan>> {
        self.send(self.request(Method::GET, &["loans"])?).await
    }

    pub async fn loan(&self, id: &LoanId) -> Result<Loan> {
        self.send(self.request(Method::GET, &["loans", id.as_str()])?)
            .await
    }

    pub async fn make_repayment(
        &self,
        repayment: &NewRepayment,
        idempotency_key: Option<&str>,
    ) -> Result<Repayment> {
        let mut builder = self
            .request(Method::POST, &["repayments"])?
            .json(repayment);
        if let Some(key) = idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key);
        }
        self.send(builder).await
    }

    pub async fn repayments(&self, loan_id: Option<&LoanId>) -> Result<Vec<Repayment>> {
        let mut builder = self.request(Method::GET, &["repayments"])?;
        if let Some(id) = loan_id {
            builder = builder.query(&[("loanId", id.as_str())]);
        }
        self.send(builder).await
    }

    pub async fn initiate_stk(
        &self,
        phone_number: &PhoneNumber,
        amount: Amount,
        account_reference: &str,
    ) -> Result<String> {
        let body = StkPushBody {
            phone_number,
            amount,
            account_reference,
        };
        let response: StkPushResponse = self
            .send(self.request(Method::POST, &["mpesa", "stk-push"])?.json(&body))
            .await?;
        Ok(response.checkout_request_id)
    }

    pub async fn check_stk_status(&self, checkout_request_id: &str) -> Result<ChargeStatus> {
        let response: StkStatusResponse = self
            .send(self.request(Method::GET, &["mpesa", "stk-status", checkout_request_id])?)
            .await?;
        Ok(response.into())
    }

    pub async fn credit_score(&self) -> Result<CreditScore> {
        self.send(self.request(Method::GET, &["score"])?).await
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.send(self.request(Method::GET, &["dashboard", "stats"])?)
            .await
    }

    async fn install(&self, response: AuthResponse) -> User {
        let user = response.user.clone();
        *self.session.write().await = Some(Session::issued(response.token, response.user));
        debug!(user_id = %user.id, "session started");
        user
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::ValidationError(format!("Invalid API URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        Ok(self.http.request(method, self.endpoint(segments)?))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let (token, expired) = match self.session.read().await.as_ref() {
            Some(session) => (
                Some(session.token().to_string()),
                session.is_expired(Utc::now()),
            ),
            None => (None, false),
        };
        if expired {
            warn!("session token expired, logging out");
            self.logout().await;
            return Err(Error::Unauthorized);
        }
        let builder = match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "api response");

        if status == StatusCode::UNAUTHORIZED {
            warn!("backend rejected the session token");
            self.logout().await;
            return Err(Error::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|body| body.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(Error::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MobileMoneyGateway for ApiClient {
    async fn initiate_charge(
        &self,
        phone_number: &PhoneNumber,
        amount: Amount,
        reference: &str,
    ) -> Result<String> {
        self.initiate_stk(phone_number, amount, reference).await
    }

    async fn check_charge_status(&self, checkout_request_id: &str) -> Result<ChargeStatus> {
        self.check_stk_status(checkout_request_id).await
    }
}

#[async_trait]
impl RepaymentLedger for ApiClient {
    async fn record_repayment(
        &self,
        repayment: NewRepayment,
        idempotency_key: &str,
    ) -> Result<Repayment> {
        self.make_repayment(&repayment, Some(idempotency_key)).await
    }
}
