use crate::domain::money::Amount;
use crate::domain::payment_session::{
    ChargeStatus, RESULT_CODE_CANCELLED, RESULT_CODE_SUCCESS,
};
use crate::domain::phone::PhoneNumber;
use crate::domain::ports::{MobileMoneyGateway, RepaymentLedger};
use crate::domain::repayment::{NewRepayment, Repayment, RepaymentStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// One scripted reply to a status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedStatus {
    Code {
        code: String,
        reference: Option<String>,
    },
    TransportError(String),
}

impl ScriptedStatus {
    /// "Request is being processed", the usual reply while the prompt is open.
    pub fn pending() -> Self {
        Self::Code {
            code: "4999".to_string(),
            reference: None,
        }
    }

    pub fn success(reference: &str) -> Self {
        Self::Code {
            code: RESULT_CODE_SUCCESS.to_string(),
            reference: Some(reference.to_string()),
        }
    }

    pub fn cancelled() -> Self {
        Self::Code {
            code: RESULT_CODE_CANCELLED.to_string(),
            reference: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self::TransportError(message.to_string())
    }
}

/// A charge the gateway was asked to make.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeAttempt {
    pub phone_number: PhoneNumber,
    pub amount: Amount,
    pub reference: String,
}

/// A gateway that replays a fixed script of status replies.
///
/// Once the script runs out, every further check gets the fallback reply
/// (pending unless changed). Clones share the same script and counters.
#[derive(Clone)]
pub struct ScriptedGateway {
    initiation: std::result::Result<String, String>,
    script: Arc<RwLock<VecDeque<ScriptedStatus>>>,
    fallback: ScriptedStatus,
    charges: Arc<RwLock<Vec<ChargeAttempt>>>,
    status_checks: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    /// Accepts every charge and answers with `checkout_request_id`.
    pub fn accepting(checkout_request_id: &str) -> Self {
        Self::with_initiation(Ok(checkout_request_id.to_string()))
    }

    /// Rejects every charge with `message`.
    pub fn rejecting(message: &str) -> Self {
        Self::with_initiation(Err(message.to_string()))
    }

    fn with_initiation(initiation: std::result::Result<String, String>) -> Self {
        Self {
            initiation,
            script: Arc::new(RwLock::new(VecDeque::new())),
            fallback: ScriptedStatus::pending(),
            charges: Arc::new(RwLock::new(Vec::new())),
            status_checks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_statuses(self, statuses: impl IntoIterator<Item = ScriptedStatus>) -> Self {
        Self {
            script: Arc::new(RwLock::new(statuses.into_iter().collect())),
            ..self
        }
    }

    pub fn with_fallback(self, fallback: ScriptedStatus) -> Self {
        Self { fallback, ..self }
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    pub async fn charges(&self) -> Vec<ChargeAttempt> {
        self.charges.read().await.clone()
    }
}

#[async_trait]
impl MobileMoneyGateway for ScriptedGateway {
    async fn initiate_charge(
        &self,
        phone_number: &PhoneNumber,
        amount: Amount,
        reference: &str,
    ) -> Result<String> {
        self.charges.write().await.push(ChargeAttempt {
            phone_number: phone_number.clone(),
            amount,
            reference: reference.to_string(),
        });

        self.initiation.clone().map_err(|message| Error::ApiError {
            status: 400,
            message,
        })
    }

    async fn check_charge_status(&self, checkout_request_id: &str) -> Result<ChargeStatus> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match next {
            ScriptedStatus::Code { code, reference } => Ok(ChargeStatus {
                result_code: code,
                result_description: None,
                transaction_reference: reference,
            }),
            ScriptedStatus::TransportError(message) => Err(Error::TransientPollError(format!(
                "{checkout_request_id}: {message}"
            ))),
        }
    }
}

/// A thread-safe in-memory repayment ledger.
///
/// Deduplicates on the idempotency key, and counts every write call so tests
/// can tell a retried write from a single one.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    repayments: Arc<RwLock<HashMap<String, Repayment>>>,
    writes: Arc<AtomicUsize>,
    failure: Option<String>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger whose writes always fail with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn repayments(&self) -> Vec<Repayment> {
        let mut all: Vec<Repayment> = self.repayments.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[async_trait]
impl RepaymentLedger for InMemoryLedger {
    async fn record_repayment(
        &self,
        repayment: NewRepayment,
        idempotency_key: &str,
    ) -> Result<Repayment> {
        let write = self.writes.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(reason) = &self.failure {
            return Err(Error::ApiError {
                status: 503,
                message: reason.clone(),
            });
        }

        let mut repayments = self.repayments.write().await;
        let record = repayments
            .entry(idempotency_key.to_string())
            .or_insert_with(|| Repayment {
                id: format!("rep-{write}"),
                loan_id: repayment.loan_id,
                user_id: None,
                amount: repayment.amount.value(),
                date: Utc::now(),
                method: repayment.method,
                status: RepaymentStatus::Completed,
                reference: Some(repayment.reference),
            });
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment_session::ChargeOutcome;
    use crate::domain::repayment::{LoanId, PaymentMethod};
    use rust_decimal_macros::dec;

    fn new_repayment(reference: &str) -> NewRepayment {
        NewRepayment {
            loan_id: LoanId::new("loan-1").unwrap(),
            amount: Amount::new(dec!(100.0)).unwrap(),
            method: PaymentMethod::MobileMoney,
            reference: reference.to_string(),
        }
    }

    #[tokio::test]
    async fn test_scripted_gateway_replays_then_falls_back() {
        let gateway = ScriptedGateway::accepting("abc123").with_statuses([
            ScriptedStatus::error("connection reset"),
            ScriptedStatus::success("QAX123"),
        ]);

        assert!(gateway.check_charge_status("abc123").await.is_err());
        let confirmed = gateway.check_charge_status("abc123").await.unwrap();
        assert_eq!(
            confirmed.outcome(),
            ChargeOutcome::Confirmed {
                reference: Some("QAX123".to_string())
            }
        );
        let after = gateway.check_charge_status("abc123").await.unwrap();
        assert_eq!(after.outcome(), ChargeOutcome::Pending);
        assert_eq!(gateway.status_checks(), 3);
    }

    #[tokio::test]
    async fn test_scripted_gateway_records_charges() {
        let gateway = ScriptedGateway::rejecting("Invalid phone number");
        let phone = PhoneNumber::parse("0712345678").unwrap();
        let amount = Amount::new(dec!(500)).unwrap();

        let result = gateway.initiate_charge(&phone, amount, "ref").await;
        assert!(matches!(result, Err(Error::ApiError { status: 400, .. })));

        let charges = gateway.charges().await;
        assert_eq!(charges.len(), 1);
        assert_eq!(charges[0].phone_number.as_str(), "254712345678");
    }

    #[tokio::test]
    async fn test_in_memory_ledger_deduplicates_on_key() {
        let ledger = InMemoryLedger::new();

        let first = ledger
            .record_repayment(new_repayment("QAX123"), "abc123")
            .await
            .unwrap();
        let second = ledger
            .record_repayment(new_repayment("QAX123"), "abc123")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.write_count(), 2);
        assert_eq!(ledger.repayments().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_ledger_stores_nothing() {
        let ledger = InMemoryLedger::failing("ledger offline");
        let result = ledger.record_repayment(new_repayment("QAX123"), "abc123").await;

        assert!(matches!(result, Err(Error::ApiError { status: 503, .. })));
        assert_eq!(ledger.write_count(), 1);
        assert!(ledger.repayments().await.is_empty());
    }
}
