use super::money::Amount;
use super::payment_session::ChargeStatus;
use super::phone::PhoneNumber;
use super::repayment::{NewRepayment, Repayment};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Mobile-money gateway able to push a payment prompt to a phone.
#[async_trait]
pub trait MobileMoneyGateway: Send + Sync {
    /// Sends the prompt and returns the checkout request id used to poll it.
    async fn initiate_charge(
        &self,
        phone_number: &PhoneNumber,
        amount: Amount,
        reference: &str,
    ) -> Result<String>;

    async fn check_charge_status(&self, checkout_request_id: &str) -> Result<ChargeStatus>;
}

/// Loan ledger that stores confirmed repayments.
#[async_trait]
pub trait RepaymentLedger: Send + Sync {
    /// Writes are not assumed to be idempotent. `idempotency_key` is forwarded
    /// so the backend can deduplicate if it supports it.
    async fn record_repayment(
        &self,
        repayment: NewRepayment,
        idempotency_key: &str,
    ) -> Result<Repayment>;
}

pub type GatewayRef = Arc<dyn MobileMoneyGateway>;
pub type LedgerRef = Arc<dyn RepaymentLedger>;
