use super::money::Amount;
use super::phone::PhoneNumber;
use crate::error::Error;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a loan as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(String);

impl LoanId {
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::ValidationError(
                "Loan id must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Account reference shown on the customer's payment prompt.
    pub fn payment_reference(&self) -> String {
        let short: String = self.0.chars().take(8).collect();
        format!("Loan Repayment - {short}")
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A submitted repayment: which loan, how much, and which phone to charge.
///
/// Fields are private and only set by [`RepaymentRequest::new`], so a request
/// cannot change once it has been handed to a flow.
#[derive(Debug, Clone, PartialEq)]
pub struct RepaymentRequest {
    loan_id: LoanId,
    amount: Amount,
    phone_number: PhoneNumber,
}

impl RepaymentRequest {
    pub fn new(loan_id: &str, amount: Decimal, phone_number: &str) -> Result<Self, Error> {
        Ok(Self {
            loan_id: LoanId::new(loan_id)?,
            amount: Amount::new(amount)?,
            phone_number: PhoneNumber::parse(phone_number)?,
        })
    }

    pub fn loan_id(&self) -> &LoanId {
        &self.loan_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn phone_number(&self) -> &PhoneNumber {
        &self.phone_number
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[serde(alias = "mpesa")]
    MobileMoney,
    Bank,
    Cash,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum RepaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// Ledger write for a confirmed payment.
#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewRepayment {
    pub loan_id: LoanId,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub reference: String,
}

/// A repayment as stored by the backend.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Repayment {
    pub id: String,
    pub loan_id: LoanId,
    #[serde(default)]
    pub user_id: Option<String>,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub method: PaymentMethod,
    pub status: RepaymentStatus,
    #[serde(default)]
    pub reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_validates_every_field() {
        let request = RepaymentRequest::new("loan-42", dec!(500), "0712345678").unwrap();
        assert_eq!(request.loan_id().as_str(), "loan-42");
        assert_eq!(request.amount().value(), dec!(500));
        assert_eq!(request.phone_number().as_str(), "254712345678");

        assert!(matches!(
            RepaymentRequest::new("  ", dec!(500), "0712345678"),
            Err(Error::ValidationError(_))
        ));
        assert!(matches!(
            RepaymentRequest::new("loan-42", dec!(0), "0712345678"),
            Err(Error::ValidationError(_))
        ));
        assert!(matches!(
            RepaymentRequest::new("loan-42", dec!(500), "12345"),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_payment_reference_uses_loan_id_prefix() {
        let loan = LoanId::new("3f2a9c10-77e1-4b55").unwrap();
        assert_eq!(loan.payment_reference(), "Loan Repayment - 3f2a9c10");

        let short = LoanId::new("L1").unwrap();
        assert_eq!(short.payment_reference(), "Loan Repayment - L1");
    }

    #[test]
    fn test_new_repayment_wire_format() {
        let record = NewRepayment {
            loan_id: LoanId::new("loan-42").unwrap(),
            amount: Amount::new(dec!(500)).unwrap(),
            method: PaymentMethod::MobileMoney,
            reference: "QAX123".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "loanId": "loan-42",
                "amount": 500.0,
                "method": "mobile_money",
                "reference": "QAX123"
            })
        );
    }

    #[test]
    fn test_repayment_deserialization_accepts_legacy_method() {
        let json = r#"{
            "id": "r1",
            "loanId": "loan-42",
            "userId": "u1",
            "amount": 500,
            "date": "2026-03-01T10:00:00Z",
            "method": "mpesa",
            "status": "completed",
            "reference": "QAX123"
        }"#;
        let repayment: Repayment = serde_json::from_str(json).unwrap();
        assert_eq!(repayment.method, PaymentMethod::MobileMoney);
        assert_eq!(repayment.amount, dec!(500));
        assert_eq!(repayment.reference.as_deref(), Some("QAX123"));
    }
}
