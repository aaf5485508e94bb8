use super::money::Amount;
use super::repayment::{LoanId, Repayment};
use crate::error::Error;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const MIN_LOAN_AMOUNT: Decimal = dec!(1000);
pub const LOAN_TERMS_DAYS: [u32; 3] = [7, 30, 90];
const PROCESSING_FEE_RATE: Decimal = dec!(0.05);
const PROCESSING_FEE_CAP: Decimal = dec!(500);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Disbursed,
    Paid,
    Overdue,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: LoanId,
    pub user_id: String,
    pub amount: Decimal,
    /// Term in days.
    pub term: u32,
    pub status: LoanStatus,
    pub interest_rate: Decimal,
    pub application_date: DateTime<Utc>,
    #[serde(default)]
    pub approval_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disbursement_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub repayment_method: Option<String>,
}

/// Repayment standing of a loan relative to its due date.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DueStatus {
    Paid,
    Pending,
    Overdue,
}

pub fn derive_status(due_date: DateTime<Utc>, is_paid: bool, today: DateTime<Utc>) -> DueStatus {
    if is_paid {
        DueStatus::Paid
    } else if today > due_date {
        DueStatus::Overdue
    } else {
        DueStatus::Pending
    }
}

/// Interest charged for a term, as a fraction of the principal.
pub fn interest_rate_for_term(term_days: u32) -> Decimal {
    match term_days {
        0..=14 => dec!(0.10),
        15..=30 => dec!(0.15),
        _ => dec!(0.20),
    }
}

/// Cost breakdown shown before a loan application is submitted.
#[derive(Debug, Serialize, PartialEq, Clone, Copy)]
pub struct LoanQuote {
    pub principal: Decimal,
    pub interest_rate: Decimal,
    pub interest: Decimal,
    pub processing_fee: Decimal,
    pub total_repayment: Decimal,
}

impl LoanQuote {
    /// Prices a loan the product offers. Amounts large enough to overflow
    /// the cost arithmetic are rejected.
    pub fn new(principal: Decimal, term_days: u32) -> Result<Self, Error> {
        check_product_rules(principal, term_days)?;
        let interest_rate = interest_rate_for_term(term_days);
        let too_large =
            || Error::ValidationError(format!("Loan amount {principal} is too large to quote"));
        let interest = principal.checked_mul(interest_rate).ok_or_else(too_large)?;
        let processing_fee = principal
            .checked_mul(PROCESSING_FEE_RATE)
            .ok_or_else(too_large)?
            .min(PROCESSING_FEE_CAP);
        let total_repayment = principal
            .checked_add(interest)
            .and_then(|sum| sum.checked_add(processing_fee))
            .ok_or_else(too_large)?;
        Ok(Self {
            principal,
            interest_rate,
            interest,
            processing_fee,
            total_repayment,
        })
    }
}

fn check_product_rules(amount: Decimal, term: u32) -> Result<(), Error> {
    if amount < MIN_LOAN_AMOUNT {
        return Err(Error::ValidationError(format!(
            "Minimum loan amount is KES {MIN_LOAN_AMOUNT}"
        )));
    }
    if !LOAN_TERMS_DAYS.contains(&term) {
        return Err(Error::ValidationError(format!(
            "Loan term must be one of {LOAN_TERMS_DAYS:?} days"
        )));
    }
    Ok(())
}

/// Body of `POST /loans`.
#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    pub amount: Amount,
    pub term: u32,
    pub purpose: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub interest_rate: Decimal,
}

impl LoanApplication {
    /// Validates an application against the product rules and, when known,
    /// the borrower's credit limit.
    pub fn new(
        amount: Decimal,
        term: u32,
        purpose: &str,
        max_amount: Option<Decimal>,
    ) -> Result<Self, Error> {
        check_product_rules(amount, term)?;
        if let Some(max) = max_amount
            && amount > max
        {
            return Err(Error::ValidationError(format!(
                "Maximum loan amount is KES {max}"
            )));
        }
        let purpose = purpose.trim();
        if purpose.chars().count() < 3 {
            return Err(Error::ValidationError(
                "Please provide more details about the purpose".to_string(),
            ));
        }

        Ok(Self {
            amount: Amount::new(amount)?,
            term,
            purpose: purpose.to_string(),
            interest_rate: interest_rate_for_term(term),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum FactorImpact {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CreditFactor {
    pub name: String,
    pub impact: FactorImpact,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreditScore {
    pub user_id: String,
    pub score: u32,
    pub max_loan_amount: Decimal,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub factors: Vec<CreditFactor>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub active_loans: u32,
    pub total_borrowed: Decimal,
    pub total_repaid: Decimal,
    pub available_credit: Decimal,
    #[serde(default)]
    pub repayments_due: Vec<Repayment>,
    #[serde(default)]
    pub loan_history: Vec<Loan>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_interest_rate_bands() {
        assert_eq!(interest_rate_for_term(7), dec!(0.10));
        assert_eq!(interest_rate_for_term(14), dec!(0.10));
        assert_eq!(interest_rate_for_term(30), dec!(0.15));
        assert_eq!(interest_rate_for_term(90), dec!(0.20));
    }

    #[test]
    fn test_quote_fee_is_capped() {
        let small = LoanQuote::new(dec!(5000), 30).unwrap();
        assert_eq!(small.interest, dec!(750));
        assert_eq!(small.processing_fee, dec!(250));
        assert_eq!(small.total_repayment, dec!(6000));

        let large = LoanQuote::new(dec!(20000), 90).unwrap();
        assert_eq!(large.interest, dec!(4000));
        assert_eq!(large.processing_fee, dec!(500));
        assert_eq!(large.total_repayment, dec!(24500));
    }

    #[test]
    fn test_quote_rejects_overflowing_amount() {
        assert!(matches!(
            LoanQuote::new(Decimal::MAX, 90),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_quote_only_for_offered_products() {
        for (amount, term) in [
            (dec!(500), 30),
            (dec!(0), 30),
            (dec!(-5000), 30),
            (dec!(5000), 0),
            (dec!(5000), 45),
        ] {
            assert!(matches!(
                LoanQuote::new(amount, term),
                Err(Error::ValidationError(_))
            ));
        }
        assert!(LoanQuote::new(MIN_LOAN_AMOUNT, 7).is_ok());
    }

    #[test]
    fn test_application_rules() {
        let app = LoanApplication::new(dec!(5000), 30, " School fees ", Some(dec!(10000))).unwrap();
        assert_eq!(app.purpose, "School fees");
        assert_eq!(app.interest_rate, dec!(0.15));

        for (amount, term, purpose, max) in [
            (dec!(999), 30, "Business", None),
            (dec!(15000), 30, "Business", Some(dec!(10000))),
            (dec!(5000), 45, "Business", None),
            (dec!(5000), 30, "ab", None),
        ] {
            assert!(matches!(
                LoanApplication::new(amount, term, purpose, max),
                Err(Error::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_application_wire_format() {
        let app = LoanApplication::new(dec!(5000), 7, "Stock", None).unwrap();
        let json = serde_json::to_value(&app).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "amount": 5000.0,
                "term": 7,
                "purpose": "Stock",
                "interestRate": 0.1
            })
        );
    }

    #[test]
    fn test_derive_status() {
        let due = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(derive_status(due, true, due + Duration::days(3)), DueStatus::Paid);
        assert_eq!(
            derive_status(due, false, due + Duration::days(1)),
            DueStatus::Overdue
        );
        assert_eq!(
            derive_status(due, false, due - Duration::days(1)),
            DueStatus::Pending
        );
        assert_eq!(derive_status(due, false, due), DueStatus::Pending);
    }

    #[test]
    fn test_loan_deserialization() {
        let json = r#"{
            "id": "loan-1",
            "userId": "u1",
            "amount": 5000,
            "term": 30,
            "status": "disbursed",
            "interestRate": 0.15,
            "applicationDate": "2026-02-01T08:00:00Z",
            "dueDate": "2026-03-03T08:00:00Z",
            "purpose": "Business"
        }"#;
        let loan: Loan = serde_json::from_str(json).unwrap();
        assert_eq!(loan.status, LoanStatus::Disbursed);
        assert_eq!(loan.interest_rate, dec!(0.15));
        assert!(loan.approval_date.is_none());
        assert_eq!(loan.purpose.as_deref(), Some("Business"));
    }
}
