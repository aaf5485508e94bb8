use crate::domain::loan::{
    CreditScore, DashboardStats, DueStatus, FactorImpact, Loan, LoanQuote, LoanStatus,
    derive_status,
};
use crate::domain::repayment::{PaymentMethod, Repayment, RepaymentStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct LoanRow<'a> {
    id: &'a str,
    amount: Decimal,
    term: u32,
    status: LoanStatus,
    interest_rate: Decimal,
    due_date: Option<DateTime<Utc>>,
    standing: Option<DueStatus>,
}

#[derive(Serialize)]
struct RepaymentRow<'a> {
    id: &'a str,
    loan_id: &'a str,
    amount: Decimal,
    date: DateTime<Utc>,
    method: PaymentMethod,
    status: RepaymentStatus,
    reference: Option<&'a str>,
}

#[derive(Serialize)]
struct ScoreRow {
    score: u32,
    max_loan_amount: Decimal,
    last_updated: DateTime<Utc>,
}

#[derive(Serialize)]
struct FactorRow<'a> {
    factor: &'a str,
    impact: FactorImpact,
    description: &'a str,
}

#[derive(Serialize)]
struct DashboardRow {
    active_loans: u32,
    total_borrowed: Decimal,
    total_repaid: Decimal,
    available_credit: Decimal,
    repayments_due: usize,
}

/// Writes account data as CSV, one table per call.
///
/// The underlying writer is flexible so a credit score and its factors can
/// share one output stream.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(sink);
        Self { writer }
    }

    /// Loans with their repayment standing as of `today`.
    pub fn write_loans(&mut self, loans: &[Loan], today: DateTime<Utc>) -> Result<()> {
        for loan in loans {
            let standing = loan
                .due_date
                .filter(|_| matches!(
                    loan.status,
                    LoanStatus::Disbursed | LoanStatus::Overdue | LoanStatus::Paid
                ))
                .map(|due| derive_status(due, loan.status == LoanStatus::Paid, today));
            self.writer.serialize(LoanRow {
                id: loan.id.as_str(),
                amount: loan.amount,
                term: loan.term,
                status: loan.status,
                interest_rate: loan.interest_rate,
                due_date: loan.due_date,
                standing,
            })?;
        }
        self.flush()
    }

    pub fn write_repayments(&mut self, repayments: &[Repayment]) -> Result<()> {
        for repayment in repayments {
            self.writer.serialize(RepaymentRow {
                id: &repayment.id,
                loan_id: repayment.loan_id.as_str(),
                amount: repayment.amount,
                date: repayment.date,
                method: repayment.method,
                status: repayment.status,
                reference: repayment.reference.as_deref(),
            })?;
        }
        self.flush()
    }

    pub fn write_credit_score(&mut self, score: &CreditScore) -> Result<()> {
        self.writer.serialize(ScoreRow {
            score: score.score,
            max_loan_amount: score.max_loan_amount,
            last_updated: score.last_updated,
        })?;
        if !score.factors.is_empty() {
            self.writer.write_record(["factor", "impact", "description"])?;
            for factor in &score.factors {
                self.writer.serialize(FactorRow {
                    factor: &factor.name,
                    impact: factor.impact,
                    description: &factor.description,
                })?;
            }
        }
        self.flush()
    }

    pub fn write_dashboard(&mut self, stats: &DashboardStats) -> Result<()> {
        self.writer.serialize(DashboardRow {
            active_loans: stats.active_loans,
            total_borrowed: stats.total_borrowed,
            total_repaid: stats.total_repaid,
            available_credit: stats.available_credit,
            repayments_due: stats.repayments_due.len(),
        })?;
        self.flush()
    }

    pub fn write_quote(&mut self, quote: &LoanQuote) -> Result<()> {
        self.writer.serialize(quote)?;
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
