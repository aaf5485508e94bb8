use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Gateway result code for a completed charge.
pub const RESULT_CODE_SUCCESS: &str = "0";
/// Gateway result code for a prompt the customer dismissed.
pub const RESULT_CODE_CANCELLED: &str = "1032";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Processing,
    Success,
    Failed,
    TimedOut,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Processing)
    }
}

/// What a single status check told us about the charge.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ChargeOutcome {
    Confirmed { reference: Option<String> },
    Cancelled,
    Pending,
}

/// Raw status returned by the gateway for an initiated charge.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ChargeStatus {
    pub result_code: String,
    pub result_description: Option<String>,
    pub transaction_reference: Option<String>,
}

impl ChargeStatus {
    pub fn outcome(&self) -> ChargeOutcome {
        match self.result_code.trim() {
            RESULT_CODE_SUCCESS => ChargeOutcome::Confirmed {
                reference: self.transaction_reference.clone(),
            },
            RESULT_CODE_CANCELLED => ChargeOutcome::Cancelled,
            _ => ChargeOutcome::Pending,
        }
    }
}

/// State of one initiated charge while its outcome is being confirmed.
///
/// Status only ever moves forward, from `Processing` to one of the terminal
/// states. Every mutation on a resolved session is rejected and leaves it
/// untouched.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PaymentSession {
    checkout_request_id: String,
    status: SessionStatus,
    attempts_made: u32,
}

impl PaymentSession {
    pub fn new(checkout_request_id: impl Into<String>) -> Self {
        Self {
            checkout_request_id: checkout_request_id.into(),
            status: SessionStatus::Processing,
            attempts_made: 0,
        }
    }

    pub fn checkout_request_id(&self) -> &str {
        &self.checkout_request_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }

    /// Counts one status check against the attempt budget.
    pub fn record_attempt(&mut self) -> Result<u32> {
        self.ensure_processing("record an attempt")?;
        self.attempts_made += 1;
        Ok(self.attempts_made)
    }

    pub fn succeed(&mut self) -> Result<()> {
        self.resolve(SessionStatus::Success)
    }

    pub fn fail(&mut self) -> Result<()> {
        self.resolve(SessionStatus::Failed)
    }

    pub fn time_out(&mut self) -> Result<()> {
        self.resolve(SessionStatus::TimedOut)
    }

    fn resolve(&mut self, status: SessionStatus) -> Result<()> {
        self.ensure_processing(&format!("move to {status:?}"))?;
        self.status = status;
        Ok(())
    }

    fn ensure_processing(&self, action: &str) -> Result<()> {
        if self.is_resolved() {
            return Err(Error::InvalidTransition(format!(
                "cannot {action}: session {} is already {:?}",
                self.checkout_request_id, self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: &str, reference: Option<&str>) -> ChargeStatus {
        ChargeStatus {
            result_code: code.to_string(),
            result_description: None,
            transaction_reference: reference.map(str::to_string),
        }
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(
            status("0", Some("QAX123")).outcome(),
            ChargeOutcome::Confirmed {
                reference: Some("QAX123".to_string())
            }
        );
        assert_eq!(status("1032", None).outcome(), ChargeOutcome::Cancelled);
        assert_eq!(status("1037", None).outcome(), ChargeOutcome::Pending);
        assert_eq!(status("", None).outcome(), ChargeOutcome::Pending);
        assert_eq!(status("00", None).outcome(), ChargeOutcome::Pending);
    }

    #[test]
    fn test_new_session_is_processing() {
        let session = PaymentSession::new("abc123");
        assert_eq!(session.status(), SessionStatus::Processing);
        assert_eq!(session.attempts_made(), 0);
        assert!(!session.is_resolved());
    }

    #[test]
    fn test_attempts_are_counted() {
        let mut session = PaymentSession::new("abc123");
        assert_eq!(session.record_attempt().unwrap(), 1);
        assert_eq!(session.record_attempt().unwrap(), 2);
        assert_eq!(session.attempts_made(), 2);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut succeeded = PaymentSession::new("a");
        succeeded.succeed().unwrap();

        let mut failed = PaymentSession::new("b");
        failed.fail().unwrap();

        let mut timed_out = PaymentSession::new("c");
        timed_out.time_out().unwrap();

        for session in [&mut succeeded, &mut failed, &mut timed_out] {
            let before = session.clone();
            assert!(matches!(session.succeed(), Err(Error::InvalidTransition(_))));
            assert!(matches!(session.fail(), Err(Error::InvalidTransition(_))));
            assert!(matches!(session.time_out(), Err(Error::InvalidTransition(_))));
            assert!(matches!(
                session.record_attempt(),
                Err(Error::InvalidTransition(_))
            ));
            assert_eq!(*session, before);
        }
    }
}
