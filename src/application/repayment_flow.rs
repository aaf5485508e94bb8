use crate::config::PollPolicy;
use crate::domain::money::Amount;
use crate::domain::payment_session::{ChargeOutcome, PaymentSession};
use crate::domain::ports::{GatewayRef, LedgerRef};
use crate::domain::repayment::{LoanId, NewRepayment, PaymentMethod, Repayment, RepaymentRequest};
use crate::error::{Error, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const INITIATION_FALLBACK_MESSAGE: &str =
    "Failed to initiate mobile-money payment. Please try again.";

/// Where a flow currently stands, as seen by whoever owns its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Active(PaymentSession),
}

/// Everything the caller needs to show once a repayment went through.
#[derive(Debug, Clone, PartialEq)]
pub struct RepaymentReceipt {
    pub loan_id: LoanId,
    pub amount: Amount,
    pub checkout_request_id: String,
    pub reference: String,
    pub attempts_made: u32,
    pub repayment: Repayment,
}

/// Pushes a mobile-money charge for a repayment and waits for the gateway to
/// confirm it.
///
/// After initiation the gateway is polled on a fixed delay, up to the policy's
/// attempt budget. A confirmed charge is written to the ledger exactly once; a
/// cancelled or unconfirmed one is never written.
#[derive(Clone)]
pub struct RepaymentFlow {
    gateway: GatewayRef,
    ledger: LedgerRef,
    policy: PollPolicy,
}

impl RepaymentFlow {
    pub fn new(gateway: GatewayRef, ledger: LedgerRef, policy: PollPolicy) -> Self {
        Self {
            gateway,
            ledger,
            policy,
        }
    }

    /// Runs the flow to completion on the current task.
    pub async fn run(&self, request: RepaymentRequest) -> Result<RepaymentReceipt> {
        let (state, _) = watch::channel(FlowState::Idle);
        self.drive(&request, &state).await
    }

    /// Runs the flow on its own task. The returned handle owns that task:
    /// dropping it stops polling.
    pub fn spawn(&self, request: RepaymentRequest) -> FlowHandle {
        let (state, receiver) = watch::channel(FlowState::Idle);
        let flow = self.clone();
        let task = tokio::spawn(async move { flow.drive(&request, &state).await });
        FlowHandle {
            state: receiver,
            task,
        }
    }

    async fn drive(
        &self,
        request: &RepaymentRequest,
        state: &watch::Sender<FlowState>,
    ) -> Result<RepaymentReceipt> {
        let account_reference = request.loan_id().payment_reference();
        info!(
            loan_id = %request.loan_id(),
            amount = %request.amount(),
            phone = %request.phone_number(),
            "initiating mobile-money charge"
        );

        let checkout_request_id = self
            .gateway
            .initiate_charge(request.phone_number(), request.amount(), &account_reference)
            .await
            .map_err(initiation_error)?;

        let mut session = PaymentSession::new(checkout_request_id);
        state.send_replace(FlowState::Active(session.clone()));
        debug!(
            checkout_request_id = session.checkout_request_id(),
            "charge initiated, waiting for confirmation"
        );

        while session.attempts_made() < self.policy.max_attempts() {
            tokio::time::sleep(self.policy.interval()).await;
            let attempt = session.record_attempt()?;

            let outcome = match self
                .gateway
                .check_charge_status(session.checkout_request_id())
                .await
            {
                Ok(status) => status.outcome(),
                Err(e) => {
                    let e = match e {
                        Error::TransientPollError(_) => e,
                        other => Error::TransientPollError(other.to_string()),
                    };
                    debug!(attempt, error = %e, "status check failed, will retry");
                    ChargeOutcome::Pending
                }
            };

            match outcome {
                ChargeOutcome::Confirmed { reference } => {
                    session.succeed()?;
                    state.send_replace(FlowState::Active(session.clone()));
                    let reference = reference.unwrap_or_else(|| {
                        warn!(
                            checkout_request_id = session.checkout_request_id(),
                            "confirmed charge carried no transaction reference"
                        );
                        session.checkout_request_id().to_string()
                    });
                    return self.record(request, &session, reference).await;
                }
                ChargeOutcome::Cancelled => {
                    session.fail()?;
                    state.send_replace(FlowState::Active(session.clone()));
                    info!(
                        checkout_request_id = session.checkout_request_id(),
                        "payment prompt cancelled by customer"
                    );
                    return Err(Error::UserCancelled);
                }
                ChargeOutcome::Pending => {
                    state.send_replace(FlowState::Active(session.clone()));
                }
            }
        }

        session.time_out()?;
        state.send_replace(FlowState::Active(session.clone()));
        warn!(
            checkout_request_id = session.checkout_request_id(),
            attempts = session.attempts_made(),
            "no confirmation within the attempt budget"
        );
        Err(Error::TimedOut)
    }

    async fn record(
        &self,
        request: &RepaymentRequest,
        session: &PaymentSession,
        reference: String,
    ) -> Result<RepaymentReceipt> {
        let new_repayment = NewRepayment {
            loan_id: request.loan_id().clone(),
            amount: request.amount(),
            method: PaymentMethod::MobileMoney,
            reference: reference.clone(),
        };

        let repayment = self
            .ledger
            .record_repayment(new_repayment, session.checkout_request_id())
            .await
            .map_err(|e| Error::RecordingFailed {
                reference: reference.clone(),
                reason: e.to_string(),
            })?;

        info!(
            loan_id = %request.loan_id(),
            reference = %reference,
            attempts = session.attempts_made(),
            "repayment recorded"
        );

        Ok(RepaymentReceipt {
            loan_id: request.loan_id().clone(),
            amount: request.amount(),
            checkout_request_id: session.checkout_request_id().to_string(),
            reference,
            attempts_made: session.attempts_made(),
            repayment,
        })
    }
}

fn initiation_error(error: Error) -> Error {
    let message = match error {
        Error::ApiError { message, .. } if !message.trim().is_empty() => message,
        Error::ValidationError(message) | Error::InitiationError(message) => message,
        other => {
            warn!(error = %other, "charge initiation failed");
            INITIATION_FALLBACK_MESSAGE.to_string()
        }
    };
    Error::InitiationError(message)
}

/// Owner of a spawned [`RepaymentFlow`].
///
/// Dropping the handle aborts the flow's task, which cancels any pending poll
/// timer.
pub struct FlowHandle {
    state: watch::Receiver<FlowState>,
    task: JoinHandle<Result<RepaymentReceipt>>,
}

impl FlowHandle {
    pub fn state(&self) -> FlowState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.clone()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub async fn outcome(mut self) -> Result<RepaymentReceipt> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::FlowAborted("cancelled".to_string())),
            Err(e) => Err(Error::FlowAborted(e.to_string())),
        }
    }
}

impl Drop for FlowHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
