use microloan::application::repayment_flow::RepaymentFlow;
use microloan::config::PollPolicy;
use microloan::domain::ports::{GatewayRef, LedgerRef};
use microloan::domain::repayment::RepaymentRequest;
use microloan::infrastructure::in_memory::{InMemoryLedger, ScriptedGateway};
use rust_decimal_macros::dec;
use std::sync::Arc;

pub fn flow(gateway: &ScriptedGateway, ledger: &InMemoryLedger) -> RepaymentFlow {
    let gateway: GatewayRef = Arc::new(gateway.clone());
    let ledger: LedgerRef = Arc::new(ledger.clone());
    RepaymentFlow::new(gateway, ledger, PollPolicy::default())
}

pub fn request() -> RepaymentRequest {
    RepaymentRequest::new("loan-42", dec!(500), "0712345678").unwrap()
}
