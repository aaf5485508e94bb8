//! Domain types for loans, repayments and mobile-money payment sessions,
//! plus the ports the application layer talks to.

pub mod loan;
pub mod money;
pub mod payment_session;
pub mod phone;
pub mod ports;
pub mod repayment;
pub mod session;
pub mod user;
