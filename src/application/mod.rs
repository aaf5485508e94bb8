//! Application layer orchestrating the repayment use case.
//!
//! `RepaymentFlow` drives a mobile-money charge from initiation to a confirmed
//! (or abandoned) outcome using only the domain ports, so it runs the same
//! against the live backend and against in-memory adapters.

pub mod repayment_flow;
