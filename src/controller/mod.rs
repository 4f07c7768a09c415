//! # Controller
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `reconciler`: The BtpOperator state machine

pub mod backoff;
pub mod reconciler;
