//! # Custom Resource Definitions
//!
//! CRD types for the BTP manager.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `BtpOperator` resource
//! - `status.rs` - Lifecycle state and conditions

mod spec;
mod status;

pub use spec::{BtpOperator, BtpOperatorSpec};
pub use status::{BtpOperatorStatus, Condition, State, READY_CONDITION_TYPE};
