//! # Reconciler
//!
//! The BtpOperator state machine.
//!
//! ## Module Structure
//!
//! - `types.rs` - Reconciler context and errors
//! - `status.rs` - Condition reasons and the single status write path
//! - `validation.rs` - Credential Secret verification
//! - `reconcile.rs` - Entry point and state dispatch
//! - `deleting.rs` - Deprovisioning sequence for the Deleting state

mod deleting;
mod reconcile;
mod status;
mod types;
mod validation;

pub use reconcile::{oldest_operator, reconcile, reconcile_operator};
pub use status::{apply_transition, set_condition, Reason};
pub use types::{BackoffState, Reconciler, ReconcilerError};
pub use validation::{get_and_verify_required_secret, verify_secret, SecretProblem};
