//! # Runtime
//!
//! Wiring between the Kubernetes watch machinery and the reconciler.
//!
//! ## Module Structure
//!
//! - `initialization.rs` - Crypto provider, logging, metrics, HTTP server, client
//! - `predicates.rs` - Which watch events reach the reconciler
//! - `watch_loop.rs` - Controller with its secondary watches
//! - `error_policy.rs` - Per-resource backoff for failed reconciliations

pub mod error_policy;
pub mod initialization;
pub mod predicates;
pub mod watch_loop;
