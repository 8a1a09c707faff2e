//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     root token cancelled
//!         → live stream sessions end (child tokens)
//!         → servers stop accepting
//!         → open connections drain, bounded by the grace period
//! ```
//!
//! # Design Decisions
//! - One cancellation tree for the whole process
//! - Shutdown has a deadline: connections still open after the grace
//!   period are dropped

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
