//! Concurrency guards and the sync controller.
//!
//! - [`generation`]: tickets for discarding stale results
//! - [`flight`]: single-flight slots and busy flags
//! - [`controller`]: the [`SyncController`] that sequences remote calls
//!   against the local stores

pub mod controller;
pub mod flight;
pub mod generation;

pub use controller::{LoadOutcome, SendOutcome, SyncController, SyncStatus, TitleEdit};
pub use flight::{Busy, FlightGuard, SingleFlight};
pub use generation::{Generation, Ticket};
