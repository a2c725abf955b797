//! rollcall-engine — Identity enrollment and attendance recording.
//!
//! Ties the rollcall-core pipeline to durable state: a JSON-blob
//! encoding store, a SQLite attendance ledger with bucketed dedup, and
//! the Idle/Active session gate that decides whether recognitions become
//! records.

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod session;
pub mod store;

pub use config::Config;
pub use engine::{Engine, FaceScan};
pub use error::EngineError;
pub use ledger::{AttendanceRow, AttendanceSummary, Ledger, StudentRow};
pub use session::{SessionGate, SessionState};
pub use store::EncodingStore;
