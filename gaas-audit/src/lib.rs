//! Audit trail for the governance runtime.
//!
//! Two sinks live here: an append-only [`AuditJournal`] of [`AuditEvent`]s for
//! external consumers, and the in-memory [`HistoryLedger`] of enforcement
//! decisions that compliance reports are computed from. The [`rows`] module
//! defines the flat export rows read by offline analysis tooling.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod event;
pub mod journal;
pub mod ledger;
pub mod rows;

pub use error::{AuditError, AuditResult};
pub use event::{AuditEvent, AuditRecord};
pub use journal::{AuditJournal, FileJournal, MemoryJournal};
pub use ledger::{HistoryLedger, LedgerConfig, LedgerStats};
pub use rows::{ActionLogRow, AgentMetricsRow, DecisionRow};
