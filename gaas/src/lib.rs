//! Governance-as-a-Service runtime facade.
//!
//! Bundles the governance crates behind feature flags: policies and
//! enforcement are always present; the kernel, audit sinks, reporting,
//! configuration and telemetry can be switched off by downstream users.

#![warn(missing_docs, clippy::pedantic)]

/// Identifiers, actions and registrations.
pub use gaas_primitives as primitives;

/// Versioned policies and rule evaluation.
pub use gaas_policy as policy;

/// Enforcement decisions and per-agent compliance state.
pub use gaas_enforcement as enforcement;

/// Compliance reporting (enabled by `compliance` feature).
#[cfg(feature = "compliance")]
pub use gaas_compliance as compliance;

/// Audit journal, decision ledger and export rows (enabled by `audit` feature).
#[cfg(feature = "audit")]
pub use gaas_audit as audit;

/// Governance operations (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use gaas_kernel as kernel;

/// Layered configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use gaas_config as config;

/// Log subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use gaas_telemetry as telemetry;

#[cfg(feature = "config")]
mod bootstrap;

#[cfg(feature = "config")]
pub use bootstrap::bootstrap;
