//! # pii-compliance
//!
//! Personal data protection and consent compliance engine.
//!
//! This crate encrypts PII at rest, hashes searchable identifiers, keeps a
//! per-purpose consent ledger, audits every access to regulated data, and
//! resolves data-subject requests (export, erasure) against live retention
//! obligations. A companion log keeps hashed communication metadata for the
//! mandated retention window and sweeps it afterwards.

pub mod compliance;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod repository;

pub use compliance::ComplianceEngine;
pub use config::{ComplianceConfig, ConfigLoader};
pub use error::{Error, Result};
