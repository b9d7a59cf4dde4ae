//! Types for handling secret material.
//!
//! The root API token and every minted API key token pass through
//! [`SecretString`] so they never reach logs, `Debug` output or HTTP error
//! bodies by accident.

pub mod types;

pub use types::SecretString;
