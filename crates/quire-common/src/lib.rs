//! # Quire Common
//!
//! Shared types, errors, and constants used across Quire components.
//!
//! ## Modules
//! - `types` - Core data structures (Purpose, IssuedChallenge, SweepReport, etc.)
//! - `error` - The user-facing error taxonomy
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod types;

pub use error::QuireError;
pub use types::*;
