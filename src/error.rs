//! Error handling for decompression operations
//!
//! This module defines the error types used throughout the crate.
//! It uses thiserror for ergonomic error handling and provides context-specific
//! error variants, including per-entry context for ROM rebuilds.

pub use crate::common::Result;
pub use crate::common::Z64Error;
