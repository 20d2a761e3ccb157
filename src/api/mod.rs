//! Score Analyzer WASM API
//!
//! This module provides the JavaScript-facing API for the score analyzer.
//! It includes shared utilities for serialization, error handling, and
//! logging, as well as the exported API functions.
//!
//! # Module Structure
//!
//! - `helpers`: Shared utilities for serialization, error handling, and logging
//! - `core`: The exported API functions and the WASM-owned state behind them

pub mod helpers;
pub mod core;

pub use core::*;
