//! Score Analyzer WASM Module
//!
//! Browser client for the score analysis server. It owns the session state,
//! the paginated notation view, the instrument comparison board, and the
//! AI panel plumbing; JavaScript drives it through the exports in [`api`].

pub mod api;
pub mod client;
pub mod comparison;
pub mod measures;
pub mod models;
pub mod notation;
pub mod panels;
pub mod readiness;
pub mod stats;

// Re-export commonly used types
pub use models::{
    AnalysisReport, AnalysisRequest, AppSettings, ComparisonData, Instrument, NoteEvent,
    PianoRollData, ScoreSummary,
};

use wasm_bindgen::prelude::*;

// This is like the `main` function, but for WASM modules.
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).expect("failed to initialize logger");

    log::info!("Score Analyzer WASM module initialized");
}
