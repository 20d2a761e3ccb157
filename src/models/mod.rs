//! Data models for the score analyzer client
//!
//! Wire shapes received from the analysis backend plus the client-side
//! configuration blob. Everything here is plain serde data; behavior lives
//! in the view and coordinator modules.

pub mod note;
pub mod report;
pub mod settings;

// Re-export commonly used types
pub use note::{ComparisonData, Instrument, NoteEvent, PianoRollData};
pub use report::{
    AnalysisReport, AnalysisRequest, ChordMeasure, GeneralInfo, HarmonicReport, MelodicReport,
    RhythmReport, ScoreSummary,
};
pub use settings::{Agent, AppSettings, ChatProfile, PromptKind, SettingsStore};
