//! Score metadata and analysis report payloads
//!
//! Typed shapes for the `/upload` and `/analyze` responses. The backend may
//! omit whole sections depending on the request's capability flags, so most
//! report fields are optional or defaulted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::note::default_measure_beats;

/// Metadata returned by `POST /upload`.
///
/// `file_path` is the server-side handle every follow-up request carries;
/// `total_measures` and `measure_duration_beats` seed the notation view.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScoreSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub total_instruments: usize,
    #[serde(default)]
    pub instrument_names: Vec<String>,
    #[serde(default)]
    pub overall_key: String,
    #[serde(default)]
    pub total_measures: u32,
    #[serde(default)]
    pub time_signatures: Vec<String>,
    #[serde(default)]
    pub first_time_signature: String,
    #[serde(default = "default_measure_beats")]
    pub measure_duration_beats: f64,
    pub file_path: String,
}

/// Request body for `POST /analyze`.
///
/// The boolean flags are capability switches: the backend only computes (and
/// only returns) the sections that were asked for.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalysisRequest {
    pub file_path: String,
    /// Part indices feeding the harmonic reduction
    pub harmonic_parts: Vec<usize>,
    pub analyze_intervals: bool,
    pub analyze_direction: bool,
    pub analyze_rhythm: bool,
}

/// Full report returned by `POST /analyze`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct AnalysisReport {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub general_info: GeneralInfo,
    /// Keyed by instrument name
    #[serde(default)]
    pub melodic_analysis: BTreeMap<String, MelodicReport>,
    #[serde(default)]
    pub harmonic_analysis: HarmonicReport,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct GeneralInfo {
    #[serde(default)]
    pub total_instruments: usize,
    #[serde(default)]
    pub instrument_names: Vec<String>,
    #[serde(default)]
    pub overall_key: String,
    #[serde(default)]
    pub total_measures: u32,
    #[serde(default)]
    pub time_signatures: Vec<String>,
    #[serde(default)]
    pub first_time_signature: String,
    #[serde(default)]
    pub measure_duration_beats: f64,
    /// Note counts keyed by instrument name
    #[serde(default)]
    pub notes_per_instrument: BTreeMap<String, u32>,
}

/// Per-instrument melodic section; every field is flag-dependent
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct MelodicReport {
    /// Interval name -> occurrence count
    #[serde(default)]
    pub intervals: BTreeMap<String, u32>,
    #[serde(default)]
    pub ascending: u32,
    #[serde(default)]
    pub descending: u32,
    #[serde(default)]
    pub mean_direction: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<RhythmReport>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct RhythmReport {
    /// Rhythmic value name -> occurrence count
    #[serde(default)]
    pub values: BTreeMap<String, u32>,
    /// Notes per measure
    #[serde(default)]
    pub density: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct HarmonicReport {
    #[serde(default)]
    pub selected_instruments: Vec<String>,
    #[serde(default)]
    pub reduction_key: String,
    #[serde(default)]
    pub chord_report: Vec<ChordMeasure>,
}

/// One measure of the harmonic reduction
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChordMeasure {
    /// 1-indexed measure number
    pub measure: u32,
    pub chords: Vec<String>,
    pub tonal_functions: Vec<String>,
}
