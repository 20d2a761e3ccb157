//! Render plans and the engine seam
//!
//! The view never draws: it emits a serializable [`RenderPlan`] that the
//! host page's engine adapter turns into notation. Completions come back
//! tagged with the plan's token, so a plan that was superseded while in
//! flight is detectable and discarded.

use serde::{Deserialize, Serialize};

use crate::measures::Measure;
use crate::notation::clef::Clef;
use crate::notation::glyphs::{measure_symbols, StaffSymbol};

/// The two rendering backends
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Engraving-grade engine fed MusicXML fetched per window
    HighFidelity,
    /// Simplified glyph renderer driven by [`RenderPlan::measures`]
    Fallback,
}

impl EngineKind {
    /// Parse the wire name used across the JS boundary.
    pub fn parse(name: &str) -> Option<EngineKind> {
        match name {
            "high_fidelity" => Some(EngineKind::HighFidelity),
            "fallback" => Some(EngineKind::Fallback),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            EngineKind::HighFidelity => "high_fidelity",
            EngineKind::Fallback => "fallback",
        }
    }

    /// Name of the externally loaded library backing this engine; used as
    /// the readiness-gate label.
    pub fn library_name(&self) -> &'static str {
        match self {
            EngineKind::HighFidelity => "OpenSheetMusicDisplay",
            EngineKind::Fallback => "VexFlow",
        }
    }

    /// The engine tried next when this one is unavailable.
    pub fn alternate(&self) -> EngineKind {
        match self {
            EngineKind::HighFidelity => EngineKind::Fallback,
            EngineKind::Fallback => EngineKind::HighFidelity,
        }
    }
}

/// Symbol row for one measure of the fallback engine
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MeasurePlan {
    pub number: u32,
    pub symbols: Vec<StaffSymbol>,
}

impl MeasurePlan {
    pub fn from_measure(measure: &Measure, beats_per_measure: f64) -> Self {
        Self {
            number: measure.number,
            symbols: measure_symbols(measure, beats_per_measure),
        }
    }
}

/// One render invocation.
///
/// `token` is the monotonic sequence number tying this plan to the window
/// it was built for; the adapter echoes it back on completion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RenderPlan {
    pub token: u32,
    pub engine: EngineKind,
    pub instrument_name: String,
    pub clef: Clef,
    pub window_start: u32,
    pub window_end: u32,
    pub total_measures: u32,
    pub beats_per_measure: f64,
    /// One row per measure in the window (fallback engine input)
    pub measures: Vec<MeasurePlan>,
    /// Score markup for the high-fidelity engine, attached after the
    /// windowed MusicXML fetch completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub musicxml: Option<String>,
}

impl RenderPlan {
    pub fn with_musicxml(mut self, musicxml: String) -> Self {
        self.musicxml = Some(musicxml);
        self
    }

    /// Total renderable symbols across the window (diagnostic)
    pub fn symbol_count(&self) -> usize {
        self.measures.iter().map(|m| m.symbols.len()).sum()
    }
}

/// Check that fetched score markup is well-formed MusicXML before it is
/// handed to the high-fidelity engine, which fails opaquely on bad input.
pub fn validate_markup(xml: &str) -> Result<(), String> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| format!("markup not parseable: {}", e))?;
    let root = doc.root_element().tag_name().name().to_string();
    if root == "score-partwise" || root == "score-timewise" {
        Ok(())
    } else {
        Err(format!("unexpected markup root element <{}>", root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteEvent;

    #[test]
    fn engine_names_round_trip() {
        assert_eq!(EngineKind::parse("high_fidelity"), Some(EngineKind::HighFidelity));
        assert_eq!(EngineKind::parse("fallback"), Some(EngineKind::Fallback));
        assert_eq!(EngineKind::parse("canvas"), None);
        assert_eq!(EngineKind::HighFidelity.wire_name(), "high_fidelity");
    }

    #[test]
    fn each_engine_names_its_library() {
        assert_eq!(EngineKind::HighFidelity.library_name(), "OpenSheetMusicDisplay");
        assert_eq!(EngineKind::Fallback.library_name(), "VexFlow");
        assert_eq!(EngineKind::HighFidelity.alternate(), EngineKind::Fallback);
        assert_eq!(EngineKind::Fallback.alternate(), EngineKind::HighFidelity);
    }

    #[test]
    fn measure_plans_carry_the_symbol_rows() {
        let measure = Measure {
            number: 2,
            notes: vec![NoteEvent::new(60, 4.0, 2.0), NoteEvent::new(64, 6.0, 2.0)],
            start_beat: 4.0,
            end_beat: 8.0,
        };
        let plan = MeasurePlan::from_measure(&measure, 4.0);
        assert_eq!(plan.number, 2);
        assert_eq!(plan.symbols.len(), 2);
        assert!(!plan.symbols[0].rest);
    }

    #[test]
    fn partwise_markup_passes_validation() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="3.1"><part-list/><part id="P1"/></score-partwise>"#;
        assert!(validate_markup(xml).is_ok());
    }

    #[test]
    fn non_score_markup_is_rejected() {
        assert!(validate_markup("<html><body/></html>")
            .unwrap_err()
            .contains("unexpected markup root"));
        assert!(validate_markup("not xml at all").is_err());
    }
}
