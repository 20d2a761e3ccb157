//! Staff symbols for the fallback engine
//!
//! Converts one measure bucket into the renderable symbol list the
//! simplified engine draws: the measure's notes in order, then greedy rest
//! padding toward the measure length, all truncated at a fixed symbol
//! budget.

use serde::{Deserialize, Serialize};

use crate::measures::Measure;
use crate::models::NoteEvent;

/// Hard cap on renderable symbols in one measure. Notes beyond it, and any
/// rest padding that will not fit, are dropped.
pub const MAX_SYMBOLS_PER_MEASURE: usize = 8;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Rest denominations tried largest-first when padding a measure
const REST_STEPS: [(f64, &str); 3] = [(4.0, "1"), (2.0, "h"), (1.0, "q")];

const DURATION_EPS: f64 = 1e-3;

/// `{step}/{octave}` staff key for a MIDI pitch, sharp spellings.
pub fn midi_to_staff_key(midi: u8) -> String {
    let octave = (midi / 12) as i32 - 1;
    format!("{}/{}", NOTE_NAMES[(midi % 12) as usize], octave)
}

/// Plain `C4`-style label for notes the backend sent without a name.
pub fn pitch_name(midi: u8) -> String {
    let octave = (midi / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(midi % 12) as usize], octave)
}

/// Engine duration code for a beat length.
///
/// Values outside the table fall back to a quarter; the simplified engine
/// has no tuplet or tie support.
pub fn duration_code(beats: f64) -> &'static str {
    const TABLE: [(f64, &str); 7] = [
        (4.0, "1"),
        (2.0, "h"),
        (1.0, "q"),
        (0.5, "8"),
        (0.25, "16"),
        (1.5, "qd"),
        (0.75, "8d"),
    ];
    for (length, code) in TABLE {
        if (beats - length).abs() < DURATION_EPS {
            return code;
        }
    }
    "q"
}

/// One renderable staff symbol
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StaffSymbol {
    /// `{step}/{octave}` staff position; rests sit on the middle line
    pub key: String,
    /// Duration code: "1", "h", "q", "8", "16", "qd" or "8d"
    pub duration: String,
    pub rest: bool,
}

impl StaffSymbol {
    pub fn note(event: &NoteEvent) -> Self {
        Self {
            key: midi_to_staff_key(event.pitch),
            duration: duration_code(event.duration).to_string(),
            rest: false,
        }
    }

    pub fn rest(code: &str) -> Self {
        Self {
            key: "B/4".to_string(),
            duration: code.to_string(),
            rest: true,
        }
    }
}

/// Symbol list for one measure: notes in input order, then rests covering
/// the unfilled remainder (whole, then half, then quarter).
///
/// Sub-quarter remainders and anything past [`MAX_SYMBOLS_PER_MEASURE`] are
/// silently dropped.
pub fn measure_symbols(measure: &Measure, beats_per_measure: f64) -> Vec<StaffSymbol> {
    let mut symbols: Vec<StaffSymbol> = measure.notes.iter().map(StaffSymbol::note).collect();

    let filled: f64 = measure.notes.iter().map(|n| n.duration).sum();
    let mut remainder = beats_per_measure - filled;
    for (size, code) in REST_STEPS {
        while remainder >= size - DURATION_EPS && symbols.len() < MAX_SYMBOLS_PER_MEASURE {
            symbols.push(StaffSymbol::rest(code));
            remainder -= size;
        }
    }

    symbols.truncate(MAX_SYMBOLS_PER_MEASURE);
    symbols
}
