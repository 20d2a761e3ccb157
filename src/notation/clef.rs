//! Clef selection for the notation view
//!
//! Picks a clef from the pitch content of the currently windowed notes.
//! This is an approximation (real engraving would consider instrument
//! transposition and range splits) but it keeps low parts readable.

use serde::{Deserialize, Serialize};

use crate::models::NoteEvent;

/// Mean MIDI pitches below this render in bass clef
const BASS_CLEF_THRESHOLD: f64 = 55.0;

/// Staff clef for one rendered window
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Clef {
    Treble,
    Bass,
}

impl Clef {
    pub fn as_str(&self) -> &'static str {
        match self {
            Clef::Treble => "treble",
            Clef::Bass => "bass",
        }
    }
}

/// Choose a clef from the arithmetic mean MIDI pitch of `notes`.
///
/// Mean strictly below 55 goes to bass; exactly 55 and above stays treble.
/// An empty window defaults to treble.
pub fn choose_clef(notes: &[NoteEvent]) -> Clef {
    if notes.is_empty() {
        return Clef::Treble;
    }
    let sum: f64 = notes.iter().map(|n| n.pitch as f64).sum();
    let mean = sum / notes.len() as f64;
    if mean < BASS_CLEF_THRESHOLD {
        Clef::Bass
    } else {
        Clef::Treble
    }
}
