//! Note and instrument data as delivered by the analysis backend
//!
//! These are the wire shapes shared by the piano-roll, comparison, and
//! notation views. They are read-only once received: the view layer derives
//! from them but never mutates them.

use serde::{Deserialize, Serialize};

/// One timed note inside an instrument part.
///
/// `start` and `duration` are in beats from the score origin
/// (quarter-note-equivalent). The comparison endpoint names the start field
/// `start_time`; the alias lets both payloads land in the same struct.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NoteEvent {
    /// MIDI pitch number (0-127)
    pub pitch: u8,

    /// Onset in beats from the start of the score
    #[serde(alias = "start_time")]
    pub start: f64,

    /// Length in beats, expected > 0 (zero-length notes are tolerated and
    /// widened at draw time)
    pub duration: f64,

    /// MIDI velocity; the comparison endpoint omits it
    #[serde(default = "default_velocity")]
    pub velocity: u8,

    /// Display label, e.g. "C4"
    #[serde(default)]
    pub name: String,
}

fn default_velocity() -> u8 {
    64
}

impl NoteEvent {
    pub fn new(pitch: u8, start: f64, duration: f64) -> Self {
        Self {
            pitch,
            start,
            duration,
            velocity: default_velocity(),
            name: String::new(),
        }
    }

    /// End of the note in beats
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// One instrument part with its full note list.
///
/// `index` is the backend's stable part identity; the piano-roll endpoint
/// omits it (array position is the identity there), so payloads are
/// normalized after deserialization.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Instrument {
    #[serde(default)]
    pub index: usize,
    pub name: String,
    #[serde(default)]
    pub notes: Vec<NoteEvent>,
}

/// Payload of `POST /api/piano_roll`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PianoRollData {
    pub instruments: Vec<Instrument>,
}

impl PianoRollData {
    /// Fill in missing part indices from array position.
    ///
    /// The piano-roll endpoint serializes instruments without an `index`
    /// field, which deserializes as 0 for every part.
    pub fn normalize(mut self) -> Self {
        for (pos, instrument) in self.instruments.iter_mut().enumerate() {
            if instrument.index == 0 {
                instrument.index = pos;
            }
        }
        self
    }
}

/// Payload of `POST /comparison_data`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ComparisonData {
    pub instruments: Vec<Instrument>,
    #[serde(default = "default_measure_beats")]
    pub measure_duration_beats: f64,
}

impl ComparisonData {
    /// Fill in missing part indices from array position, as
    /// [`PianoRollData::normalize`] does.
    pub fn normalize(mut self) -> Self {
        for (pos, instrument) in self.instruments.iter_mut().enumerate() {
            if instrument.index == 0 {
                instrument.index = pos;
            }
        }
        self
    }
}

pub(crate) fn default_measure_beats() -> f64 {
    4.0
}
