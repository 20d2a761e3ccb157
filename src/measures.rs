//! Measure bucketing over flat note lists
//!
//! Pure derivation: a flat note list plus a beats-per-measure constant
//! becomes a 1-indexed sequence of measure buckets. The buckets are
//! recomputed whenever the source notes or the beats-per-measure value
//! change, never mutated in place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::NoteEvent;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum MeasureError {
    #[error("beats per measure must be positive, got {0}")]
    InvalidBeatsPerMeasure(f64),
}

/// One derived measure bucket. `notes` preserves the input order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Measure {
    /// 1-indexed measure number
    pub number: u32,
    pub notes: Vec<NoteEvent>,
    /// First beat covered by this measure (inclusive)
    pub start_beat: f64,
    /// One past the last covered beat (exclusive)
    pub end_beat: f64,
}

impl Measure {
    /// A bucket for a measure that has no notes.
    pub fn empty(number: u32, beats_per_measure: f64) -> Self {
        Self {
            number,
            notes: Vec::new(),
            start_beat: (number - 1) as f64 * beats_per_measure,
            end_beat: number as f64 * beats_per_measure,
        }
    }
}

/// Measure number owning a note onset: `floor(start / beatsPerMeasure) + 1`.
///
/// Onsets before the score origin land in measure 1 so the 1-indexed
/// invariant holds for any input.
pub fn measure_of(start: f64, beats_per_measure: f64) -> u32 {
    let index = (start / beats_per_measure).floor();
    if index < 0.0 {
        1
    } else {
        index as u32 + 1
    }
}

/// Bucket notes into measures, sorted ascending by number.
///
/// Measures without notes are not emitted here; [`measures_in_window`] fills
/// them back in when a display range needs gap-free buckets.
pub fn group_by_measure(
    notes: &[NoteEvent],
    beats_per_measure: f64,
) -> Result<Vec<Measure>, MeasureError> {
    // `!(x > 0.0)` also rejects NaN
    if !(beats_per_measure > 0.0) {
        return Err(MeasureError::InvalidBeatsPerMeasure(beats_per_measure));
    }
    if notes.is_empty() {
        return Ok(Vec::new());
    }

    let mut buckets: BTreeMap<u32, Vec<NoteEvent>> = BTreeMap::new();
    for note in notes {
        buckets
            .entry(measure_of(note.start, beats_per_measure))
            .or_default()
            .push(note.clone());
    }

    Ok(buckets
        .into_iter()
        .map(|(number, notes)| Measure {
            number,
            notes,
            start_beat: (number - 1) as f64 * beats_per_measure,
            end_beat: number as f64 * beats_per_measure,
        })
        .collect())
}

/// Buckets for every measure number in `[start, end]`, inserting empty
/// buckets where the grouping produced none. The caller guarantees
/// `1 <= start <= end`.
pub fn measures_in_window(
    measures: &[Measure],
    start: u32,
    end: u32,
    beats_per_measure: f64,
) -> Vec<Measure> {
    debug_assert!(start >= 1 && start <= end);
    (start..=end)
        .map(|number| {
            measures
                .iter()
                .find(|m| m.number == number)
                .cloned()
                .unwrap_or_else(|| Measure::empty(number, beats_per_measure))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_note(pitch: u8, start: f64, duration: f64) -> NoteEvent {
        NoteEvent::new(pitch, start, duration)
    }

    #[test]
    fn groups_notes_into_expected_measures() {
        let notes = vec![
            make_note(60, 0.0, 1.0),
            make_note(62, 4.0, 1.0),
            make_note(64, 4.5, 0.5),
        ];
        let measures = group_by_measure(&notes, 4.0).unwrap();

        assert_eq!(measures.len(), 2, "two measures expected");
        assert_eq!(measures[0].number, 1);
        assert_eq!(measures[0].notes.len(), 1);
        assert_eq!(measures[0].notes[0].pitch, 60);
        assert_eq!(measures[1].number, 2);
        let pitches: Vec<u8> = measures[1].notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![62, 64]);
    }

    #[test]
    fn output_is_sorted_with_unique_numbers_and_covers_every_note() {
        let notes = vec![
            make_note(70, 9.0, 1.0),
            make_note(60, 0.5, 0.5),
            make_note(65, 9.5, 0.25),
            make_note(62, 1.0, 1.0),
            make_note(64, 17.0, 2.0),
        ];
        let measures = group_by_measure(&notes, 2.0).unwrap();

        let numbers: Vec<u32> = measures.iter().map(|m| m.number).collect();
        let mut sorted = numbers.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(numbers, sorted, "numbers must be ascending and unique");

        let total: usize = measures.iter().map(|m| m.notes.len()).sum();
        assert_eq!(total, notes.len(), "every note lands in exactly one bucket");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(group_by_measure(&[], 4.0).unwrap().is_empty());
    }

    #[test]
    fn non_positive_beats_per_measure_is_rejected() {
        let notes = vec![make_note(60, 0.0, 1.0)];
        assert_eq!(
            group_by_measure(&notes, 0.0),
            Err(MeasureError::InvalidBeatsPerMeasure(0.0))
        );
        assert!(group_by_measure(&notes, -3.0).is_err());
        assert!(group_by_measure(&notes, f64::NAN).is_err());
    }

    #[test]
    fn onset_exactly_on_barline_belongs_to_the_later_measure() {
        assert_eq!(measure_of(4.0, 4.0), 2);
        assert_eq!(measure_of(3.999, 4.0), 1);
        assert_eq!(measure_of(0.0, 4.0), 1);
    }

    #[test]
    fn negative_onset_clamps_to_measure_one() {
        assert_eq!(measure_of(-0.5, 4.0), 1);
        let measures = group_by_measure(&[make_note(60, -1.0, 1.0)], 4.0).unwrap();
        assert_eq!(measures[0].number, 1);
    }

    #[test]
    fn window_slice_fills_gaps_with_empty_measures() {
        let notes = vec![make_note(60, 0.0, 1.0), make_note(62, 8.0, 1.0)];
        let measures = group_by_measure(&notes, 4.0).unwrap();
        let window = measures_in_window(&measures, 1, 3, 4.0);

        assert_eq!(window.len(), 3);
        assert_eq!(window[1].number, 2);
        assert!(window[1].notes.is_empty(), "measure 2 has no notes");
        assert_eq!(window[1].start_beat, 4.0);
        assert_eq!(window[1].end_beat, 8.0);
        assert_eq!(window[2].notes.len(), 1);
    }

    #[test]
    fn grouping_is_deterministic() {
        let notes = vec![
            make_note(60, 0.0, 1.0),
            make_note(61, 1.0, 1.0),
            make_note(63, 5.0, 1.0),
        ];
        let first = group_by_measure(&notes, 4.0).unwrap();
        let second = group_by_measure(&notes, 4.0).unwrap();
        assert_eq!(first, second);
    }
}
