//! Client-side note statistics
//!
//! Summarizes one instrument's notes into the figures the piano-roll AI
//! prompt template interpolates. Counting happens here so the request
//! carries a compact digest instead of the raw note list.

use serde::Serialize;

use crate::models::NoteEvent;
use crate::notation::pitch_name;

/// Interval labels indexed by absolute semitone distance
const INTERVAL_NAMES: [&str; 8] = [
    "unison", "2nd", "3rd", "4th", "5th", "6th", "7th", "8th",
];

/// Rhythm patterns are counted over at most this many three-note windows
const MAX_RHYTHM_WINDOWS: usize = 50;

/// Notes listed verbatim at the end of the digest
const MAX_LISTED_NOTES: usize = 20;

/// Digest of one instrument's notes, pre-formatted for prompt
/// interpolation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteStats {
    pub total_notes: usize,
    pub min_pitch: u8,
    pub max_pitch: u8,
    pub min_pitch_name: String,
    pub max_pitch_name: String,
    pub pitch_range: u8,
    pub total_duration: f64,
    pub avg_duration: f64,
    /// Top interval counts, e.g. `2nd (12x), unison (4x)`
    pub top_intervals: String,
    /// Top duration three-grams, e.g. `1.00-0.50-0.50 (6x)`
    pub rhythmic_patterns: String,
    /// First notes, one `Name (start: s, duration: d)` line each
    pub first_notes: String,
}

/// `None` for an empty note list.
pub fn analyze_notes(notes: &[NoteEvent]) -> Option<NoteStats> {
    if notes.is_empty() {
        return None;
    }

    let mut sorted: Vec<&NoteEvent> = notes.iter().collect();
    sorted.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut min_pitch = u8::MAX;
    let mut max_pitch = u8::MIN;
    let mut duration_sum = 0.0;
    for note in &sorted {
        min_pitch = min_pitch.min(note.pitch);
        max_pitch = max_pitch.max(note.pitch);
        duration_sum += note.duration;
    }
    let last = sorted[sorted.len() - 1];

    Some(NoteStats {
        total_notes: sorted.len(),
        min_pitch,
        max_pitch,
        min_pitch_name: first_name_of(&sorted, min_pitch),
        max_pitch_name: first_name_of(&sorted, max_pitch),
        pitch_range: max_pitch - min_pitch,
        total_duration: last.start + last.duration,
        avg_duration: duration_sum / sorted.len() as f64,
        top_intervals: top_intervals(&sorted),
        rhythmic_patterns: rhythmic_patterns(&sorted),
        first_notes: first_notes(&sorted),
    })
}

fn note_label(note: &NoteEvent) -> String {
    if note.name.is_empty() {
        pitch_name(note.pitch)
    } else {
        note.name.clone()
    }
}

fn first_name_of(sorted: &[&NoteEvent], pitch: u8) -> String {
    sorted
        .iter()
        .find(|n| n.pitch == pitch)
        .map(|n| note_label(n))
        .unwrap_or_default()
}

fn interval_label(semitones: u8) -> String {
    match INTERVAL_NAMES.get(semitones as usize) {
        Some(name) => (*name).to_string(),
        None => format!("{} semitones", semitones),
    }
}

/// Top three absolute semitone steps between consecutive notes. Ties
/// resolve toward the smaller interval.
fn top_intervals(sorted: &[&NoteEvent]) -> String {
    let mut counts: std::collections::BTreeMap<u8, u32> = std::collections::BTreeMap::new();
    for pair in sorted.windows(2) {
        let semitones = pair[1].pitch.abs_diff(pair[0].pitch);
        *counts.entry(semitones).or_insert(0) += 1;
    }
    let mut ranked: Vec<(u8, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .iter()
        .take(3)
        .map(|(semitones, count)| format!("{} ({}x)", interval_label(*semitones), count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Top three duration three-grams over the first
/// [`MAX_RHYTHM_WINDOWS`] windows. Ties resolve toward the pattern seen
/// first.
fn rhythmic_patterns(sorted: &[&NoteEvent]) -> String {
    let mut counts: Vec<(String, u32)> = Vec::new();
    for window in sorted.windows(3).take(MAX_RHYTHM_WINDOWS) {
        let pattern = window
            .iter()
            .map(|n| format!("{:.2}", n.duration))
            .collect::<Vec<_>>()
            .join("-");
        match counts.iter_mut().find(|(p, _)| *p == pattern) {
            Some((_, count)) => *count += 1,
            None => counts.push((pattern, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .iter()
        .take(3)
        .map(|(pattern, count)| format!("{} ({}x)", pattern, count))
        .collect::<Vec<_>>()
        .join(", ")
}

fn first_notes(sorted: &[&NoteEvent]) -> String {
    sorted
        .iter()
        .take(MAX_LISTED_NOTES)
        .map(|n| {
            format!(
                "{} (start: {:.1}, duration: {:.2})",
                note_label(n),
                n.start,
                n.duration
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
