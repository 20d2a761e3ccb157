//! Multi-instrument comparison overlay
//!
//! Holds the ordered instrument selection for the comparison chart, turns
//! it into plot shapes, and keeps the single measure-range highlight.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::models::{ComparisonData, NoteEvent};
use crate::notation::pitch_name;

/// Instruments that can be overlaid at once
pub const MAX_COMPARED_INSTRUMENTS: usize = 5;

/// Fixed trace palette, indexed by selection order
pub const INSTRUMENT_PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E2",
    "#F8B88B", "#82E0AA",
];

const HIGHLIGHT_FILL: &str = "rgba(255,255,255,0.1)";
const HIGHLIGHT_LINE: &str = "rgba(255,255,255,0.5)";

#[derive(Error, Clone, Debug, PartialEq)]
pub enum SelectionError {
    #[error("comparison is limited to {} instruments at a time", MAX_COMPARED_INSTRUMENTS)]
    CapacityReached,
    #[error("no instrument with index {0}")]
    UnknownInstrument(usize),
    #[error("measure range {start}-{end} is not valid")]
    InvalidRange { start: u32, end: u32 },
    #[error("select at least one instrument first")]
    NothingSelected,
}

/// What a toggle did to the selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionChange {
    Selected,
    Deselected,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ShapeLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub width: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash: Option<String>,
}

/// One note rectangle on the comparison chart
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NoteShape {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
    pub fillcolor: &'static str,
    pub opacity: f64,
    pub line: ShapeLine,
}

/// The one measure-range highlight, drawn above the note shapes
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct HighlightShape {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub xref: &'static str,
    pub yref: &'static str,
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
    pub fillcolor: &'static str,
    pub line: ShapeLine,
    pub layer: &'static str,
}

/// Suggested x-axis range after a highlight, one beat of margin each side
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct ZoomRange {
    pub x0: f64,
    pub x1: f64,
}

/// Everything the chart needs to redraw
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct OverlayShapes {
    pub notes: Vec<NoteShape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<HighlightShape>,
}

/// Ordered instrument selection, per-instrument visibility, and the
/// current highlight.
pub struct ComparisonBoard {
    data: ComparisonData,
    selected: Vec<usize>,
    hidden: BTreeSet<usize>,
    highlight: Option<(u32, u32)>,
}

impl ComparisonBoard {
    pub fn new(data: ComparisonData) -> Self {
        Self {
            data: data.normalize(),
            selected: Vec::new(),
            hidden: BTreeSet::new(),
            highlight: None,
        }
    }

    pub fn beats_per_measure(&self) -> f64 {
        self.data.measure_duration_beats
    }

    /// Instrument indices in selection order
    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    pub fn instrument_names(&self) -> Vec<&str> {
        self.data.instruments.iter().map(|i| i.name.as_str()).collect()
    }

    /// Checkbox semantics: selecting again deselects. A sixth selection is
    /// rejected and leaves the first five untouched.
    pub fn toggle(&mut self, index: usize) -> Result<SelectionChange, SelectionError> {
        if let Some(pos) = self.selected.iter().position(|&i| i == index) {
            self.selected.remove(pos);
            self.hidden.remove(&index);
            return Ok(SelectionChange::Deselected);
        }
        if self.selected.len() >= MAX_COMPARED_INSTRUMENTS {
            return Err(SelectionError::CapacityReached);
        }
        if !self.data.instruments.iter().any(|i| i.index == index) {
            return Err(SelectionError::UnknownInstrument(index));
        }
        self.selected.push(index);
        Ok(SelectionChange::Selected)
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
        self.hidden.clear();
    }

    /// Show or hide one selected instrument's traces. Visibility is scoped
    /// to the selection: unselected indices are ignored, and deselection
    /// forgets the flag.
    pub fn set_visible(&mut self, index: usize, visible: bool) {
        if !self.selected.contains(&index) {
            return;
        }
        if visible {
            self.hidden.remove(&index);
        } else {
            self.hidden.insert(index);
        }
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.selected.contains(&index) && !self.hidden.contains(&index)
    }

    /// Trace color for a selected instrument, by its position in the
    /// current selection order. `None` when not selected.
    pub fn color_of(&self, index: usize) -> Option<&'static str> {
        self.selected
            .iter()
            .position(|&i| i == index)
            .map(|pos| INSTRUMENT_PALETTE[pos % INSTRUMENT_PALETTE.len()])
    }

    /// Note rectangles for the visible part of the selection, ordered by
    /// selection order and note start within each instrument. Hidden
    /// instruments keep their color slot.
    pub fn note_shapes(&self) -> Vec<NoteShape> {
        let mut shapes = Vec::new();
        for (pos, &index) in self.selected.iter().enumerate() {
            if self.hidden.contains(&index) {
                continue;
            }
            let instrument = match self.data.instruments.iter().find(|i| i.index == index) {
                Some(instrument) => instrument,
                None => continue,
            };
            let color = INSTRUMENT_PALETTE[pos % INSTRUMENT_PALETTE.len()];
            let mut notes: Vec<&NoteEvent> = instrument.notes.iter().collect();
            notes.sort_by(|a, b| {
                a.start
                    .partial_cmp(&b.start)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for note in notes {
                shapes.push(note_shape(note, color));
            }
        }
        shapes
    }

    /// Set the measure-range highlight, replacing any prior one. Returns
    /// the new shape and a zoom hint for the chart.
    pub fn highlight_range(
        &mut self,
        start_measure: u32,
        end_measure: u32,
    ) -> Result<(HighlightShape, ZoomRange), SelectionError> {
        if start_measure < 1 || end_measure < start_measure {
            return Err(SelectionError::InvalidRange {
                start: start_measure,
                end: end_measure,
            });
        }
        self.highlight = Some((start_measure, end_measure));
        let (start_time, end_time) = self.range_times(start_measure, end_measure);
        Ok((
            highlight_shape(start_time, end_time),
            ZoomRange {
                x0: start_time - 1.0,
                x1: end_time + 1.0,
            },
        ))
    }

    pub fn clear_highlight(&mut self) {
        self.highlight = None;
    }

    /// Full shape list for a redraw. The highlight, when present, comes
    /// last so it draws above the notes.
    pub fn shapes(&self) -> OverlayShapes {
        OverlayShapes {
            notes: self.note_shapes(),
            highlight: self.highlight.map(|(start, end)| {
                let (start_time, end_time) = self.range_times(start, end);
                highlight_shape(start_time, end_time)
            }),
        }
    }

    /// Selected instruments with only the notes overlapping the measure
    /// range, in selection order. Feeds the comparison AI request.
    pub fn notes_in_range(
        &self,
        start_measure: u32,
        end_measure: u32,
    ) -> Result<Vec<(String, Vec<NoteEvent>)>, SelectionError> {
        if start_measure < 1 || end_measure < start_measure {
            return Err(SelectionError::InvalidRange {
                start: start_measure,
                end: end_measure,
            });
        }
        if self.selected.is_empty() {
            return Err(SelectionError::NothingSelected);
        }
        let (range_start, range_end) = self.range_times(start_measure, end_measure);
        let mut out = Vec::new();
        for &index in &self.selected {
            if let Some(instrument) = self.data.instruments.iter().find(|i| i.index == index) {
                let notes = instrument
                    .notes
                    .iter()
                    .filter(|n| overlaps(n, range_start, range_end))
                    .cloned()
                    .collect();
                out.push((instrument.name.clone(), notes));
            }
        }
        Ok(out)
    }

    /// One line per selected instrument, notes rendered as
    /// `Name (t:start-end)` pairs. This is the `instrumentsData` block of
    /// the comparison prompt.
    pub fn describe_notes_in_range(
        &self,
        start_measure: u32,
        end_measure: u32,
    ) -> Result<String, SelectionError> {
        let per_instrument = self.notes_in_range(start_measure, end_measure)?;
        let mut text = String::new();
        for (name, notes) in per_instrument {
            let rendered: Vec<String> = notes
                .iter()
                .map(|n| {
                    let label = if n.name.is_empty() {
                        pitch_name(n.pitch)
                    } else {
                        n.name.clone()
                    };
                    format!("{} (t:{:.2}-{:.2})", label, n.start, n.end())
                })
                .collect();
            text.push_str(&format!("{} - {}\n", name, rendered.join(", ")));
        }
        Ok(text)
    }

    fn range_times(&self, start_measure: u32, end_measure: u32) -> (f64, f64) {
        let beats = self.data.measure_duration_beats;
        (
            (start_measure - 1) as f64 * beats,
            end_measure as f64 * beats,
        )
    }
}

fn note_shape(note: &NoteEvent, color: &'static str) -> NoteShape {
    let width = if note.duration > 0.0 {
        note.duration
    } else {
        0.5
    };
    NoteShape {
        kind: "rect",
        x0: note.start,
        x1: note.start + width,
        y0: note.pitch as f64 - 0.4,
        y1: note.pitch as f64 + 0.4,
        fillcolor: color,
        opacity: 0.6,
        line: ShapeLine {
            color: None,
            width: 1.0,
            dash: None,
        },
    }
}

fn highlight_shape(start_time: f64, end_time: f64) -> HighlightShape {
    HighlightShape {
        kind: "rect",
        xref: "x",
        yref: "paper",
        x0: start_time,
        x1: end_time,
        y0: 0.0,
        y1: 1.0,
        fillcolor: HIGHLIGHT_FILL,
        line: ShapeLine {
            color: Some(HIGHLIGHT_LINE.to_string()),
            width: 2.0,
            dash: Some("dot".to_string()),
        },
        layer: "above",
    }
}

fn overlaps(note: &NoteEvent, range_start: f64, range_end: f64) -> bool {
    let start = note.start;
    let end = note.end();
    (start >= range_start && start < range_end)
        || (end > range_start && end <= range_end)
        || (start <= range_start && end >= range_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Instrument;

    fn board_with(count: usize) -> ComparisonBoard {
        let instruments = (0..count)
            .map(|i| Instrument {
                index: i,
                name: format!("Part {}", i + 1),
                notes: vec![NoteEvent::new(60 + i as u8, i as f64, 1.0)],
            })
            .collect();
        ComparisonBoard::new(ComparisonData {
            instruments,
            measure_duration_beats: 4.0,
        })
    }

    #[test]
    fn sixth_selection_is_rejected() {
        let mut board = board_with(8);
        for i in 0..5 {
            assert_eq!(board.toggle(i), Ok(SelectionChange::Selected));
        }
        assert_eq!(board.toggle(5), Err(SelectionError::CapacityReached));
        assert_eq!(board.selected(), &[0, 1, 2, 3, 4], "rejection changes nothing");

        // freeing a slot lets the sixth in
        assert_eq!(board.toggle(2), Ok(SelectionChange::Deselected));
        assert_eq!(board.toggle(5), Ok(SelectionChange::Selected));
        assert_eq!(board.selected(), &[0, 1, 3, 4, 5]);
    }

    #[test]
    fn unknown_instruments_are_rejected() {
        let mut board = board_with(2);
        assert_eq!(board.toggle(7), Err(SelectionError::UnknownInstrument(7)));
    }

    #[test]
    fn colors_follow_current_selection_order() {
        let mut board = board_with(4);
        board.toggle(2).unwrap();
        board.toggle(0).unwrap();
        assert_eq!(board.color_of(2), Some(INSTRUMENT_PALETTE[0]));
        assert_eq!(board.color_of(0), Some(INSTRUMENT_PALETTE[1]));
        assert_eq!(board.color_of(1), None);

        // deselecting the first shifts everyone after it down
        board.toggle(2).unwrap();
        assert_eq!(board.color_of(0), Some(INSTRUMENT_PALETTE[0]));
    }

    #[test]
    fn hidden_instruments_drop_out_of_the_shapes_but_keep_their_color() {
        let mut board = board_with(3);
        board.toggle(0).unwrap();
        board.toggle(1).unwrap();

        board.set_visible(0, false);
        let shapes = board.note_shapes();
        assert_eq!(shapes.len(), 1, "only the visible instrument draws");
        assert_eq!(shapes[0].fillcolor, INSTRUMENT_PALETTE[1]);
        assert_eq!(board.color_of(0), Some(INSTRUMENT_PALETTE[0]));
        assert!(!board.is_visible(0));
        assert!(board.is_visible(1));

        board.set_visible(0, true);
        assert_eq!(board.note_shapes().len(), 2);
    }

    #[test]
    fn visibility_is_scoped_to_the_selection() {
        let mut board = board_with(3);
        board.toggle(1).unwrap();

        // not selected: ignored, not remembered
        board.set_visible(2, false);
        assert!(!board.is_visible(2));
        board.toggle(2).unwrap();
        assert!(board.is_visible(2), "selection always starts visible");

        // deselection forgets the hidden flag
        board.set_visible(1, false);
        board.toggle(1).unwrap();
        board.toggle(1).unwrap();
        assert!(board.is_visible(1));
    }

    #[test]
    fn note_shapes_are_ordered_by_selection_then_start() {
        let mut board = ComparisonBoard::new(ComparisonData {
            instruments: vec![
                Instrument {
                    index: 0,
                    name: "Flute".into(),
                    notes: vec![NoteEvent::new(72, 2.0, 1.0), NoteEvent::new(74, 0.0, 1.0)],
                },
                Instrument {
                    index: 1,
                    name: "Cello".into(),
                    notes: vec![NoteEvent::new(48, 1.0, 1.0)],
                },
            ],
            measure_duration_beats: 4.0,
        });
        board.toggle(1).unwrap();
        board.toggle(0).unwrap();

        let shapes = board.note_shapes();
        let starts: Vec<f64> = shapes.iter().map(|s| s.x0).collect();
        assert_eq!(starts, vec![1.0, 0.0, 2.0], "cello first, then flute sorted by start");
        assert_eq!(shapes[0].fillcolor, INSTRUMENT_PALETTE[0]);
        assert_eq!(shapes[1].fillcolor, INSTRUMENT_PALETTE[1]);
    }

    #[test]
    fn note_shape_geometry_matches_the_chart() {
        let shape = note_shape(&NoteEvent::new(60, 2.0, 1.5), "#FF6B6B");
        assert_eq!((shape.x0, shape.x1), (2.0, 3.5));
        assert_eq!((shape.y0, shape.y1), (59.6, 60.4));
        assert_eq!(shape.opacity, 0.6);
        assert_eq!(shape.line.width, 1.0);

        // zero-length notes still get a visible sliver
        let shape = note_shape(&NoteEvent::new(60, 2.0, 0.0), "#FF6B6B");
        assert_eq!(shape.x1, 2.5);
    }

    #[test]
    fn highlight_replaces_the_previous_one() {
        let mut board = board_with(2);
        board.toggle(0).unwrap();

        let (first, _) = board.highlight_range(1, 2).unwrap();
        assert_eq!((first.x0, first.x1), (0.0, 8.0));

        let (second, zoom) = board.highlight_range(3, 4).unwrap();
        assert_eq!((second.x0, second.x1), (8.0, 16.0));
        assert_eq!((zoom.x0, zoom.x1), (7.0, 17.0));

        let shapes = board.shapes();
        let highlight = shapes.highlight.expect("one highlight");
        assert_eq!(highlight.x0, 8.0, "only the latest range survives");
        assert_eq!(highlight.fillcolor, HIGHLIGHT_FILL);
        assert_eq!(highlight.layer, "above");
        assert_eq!(highlight.line.dash.as_deref(), Some("dot"));
    }

    #[test]
    fn highlight_rejects_bad_ranges() {
        let mut board = board_with(1);
        assert!(matches!(
            board.highlight_range(0, 3),
            Err(SelectionError::InvalidRange { .. })
        ));
        assert!(matches!(
            board.highlight_range(4, 2),
            Err(SelectionError::InvalidRange { .. })
        ));
        assert!(board.shapes().highlight.is_none(), "nothing was set");
    }

    #[test]
    fn range_filter_keeps_overlapping_notes_only() {
        let mut board = ComparisonBoard::new(ComparisonData {
            instruments: vec![Instrument {
                index: 0,
                name: "Oboe".into(),
                notes: vec![
                    NoteEvent::new(60, 0.0, 4.0),  // ends exactly at range start
                    NoteEvent::new(62, 5.0, 1.0),  // inside
                    NoteEvent::new(64, 8.0, 1.0),  // starts exactly at range end
                    NoteEvent::new(65, 3.0, 10.0), // spans the whole range
                ],
            }],
            measure_duration_beats: 4.0,
        });
        board.toggle(0).unwrap();

        // measure 2 only: beats [4, 8)
        let filtered = board.notes_in_range(2, 2).unwrap();
        let pitches: Vec<u8> = filtered[0].1.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![62, 65]);
    }

    #[test]
    fn described_notes_feed_the_prompt() {
        let mut board = ComparisonBoard::new(ComparisonData {
            instruments: vec![Instrument {
                index: 0,
                name: "Viola".into(),
                notes: vec![NoteEvent {
                    pitch: 60,
                    start: 0.0,
                    duration: 1.5,
                    velocity: 64,
                    name: "C4".into(),
                }],
            }],
            measure_duration_beats: 4.0,
        });
        board.toggle(0).unwrap();

        let text = board.describe_notes_in_range(1, 1).unwrap();
        assert_eq!(text, "Viola - C4 (t:0.00-1.50)\n");
    }

    #[test]
    fn description_requires_a_selection() {
        let board = board_with(3);
        assert_eq!(
            board.describe_notes_in_range(1, 2),
            Err(SelectionError::NothingSelected)
        );
    }
}
