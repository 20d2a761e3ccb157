//! Report panels and the embedded AI query widgets
//!
//! Panels start collapsed and toggle independently. Each AI widget allows
//! one request per explicit action; its submit state stays disabled until
//! the reply (or the failure) comes back. Prompt texts are mustache
//! templates from the settings blob, rendered here against the computed
//! statistics.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::stats::NoteStats;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum PanelError {
    #[error("a request is already in flight")]
    RequestInFlight,
    #[error("the prompt is empty")]
    EmptyPrompt,
    #[error("prompt template failed: {0}")]
    Template(String),
}

/// Expansion state of the collapsible report sections, keyed by section id.
/// Sections never seen before count as collapsed.
#[derive(Debug, Default)]
pub struct PanelRegistry {
    expanded: BTreeMap<String, bool>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.get(id).copied().unwrap_or(false)
    }

    /// Flip one section and return its new state. Other sections are
    /// untouched.
    pub fn toggle(&mut self, id: &str) -> bool {
        let state = !self.is_expanded(id);
        self.expanded.insert(id.to_string(), state);
        state
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }
}

/// Submit guard for one panel's AI query box.
#[derive(Debug, Default)]
pub struct AiQueryWidget {
    busy: bool,
}

impl AiQueryWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Claim the widget for one request. Fails while a request is in
    /// flight or when the prompt is blank; the caller sends the request
    /// only on `Ok`.
    pub fn begin(&mut self, prompt: &str) -> Result<(), PanelError> {
        if self.busy {
            return Err(PanelError::RequestInFlight);
        }
        if prompt.trim().is_empty() {
            return Err(PanelError::EmptyPrompt);
        }
        self.busy = true;
        Ok(())
    }

    /// Release the widget after the reply or the failure arrived.
    pub fn finish(&mut self) {
        self.busy = false;
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

/// Transcript and in-flight guard for the chat sidebar.
#[derive(Debug, Default)]
pub struct ChatPanel {
    messages: Vec<ChatMessage>,
    awaiting: bool,
}

impl ChatPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting
    }

    /// Record the outgoing message and block further sends until
    /// [`receive`](Self::receive) is called.
    pub fn send(&mut self, text: &str) -> Result<(), PanelError> {
        if self.awaiting {
            return Err(PanelError::RequestInFlight);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(PanelError::EmptyPrompt);
        }
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            text: text.to_string(),
        });
        self.awaiting = true;
        Ok(())
    }

    /// Record the reply (or an error line) and unblock the input.
    pub fn receive(&mut self, text: &str) {
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            text: text.to_string(),
        });
        self.awaiting = false;
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PianoRollPromptContext {
    instrument_name: String,
    total_notes: usize,
    min_pitch: String,
    max_pitch: String,
    pitch_range: u8,
    total_duration: String,
    avg_duration: String,
    top_intervals: String,
    rhythmic_patterns: String,
    first_notes: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ComparisonPromptContext {
    start_measure: u32,
    end_measure: u32,
    instruments_data: String,
}

fn render_template<T: Serialize>(source: &str, context: &T) -> Result<String, PanelError> {
    let template =
        mustache::compile_str(source).map_err(|e| PanelError::Template(e.to_string()))?;
    template
        .render_to_string(context)
        .map_err(|e| PanelError::Template(e.to_string()))
}

/// Render the piano-roll analysis prompt from its template and the note
/// digest.
pub fn piano_roll_prompt(
    template: &str,
    instrument_name: &str,
    stats: &NoteStats,
) -> Result<String, PanelError> {
    let context = PianoRollPromptContext {
        instrument_name: instrument_name.to_string(),
        total_notes: stats.total_notes,
        min_pitch: format!("{} (MIDI {})", stats.min_pitch_name, stats.min_pitch),
        max_pitch: format!("{} (MIDI {})", stats.max_pitch_name, stats.max_pitch),
        pitch_range: stats.pitch_range,
        total_duration: format!("{:.2}", stats.total_duration),
        avg_duration: format!("{:.2}", stats.avg_duration),
        top_intervals: stats.top_intervals.clone(),
        rhythmic_patterns: stats.rhythmic_patterns.clone(),
        first_notes: stats.first_notes.clone(),
    };
    render_template(template, &context)
}

/// Render the instrument-comparison prompt body from its template.
pub fn comparison_prompt(
    template: &str,
    start_measure: u32,
    end_measure: u32,
    instruments_data: &str,
) -> Result<String, PanelError> {
    let context = ComparisonPromptContext {
        start_measure,
        end_measure,
        instruments_data: instruments_data.to_string(),
    };
    render_template(template, &context)
}

/// Wrap a rendered comparison body the way the analysis endpoint expects.
pub fn comparison_query_prompt(start_measure: u32, end_measure: u32, rendered: &str) -> String {
    format!(
        "Section: Instrument Comparison (Measures {}-{})\n\nContext: {}",
        start_measure, end_measure, rendered
    )
}

/// Assemble a panel query: the typed question, the section it came from,
/// the panel's report text, and the fixed closing instruction.
pub fn panel_query_prompt(
    user_prompt: &str,
    section_title: &str,
    content_text: &str,
    fixed_instruction: &str,
) -> String {
    format!(
        "{}\n\nContext: {}\n\nReport Content:\n{}\n\n{}",
        user_prompt, section_title, content_text, fixed_instruction
    )
}
