//! Client configuration blob and the settings store
//!
//! Settings are persisted server-side (`GET/POST /settings`); the client
//! holds one immutable snapshot at a time. Components receive the snapshot
//! at construction and are re-fed through an explicit reload step; there is
//! no ambient mutable configuration.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which configured chat endpoint receives AI traffic
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Remote,
    Local,
}

impl Default for Agent {
    fn default() -> Self {
        Agent::Remote
    }
}

impl Agent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Remote => "remote",
            Agent::Local => "local",
        }
    }
}

/// The `/settings` configuration blob (camelCase on the wire).
///
/// Unknown prompt keys are carried through untouched so a newer backend can
/// introduce prompts without breaking older clients.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub remote_api_url: String,
    pub remote_api_key: String,
    pub remote_model: String,
    pub local_api_url: String,
    pub local_api_key: String,
    pub local_model: String,
    /// Newline-separated phrases offered as quick chat context
    pub context_phrases: String,
    pub theme: String,
    pub agent: Agent,
    /// Prompt template overrides keyed by prompt id
    pub ai_prompts: BTreeMap<String, String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            remote_api_url: String::new(),
            remote_api_key: String::new(),
            remote_model: String::new(),
            local_api_url: String::new(),
            local_api_key: String::new(),
            local_model: String::new(),
            context_phrases: String::new(),
            theme: "dark".to_string(),
            agent: Agent::Remote,
            ai_prompts: BTreeMap::new(),
        }
    }
}

/// Endpoint coordinates for one agent
#[derive(Clone, Debug, PartialEq)]
pub struct ChatProfile {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl AppSettings {
    pub fn chat_profile(&self, agent: Agent) -> ChatProfile {
        match agent {
            Agent::Remote => ChatProfile {
                base_url: self.remote_api_url.clone(),
                api_key: self.remote_api_key.clone(),
                model: self.remote_model.clone(),
            },
            Agent::Local => ChatProfile {
                base_url: self.local_api_url.clone(),
                api_key: self.local_api_key.clone(),
                model: self.local_model.clone(),
            },
        }
    }

    /// Profile of the agent currently selected in the settings
    pub fn active_profile(&self) -> ChatProfile {
        self.chat_profile(self.agent)
    }

    /// Template text for a prompt: user override, else the built-in default.
    pub fn prompt_text(&self, kind: PromptKind) -> &str {
        match self.ai_prompts.get(kind.key()) {
            Some(text) if !text.is_empty() => text,
            _ => DEFAULT_PROMPTS.get(kind.key()).copied().unwrap_or(""),
        }
    }
}

/// The configurable prompt slots
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    PianoRoll,
    Comparison,
    MelodicQuick,
    GeneralPanel,
}

impl PromptKind {
    pub fn key(&self) -> &'static str {
        match self {
            PromptKind::PianoRoll => "piano_roll_analysis",
            PromptKind::Comparison => "comparison_analysis",
            PromptKind::MelodicQuick => "melodic_ai_quick",
            PromptKind::GeneralPanel => "general_ai_panel",
        }
    }
}

/// Built-in prompt texts used when the settings blob carries no override.
///
/// Templates are mustache: `{{field}}` for numbers, `{{{field}}}` for
/// pre-formatted text blocks that must not be HTML-escaped.
pub static DEFAULT_PROMPTS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut prompts = BTreeMap::new();
    prompts.insert("piano_roll_analysis", PIANO_ROLL_PROMPT);
    prompts.insert("comparison_analysis", COMPARISON_PROMPT);
    prompts.insert("melodic_ai_quick", "");
    prompts.insert("general_ai_panel", GENERAL_PANEL_PROMPT);
    prompts
});

const PIANO_ROLL_PROMPT: &str = r#"# Piano Roll Analysis: {{{instrumentName}}}

## Statistical Data

**General Information:**
- Total notes: {{totalNotes}}
- Range: {{{minPitch}}} to {{{maxPitch}}} ({{pitchRange}} semitones)
- Total duration: {{totalDuration}} beats
- Average duration per note: {{avgDuration}} beats

**Most Common Melodic Intervals:**
{{{topIntervals}}}

**Identified Rhythmic Patterns:**
{{{rhythmicPatterns}}}

**First 20 Notes (for context):**
{{{firstNotes}}}

---

## Analysis Task

Please provide a **complete and detailed** musical analysis of this Piano Roll, including:

### 1. **Melodic Contour**
- Describe the general direction (ascending, descending, undulating, static)
- Identify climax points or important moments
- Analyze the tessitura used

### 2. **Interval Analysis**
- Interpret the musical meaning of the most common intervals
- Identify if there is a preference for steps or leaps
- Comment on the expressive function of the intervals

### 3. **Rhythmic Characteristics**
- Analyze the predominant rhythmic patterns
- Identify rhythmic regularity or variation
- Comment on the rhythmic character (fluid, syncopated, regular, etc.)

### 4. **Motifs and Repetitions**
- Identify possible recurrent melodic motifs
- Detect sequences or repetitive patterns
- Analyze the suggested formal structure

### 5. **Harmonic Context and Interpretation**
- Suggest possible harmonic functions
- Recommend interpretive approaches
- Comment on the suggested musical style or period

**Format:** Answer in **English**, using **Markdown** to structure the response (headings, lists, bold, etc.). Be clear, objective, and musically informative."#;

const COMPARISON_PROMPT: &str = r#"You are a music analyst, provide a structured thought on the following information:

Measures to analyze (highlighted measures) - Measure {{startMeasure}} to {{endMeasure}}

{{{instrumentsData}}}

Perform a detailed comparative analysis between the melodic lines of the selected instruments.

Focus specifically on:
1. **Melodic Relationship:** How do the melodies interact? Is there imitation, counterpoint, unison, or complementarity?
2. **Instrumental Dialogue:** Identify questions and answers, or moments where one instrument takes the lead while the other accompanies.
3. **Contrast and Similarity:** Compare the melodic contours, rhythms, and note density of each instrument in this excerpt.
4. **Synthesis:** What is the resulting musical effect of this specific combination in this excerpt?"#;

const GENERAL_PANEL_PROMPT: &str = "Based on the data above, answer the initial prompt. \
Do not repeat the raw data. Answer only with the analysis in English, without unnecessary introductions.";

/// Owns the active settings snapshot.
///
/// `replace` swaps the snapshot and reports whether anything changed; the
/// caller is responsible for notifying interested parties (the API layer
/// invokes its registered change callback when this returns true).
#[derive(Debug)]
pub struct SettingsStore {
    current: AppSettings,
    revision: u64,
}

impl SettingsStore {
    pub fn new(initial: AppSettings) -> Self {
        Self {
            current: initial,
            revision: 0,
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.current
    }

    /// Bumped on every effective replace; lets consumers detect staleness.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Install a freshly fetched snapshot. Returns false (and keeps the
    /// revision) when the snapshot is identical to the current one.
    pub fn replace(&mut self, next: AppSettings) -> bool {
        if next == self.current {
            return false;
        }
        self.current = next;
        self.revision += 1;
        true
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(AppSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_deserialize_camel_case_blob() {
        let json = r#"{
            "remoteApiUrl": "https://api.example.com/v1",
            "remoteApiKey": "sk-123",
            "remoteModel": "gpt-4o-mini",
            "theme": "light",
            "agent": "local",
            "aiPrompts": {"general_ai_panel": "Keep it short."}
        }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.remote_api_url, "https://api.example.com/v1");
        assert_eq!(settings.agent, Agent::Local);
        assert_eq!(settings.local_api_url, "", "missing keys default to empty");
        assert_eq!(settings.prompt_text(PromptKind::GeneralPanel), "Keep it short.");
    }

    #[test]
    fn missing_blob_defaults_to_dark_remote() {
        let settings: AppSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.theme, "dark");
        assert_eq!(settings.agent, Agent::Remote);
    }

    #[test]
    fn prompt_text_falls_back_to_builtin_default() {
        let settings = AppSettings::default();
        assert!(settings
            .prompt_text(PromptKind::PianoRoll)
            .contains("Piano Roll Analysis"));
        assert!(settings
            .prompt_text(PromptKind::GeneralPanel)
            .starts_with("Based on the data above"));
    }

    #[test]
    fn empty_override_is_treated_as_absent() {
        let mut settings = AppSettings::default();
        settings
            .ai_prompts
            .insert("general_ai_panel".to_string(), String::new());
        assert!(settings
            .prompt_text(PromptKind::GeneralPanel)
            .starts_with("Based on the data above"));
    }

    #[test]
    fn chat_profile_tracks_selected_agent() {
        let mut settings = AppSettings::default();
        settings.remote_api_url = "https://remote/v1".into();
        settings.remote_model = "m-remote".into();
        settings.local_api_url = "http://localhost:1234/v1".into();
        settings.local_model = "m-local".into();
        settings.agent = Agent::Local;
        let profile = settings.active_profile();
        assert_eq!(profile.base_url, "http://localhost:1234/v1");
        assert_eq!(profile.model, "m-local");
    }

    #[test]
    fn store_replace_detects_change_and_bumps_revision() {
        let mut store = SettingsStore::default();
        assert!(!store.replace(AppSettings::default()), "identical blob is a no-op");
        assert_eq!(store.revision(), 0);

        let mut changed = AppSettings::default();
        changed.theme = "light".into();
        assert!(store.replace(changed));
        assert_eq!(store.revision(), 1);
        assert_eq!(store.settings().theme, "light");
    }
}
