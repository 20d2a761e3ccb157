//! Measure-paginated staff notation view
//!
//! Coordinates which measures of one instrument are on screen, across the
//! two rendering backends. Every successful window change produces exactly
//! one [`RenderPlan`]; completions are matched against the plan token so a
//! superseded render can never overwrite a newer window's display.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::measures::{group_by_measure, measures_in_window, Measure, MeasureError};
use crate::models::{Instrument, NoteEvent};
use crate::notation::clef::choose_clef;
use crate::notation::engine::{EngineKind, MeasurePlan, RenderPlan};

/// Window width used when `load` is not given an explicit initial range
pub const INITIAL_WINDOW_WIDTH: u32 = 4;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum ViewError {
    #[error("measures run 1-{total}, requested {start}-{end}")]
    WindowOutOfRange { start: u32, end: u32, total: u32 },
    #[error("window start {start} is after end {end}")]
    WindowInverted { start: u32, end: u32 },
    #[error("no score is loaded")]
    NotLoaded,
    #[error("score has no measures")]
    EmptyScore,
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },
    #[error(transparent)]
    Measure(#[from] MeasureError),
}

/// Lifecycle of the view
#[derive(Clone, Debug, PartialEq)]
pub enum ViewState {
    Idle,
    /// Awaiting the engine's readiness gate
    Loading,
    Rendered,
    /// A tagged render is in flight
    Rendering,
    /// Recoverable: retry with the alternate engine
    Failed(String),
}

impl ViewState {
    pub fn name(&self) -> &'static str {
        match self {
            ViewState::Idle => "idle",
            ViewState::Loading => "loading",
            ViewState::Rendered => "rendered",
            ViewState::Rendering => "rendering",
            ViewState::Failed(_) => "failed",
        }
    }
}

/// Inclusive 1-indexed measure range, always inside `[1, total_measures]`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigationWindow {
    pub start: u32,
    pub end: u32,
    pub total_measures: u32,
}

impl NavigationWindow {
    pub fn validated(start: u32, end: u32, total_measures: u32) -> Result<Self, ViewError> {
        if start > end {
            return Err(ViewError::WindowInverted { start, end });
        }
        if start < 1 || end > total_measures {
            return Err(ViewError::WindowOutOfRange {
                start,
                end,
                total: total_measures,
            });
        }
        Ok(Self {
            start,
            end,
            total_measures,
        })
    }

    pub fn width(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Window shifted forward by its own width, sliding back as needed so
    /// the end never passes `total_measures`. Identity at the boundary.
    pub fn shifted_forward(&self) -> Self {
        if self.end == self.total_measures {
            return *self;
        }
        let width = self.width();
        let end = (self.end + width).min(self.total_measures);
        let start = (end + 1).saturating_sub(width).max(1);
        Self { start, end, ..*self }
    }

    /// Window shifted back by its own width, stopping at measure 1.
    /// Identity at the boundary.
    pub fn shifted_back(&self) -> Self {
        if self.start == 1 {
            return *self;
        }
        let width = self.width();
        let start = self.start.saturating_sub(width).max(1);
        let end = (start + width - 1).min(self.total_measures);
        Self { start, end, ..*self }
    }
}

/// Completion report from the engine adapter
#[derive(Clone, Debug, PartialEq)]
pub enum RenderOutcome {
    Done,
    Failed(String),
}

/// Whether a completion matched the live token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderAck {
    Applied,
    /// The completion belonged to a superseded render and was discarded
    Stale,
}

struct LoadedScore {
    engine: EngineKind,
    instrument: Instrument,
    beats_per_measure: f64,
    measures: Vec<Measure>,
    window: NavigationWindow,
}

/// Stateful pagination controller for one instrument's notation.
pub struct PaginatedNotationView {
    state: ViewState,
    loaded: Option<LoadedScore>,
    /// Monotonic across loads so completions from an earlier score can
    /// never match
    next_token: u32,
    current_token: u32,
}

impl PaginatedNotationView {
    pub fn new() -> Self {
        Self {
            state: ViewState::Idle,
            loaded: None,
            next_token: 0,
            current_token: 0,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn window(&self) -> Option<NavigationWindow> {
        self.loaded.as_ref().map(|l| l.window)
    }

    pub fn engine(&self) -> Option<EngineKind> {
        self.loaded.as_ref().map(|l| l.engine)
    }

    pub fn instrument_name(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| l.instrument.name.as_str())
    }

    pub fn current_token(&self) -> u32 {
        self.current_token
    }

    /// Stage an instrument and enter `Loading`. Rendering starts when the
    /// engine's gate resolves ([`gate_resolved`](Self::gate_resolved)).
    ///
    /// Allowed from `Idle` and `Failed`; a new score means a new view.
    pub fn load(
        &mut self,
        engine: EngineKind,
        instrument: Instrument,
        beats_per_measure: f64,
        total_measures: u32,
        initial_window: Option<(u32, u32)>,
    ) -> Result<(), ViewError> {
        match self.state {
            ViewState::Idle | ViewState::Failed(_) => {}
            _ => {
                return Err(ViewError::InvalidTransition {
                    operation: "load",
                    state: self.state.name(),
                })
            }
        }
        if total_measures == 0 {
            return Err(ViewError::EmptyScore);
        }
        let measures = group_by_measure(&instrument.notes, beats_per_measure)?;
        let (start, end) =
            initial_window.unwrap_or((1, total_measures.min(INITIAL_WINDOW_WIDTH)));
        let window = NavigationWindow::validated(start, end, total_measures)?;

        self.loaded = Some(LoadedScore {
            engine,
            instrument,
            beats_per_measure,
            measures,
            window,
        });
        self.current_token = 0;
        self.state = ViewState::Loading;
        Ok(())
    }

    /// The engine's readiness gate resolved: issue the first render.
    pub fn gate_resolved(&mut self) -> Result<RenderPlan, ViewError> {
        if self.state != ViewState::Loading {
            return Err(ViewError::InvalidTransition {
                operation: "start rendering",
                state: self.state.name(),
            });
        }
        self.begin_render()
    }

    /// The engine's readiness gate rejected. Returns false when the view
    /// had already moved on (late settlement of an abandoned load).
    pub fn gate_failed(&mut self, reason: &str) -> bool {
        if self.state != ViewState::Loading {
            log::debug!("ignoring gate failure while {}: {}", self.state.name(), reason);
            return false;
        }
        self.state = ViewState::Failed(reason.to_string());
        true
    }

    /// Explicit window change. Invalid ranges leave window and state
    /// untouched; a valid change supersedes any in-flight render.
    pub fn set_window(&mut self, start: u32, end: u32) -> Result<RenderPlan, ViewError> {
        self.ensure_navigable("change window")?;
        let loaded = self.loaded.as_mut().ok_or(ViewError::NotLoaded)?;
        let window = NavigationWindow::validated(start, end, loaded.window.total_measures)?;
        loaded.window = window;
        self.begin_render()
    }

    /// Shift one page forward. `Ok(None)` is the boundary no-op.
    pub fn next(&mut self) -> Result<Option<RenderPlan>, ViewError> {
        self.shift_window("page forward", NavigationWindow::shifted_forward)
    }

    /// Shift one page back. `Ok(None)` is the boundary no-op.
    pub fn previous(&mut self) -> Result<Option<RenderPlan>, ViewError> {
        self.shift_window("page back", NavigationWindow::shifted_back)
    }

    fn shift_window(
        &mut self,
        operation: &'static str,
        shift: fn(&NavigationWindow) -> NavigationWindow,
    ) -> Result<Option<RenderPlan>, ViewError> {
        self.ensure_navigable(operation)?;
        let loaded = self.loaded.as_mut().ok_or(ViewError::NotLoaded)?;
        let shifted = shift(&loaded.window);
        if shifted == loaded.window {
            return Ok(None);
        }
        loaded.window = shifted;
        self.begin_render().map(Some)
    }

    /// Completion report from the engine adapter. Stale tokens are
    /// discarded without touching the state machine.
    pub fn complete_render(&mut self, token: u32, outcome: RenderOutcome) -> RenderAck {
        if self.state != ViewState::Rendering || token != self.current_token {
            log::debug!(
                "discarding stale render completion (token {}, current {})",
                token,
                self.current_token
            );
            return RenderAck::Stale;
        }
        self.state = match outcome {
            RenderOutcome::Done => ViewState::Rendered,
            RenderOutcome::Failed(reason) => ViewState::Failed(reason),
        };
        RenderAck::Applied
    }

    /// From `Failed`, switch to the alternate engine and re-enter
    /// `Loading`. Returns the engine to await.
    pub fn retry_alternate(&mut self) -> Result<EngineKind, ViewError> {
        match self.state {
            ViewState::Failed(_) => {}
            _ => {
                return Err(ViewError::InvalidTransition {
                    operation: "retry",
                    state: self.state.name(),
                })
            }
        }
        let loaded = self.loaded.as_mut().ok_or(ViewError::NotLoaded)?;
        loaded.engine = loaded.engine.alternate();
        self.current_token = 0;
        self.state = ViewState::Loading;
        Ok(loaded.engine)
    }

    fn ensure_navigable(&self, operation: &'static str) -> Result<(), ViewError> {
        match self.state {
            ViewState::Rendered | ViewState::Rendering => Ok(()),
            _ => Err(ViewError::InvalidTransition {
                operation,
                state: self.state.name(),
            }),
        }
    }

    fn begin_render(&mut self) -> Result<RenderPlan, ViewError> {
        let token = self.next_token + 1;
        let loaded = self.loaded.as_ref().ok_or(ViewError::NotLoaded)?;
        let plan = build_plan(loaded, token);
        self.next_token = token;
        self.current_token = token;
        self.state = ViewState::Rendering;
        Ok(plan)
    }
}

impl Default for PaginatedNotationView {
    fn default() -> Self {
        Self::new()
    }
}

fn build_plan(loaded: &LoadedScore, token: u32) -> RenderPlan {
    let window = loaded.window;
    let window_measures = measures_in_window(
        &loaded.measures,
        window.start,
        window.end,
        loaded.beats_per_measure,
    );
    let window_notes: Vec<NoteEvent> = window_measures
        .iter()
        .flat_map(|m| m.notes.iter().cloned())
        .collect();
    RenderPlan {
        token,
        engine: loaded.engine,
        instrument_name: loaded.instrument.name.clone(),
        clef: choose_clef(&window_notes),
        window_start: window.start,
        window_end: window.end,
        total_measures: window.total_measures,
        beats_per_measure: loaded.beats_per_measure,
        measures: window_measures
            .iter()
            .map(|m| MeasurePlan::from_measure(m, loaded.beats_per_measure))
            .collect(),
        musicxml: None,
    }
}
