//! JavaScript-facing API
//!
//! Every export lives here. State is WASM-owned: the score session, the
//! notation view, the comparison board, panel bookkeeping, and the settings
//! snapshot all sit behind module statics, and JavaScript talks to them
//! through the exported functions only. Callbacks registered from JS
//! (the render sink, the settings listener, engine probes) are stored in
//! thread locals because JS values cannot cross threads.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Mutex;

use lazy_static::lazy_static;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use crate::api::helpers::{deserialize, domain_error, serialize, validation_error};
use crate::client::{BackendClient, CompletionsClient};
use crate::comparison::{
    ComparisonBoard, HighlightShape, SelectionChange, SelectionError, ZoomRange,
};
use crate::measures::{group_by_measure, measure_of};
use crate::models::{
    AnalysisReport, AnalysisRequest, AppSettings, ChatProfile, Instrument, NoteEvent,
    PianoRollData, PromptKind, ScoreSummary, SettingsStore,
};
use crate::notation::{
    validate_markup, EngineKind, NavigationWindow, PaginatedNotationView, RenderAck,
    RenderOutcome, RenderPlan, ViewError, ViewState,
};
use crate::panels::{
    comparison_prompt, comparison_query_prompt, panel_query_prompt, piano_roll_prompt,
    AiQueryWidget, ChatPanel, PanelRegistry,
};
use crate::readiness::{PresenceWatch, ReadinessGate, ReadinessState, WatchConfig, WatchStep};
use crate::stats::analyze_notes;
use crate::{wasm_error, wasm_info, wasm_warn};

// ============================================================================
// WASM-owned state
// ============================================================================

/// Everything tied to one uploaded score. Replaced wholesale on the next
/// upload.
struct Session {
    summary: ScoreSummary,
    piano_roll: Option<PianoRollData>,
    report: Option<AnalysisReport>,
    advanced: BTreeMap<String, serde_json::Value>,
    board: Option<ComparisonBoard>,
    view: PaginatedNotationView,
    notation_instrument: usize,
}

impl Session {
    fn new(summary: ScoreSummary) -> Self {
        Self {
            summary,
            piano_roll: None,
            report: None,
            advanced: BTreeMap::new(),
            board: None,
            view: PaginatedNotationView::new(),
            notation_instrument: 0,
        }
    }
}

/// Panel and chat bookkeeping, independent of the loaded score.
struct UiState {
    panels: PanelRegistry,
    widgets: BTreeMap<String, AiQueryWidget>,
    chat: ChatPanel,
}

impl UiState {
    fn new() -> Self {
        Self {
            panels: PanelRegistry::new(),
            widgets: BTreeMap::new(),
            chat: ChatPanel::new(),
        }
    }
}

/// One readiness gate per rendering engine, created up front so waiters and
/// signals always reach the same gate.
struct EngineGates {
    high_fidelity: ReadinessGate,
    fallback: ReadinessGate,
}

impl EngineGates {
    fn new() -> Self {
        Self {
            high_fidelity: ReadinessGate::new(EngineKind::HighFidelity.library_name()),
            fallback: ReadinessGate::new(EngineKind::Fallback.library_name()),
        }
    }

    fn for_engine(&self, engine: EngineKind) -> ReadinessGate {
        match engine {
            EngineKind::HighFidelity => self.high_fidelity.clone(),
            EngineKind::Fallback => self.fallback.clone(),
        }
    }
}

lazy_static! {
    static ref SESSION: Mutex<Option<Session>> = Mutex::new(None);
    static ref UI: Mutex<UiState> = Mutex::new(UiState::new());
    static ref SETTINGS: Mutex<SettingsStore> =
        Mutex::new(SettingsStore::new(AppSettings::default()));
    static ref GATES: EngineGates = EngineGates::new();
}

struct WatchHandle {
    engine: EngineKind,
    interval_id: i32,
    // The closure must outlive every interval callback. clear_interval stops
    // further ticks; the handle itself is never removed because a tick may
    // be the caller asking to stop.
    _tick: Closure<dyn FnMut()>,
}

thread_local! {
    static RENDER_SINK: RefCell<Option<js_sys::Function>> = RefCell::new(None);
    static SETTINGS_LISTENER: RefCell<Option<js_sys::Function>> = RefCell::new(None);
    static ENGINE_WATCHES: RefCell<Vec<WatchHandle>> = RefCell::new(Vec::new());
}

// ============================================================================
// Shared plumbing
// ============================================================================

fn with_session<T>(f: impl FnOnce(&mut Session) -> Result<T, JsValue>) -> Result<T, JsValue> {
    let mut guard = SESSION.lock().unwrap();
    let session = guard
        .as_mut()
        .ok_or_else(|| JsValue::from_str("No score loaded"))?;
    f(session)
}

fn parse_engine(name: &str) -> Result<EngineKind, JsValue> {
    EngineKind::parse(name)
        .ok_or_else(|| validation_error(format!("unknown notation engine '{}'", name)))
}

fn view_error(err: ViewError) -> JsValue {
    match err {
        ViewError::WindowOutOfRange { .. }
        | ViewError::WindowInverted { .. }
        | ViewError::EmptyScore => validation_error(err.to_string()),
        other => domain_error(other),
    }
}

fn selection_error(err: SelectionError) -> JsValue {
    validation_error(err.to_string())
}

fn find_instrument(session: &Session, index: usize) -> Result<&Instrument, JsValue> {
    let roll = session
        .piano_roll
        .as_ref()
        .ok_or_else(|| JsValue::from_str("Piano roll data not loaded"))?;
    roll.instruments
        .iter()
        .find(|i| i.index == index)
        .ok_or_else(|| validation_error(format!("no instrument with index {}", index)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EngineStatus {
    library: String,
    state: &'static str,
    reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotationStatus {
    state: String,
    reason: Option<String>,
    engine: Option<&'static str>,
    instrument: Option<String>,
    token: u32,
    window: Option<NavigationWindow>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectionUpdate {
    selected: bool,
    color: Option<&'static str>,
    selection: Vec<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HighlightUpdate {
    shape: HighlightShape,
    zoom: ZoomRange,
}

// ============================================================================
// Engine readiness
// ============================================================================

/// Start polling for a rendering engine's global. `probe` is called once per
/// interval and should return a truthy value once the library object exists.
/// The schedule escalates from a soft warning to a hard timeout that rejects
/// the gate; an engine that was already settled or is already being watched
/// is left alone.
#[wasm_bindgen(js_name = startEngineWatch)]
pub fn start_engine_watch(engine_name: &str, probe: js_sys::Function) -> Result<(), JsValue> {
    wasm_info!("startEngineWatch: {}", engine_name);
    let engine = parse_engine(engine_name)?;
    let gate = GATES.for_engine(engine);
    if gate.settled().is_some() {
        return Ok(());
    }
    let already = ENGINE_WATCHES.with(|w| w.borrow().iter().any(|h| h.engine == engine));
    if already {
        wasm_warn!("watch for {} already running", gate.library());
        return Ok(());
    }

    let config = match engine {
        EngineKind::HighFidelity => WatchConfig::primary(),
        EngineKind::Fallback => WatchConfig::fallback(),
    };
    let mut watch = PresenceWatch::new(gate, config);
    let tick = Closure::wrap(Box::new(move || {
        let present = probe
            .call0(&JsValue::NULL)
            .map(|v| v.is_truthy())
            .unwrap_or(false);
        if watch.tick(present) == WatchStep::Settled {
            stop_engine_watch(engine);
        }
    }) as Box<dyn FnMut()>);

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let interval_id = window.set_interval_with_callback_and_timeout_and_arguments_0(
        tick.as_ref().unchecked_ref(),
        config.poll_interval_ms as i32,
    )?;
    ENGINE_WATCHES.with(|w| {
        w.borrow_mut().push(WatchHandle {
            engine,
            interval_id,
            _tick: tick,
        })
    });
    Ok(())
}

fn stop_engine_watch(engine: EngineKind) {
    ENGINE_WATCHES.with(|watches| {
        if let Some(handle) = watches.borrow().iter().find(|h| h.engine == engine) {
            if let Some(window) = web_sys::window() {
                window.clear_interval_with_handle(handle.interval_id);
            }
        }
    });
}

/// Settle an engine's gate as usable, e.g. from the library's own `onload`.
/// Returns whether this call was the one that settled it.
#[wasm_bindgen(js_name = signalEngineReady)]
pub fn signal_engine_ready(engine_name: &str) -> Result<bool, JsValue> {
    wasm_info!("signalEngineReady: {}", engine_name);
    let engine = parse_engine(engine_name)?;
    Ok(GATES.for_engine(engine).signal_ready())
}

/// Settle an engine's gate as failed, e.g. from a script tag `onerror`.
#[wasm_bindgen(js_name = signalEngineFailed)]
pub fn signal_engine_failed(engine_name: &str, reason: Option<String>) -> Result<bool, JsValue> {
    wasm_info!("signalEngineFailed: {}", engine_name);
    let engine = parse_engine(engine_name)?;
    let gate = GATES.for_engine(engine);
    let reason = reason.unwrap_or_else(|| format!("{} failed to load", gate.library()));
    Ok(gate.signal_failed(reason))
}

#[wasm_bindgen(js_name = engineStatus)]
pub fn engine_status(engine_name: &str) -> Result<JsValue, JsValue> {
    let engine = parse_engine(engine_name)?;
    let gate = GATES.for_engine(engine);
    let (state, reason) = match gate.state() {
        ReadinessState::Pending => ("pending", None),
        ReadinessState::Resolved => ("ready", None),
        ReadinessState::Rejected(err) => ("failed", Some(err.to_string())),
    };
    serialize(
        &EngineStatus {
            library: gate.library(),
            state,
            reason,
        },
        "engine status",
    )
}

/// Promise resolving with the library name once the engine is usable, or
/// rejecting with the gate's failure. Settled gates answer immediately.
#[wasm_bindgen(js_name = waitForEngine)]
pub fn wait_for_engine(engine_name: &str) -> Result<js_sys::Promise, JsValue> {
    let engine = parse_engine(engine_name)?;
    let gate = GATES.for_engine(engine);
    Ok(future_to_promise(async move {
        gate.wait().await.map_err(domain_error)?;
        Ok(JsValue::from_str(&gate.library()))
    }))
}

// ============================================================================
// Score session
// ============================================================================

/// Upload a score file and open a fresh session from the returned summary.
/// Resolves with the summary.
#[wasm_bindgen(js_name = uploadScore)]
pub fn upload_score(file: web_sys::File) -> js_sys::Promise {
    wasm_info!("uploadScore: {}", file.name());
    future_to_promise(async move {
        let summary = BackendClient::default()
            .upload(&file)
            .await
            .map_err(domain_error)?;
        open_session(summary)
    })
}

/// Open a session from an already-fetched summary, without touching the
/// network.
#[wasm_bindgen(js_name = loadScore)]
pub fn load_score(summary: JsValue) -> Result<JsValue, JsValue> {
    wasm_info!("loadScore");
    let summary: ScoreSummary = deserialize(summary, "score summary")?;
    open_session(summary)
}

fn open_session(summary: ScoreSummary) -> Result<JsValue, JsValue> {
    if summary.total_measures == 0 {
        return Err(validation_error("score has no measures"));
    }
    let value = serialize(&summary, "score summary")?;
    *SESSION.lock().unwrap() = Some(Session::new(summary));
    Ok(value)
}

#[wasm_bindgen(js_name = scoreSummary)]
pub fn score_summary() -> Result<JsValue, JsValue> {
    with_session(|session| serialize(&session.summary, "score summary"))
}

#[wasm_bindgen(js_name = closeScore)]
pub fn close_score() {
    wasm_info!("closeScore");
    *SESSION.lock().unwrap() = None;
}

// ============================================================================
// Analysis and reports
// ============================================================================

/// Run the configured analyses over the loaded score. The report is kept for
/// [`download_report`] and resolved back to the caller.
#[wasm_bindgen(js_name = fetchAnalysis)]
pub fn fetch_analysis(request: JsValue) -> js_sys::Promise {
    wasm_info!("fetchAnalysis");
    future_to_promise(async move {
        let request: AnalysisRequest = deserialize(request, "analysis request")?;
        let report = BackendClient::default()
            .analyze(&request)
            .await
            .map_err(domain_error)?;
        let value = serialize(&report, "analysis report")?;
        with_session(|session| {
            session.report = Some(report);
            Ok(())
        })?;
        Ok(value)
    })
}

/// Fetch the last report as a downloadable text file. Resolves with the
/// bytes as a `Uint8Array`.
#[wasm_bindgen(js_name = downloadReport)]
pub fn download_report() -> Result<js_sys::Promise, JsValue> {
    wasm_info!("downloadReport");
    let report = with_session(|session| {
        session
            .report
            .clone()
            .ok_or_else(|| JsValue::from_str("No analysis report loaded"))
    })?;
    Ok(future_to_promise(async move {
        let bytes = BackendClient::default()
            .download_report(&report)
            .await
            .map_err(domain_error)?;
        Ok(js_sys::Uint8Array::from(bytes.as_slice()).into())
    }))
}

/// One advanced analysis pass; the result shape depends on the type and is
/// passed through as-is. Fetched sections are cached per score, so
/// reopening a section is free; errors are never cached.
#[wasm_bindgen(js_name = advancedAnalysis)]
pub fn advanced_analysis(analysis_type: String) -> Result<js_sys::Promise, JsValue> {
    wasm_info!("advancedAnalysis: {}", analysis_type);
    let (file_path, cached) = with_session(|session| {
        Ok((
            session.summary.file_path.clone(),
            session.advanced.get(&analysis_type).cloned(),
        ))
    })?;
    if let Some(value) = cached {
        return Ok(js_sys::Promise::resolve(&serialize(
            &value,
            "advanced analysis result",
        )?));
    }
    Ok(future_to_promise(async move {
        let value = BackendClient::default()
            .advanced_analysis(&file_path, &analysis_type)
            .await
            .map_err(domain_error)?;
        let serialized = serialize(&value, "advanced analysis result")?;
        // cache only if the same score is still open
        if let Some(session) = SESSION.lock().unwrap().as_mut() {
            if session.summary.file_path == file_path {
                session.advanced.insert(analysis_type, value);
            }
        }
        Ok(serialized)
    }))
}

// ============================================================================
// Piano roll
// ============================================================================

/// Fetch per-instrument note events for the loaded score. Resolves with the
/// data and keeps it for the notation and stats paths.
#[wasm_bindgen(js_name = fetchPianoRoll)]
pub fn fetch_piano_roll() -> Result<js_sys::Promise, JsValue> {
    wasm_info!("fetchPianoRoll");
    let file_path = with_session(|session| Ok(session.summary.file_path.clone()))?;
    Ok(future_to_promise(async move {
        let data = BackendClient::default()
            .piano_roll(&file_path)
            .await
            .map_err(domain_error)?;
        let value = serialize(&data, "piano roll data")?;
        with_session(|session| {
            session.piano_roll = Some(data);
            Ok(())
        })?;
        Ok(value)
    }))
}

/// Statistics digest for one instrument, or `null` when it has no notes.
#[wasm_bindgen(js_name = pianoRollStats)]
pub fn piano_roll_stats(instrument_index: usize) -> Result<JsValue, JsValue> {
    with_session(|session| {
        let instrument = find_instrument(session, instrument_index)?;
        match analyze_notes(&instrument.notes) {
            Some(stats) => serialize(&stats, "note stats"),
            None => Ok(JsValue::NULL),
        }
    })
}

/// AI analysis of one instrument: digest the notes locally, interpolate the
/// piano-roll prompt template, and send both through the analysis endpoint.
#[wasm_bindgen(js_name = pianoRollAiQuery)]
pub fn piano_roll_ai_query(instrument_index: usize) -> Result<js_sys::Promise, JsValue> {
    wasm_info!("pianoRollAiQuery: instrument {}", instrument_index);
    let instrument =
        with_session(|session| find_instrument(session, instrument_index).map(|i| i.clone()))?;
    let stats = analyze_notes(&instrument.notes)
        .ok_or_else(|| validation_error("instrument has no notes to analyze"))?;
    let (template, agent) = {
        let store = SETTINGS.lock().unwrap();
        (
            store.settings().prompt_text(PromptKind::PianoRoll).to_string(),
            store.settings().agent,
        )
    };
    let prompt = piano_roll_prompt(&template, &instrument.name, &stats).map_err(domain_error)?;
    let instruments = vec![instrument];
    Ok(future_to_promise(async move {
        let answer = BackendClient::default()
            .analyze_with_ai(&instruments, &prompt, agent)
            .await
            .map_err(domain_error)?;
        Ok(JsValue::from_str(&answer))
    }))
}

// ============================================================================
// Notation
// ============================================================================

/// Open the notation view for one instrument. The sync part stages the view;
/// the returned promise waits for the engine's readiness gate, issues the
/// first render on resolution, and resolves with the view status.
#[wasm_bindgen(js_name = openNotation)]
pub fn open_notation(
    instrument_index: usize,
    engine_name: &str,
) -> Result<js_sys::Promise, JsValue> {
    wasm_info!("openNotation: instrument {} via {}", instrument_index, engine_name);
    let engine = parse_engine(engine_name)?;
    with_session(|session| {
        let roll = session
            .piano_roll
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Piano roll data not loaded"))?;
        let instrument = roll
            .instruments
            .iter()
            .find(|i| i.index == instrument_index)
            .cloned()
            .ok_or_else(|| {
                validation_error(format!("no instrument with index {}", instrument_index))
            })?;
        let beats = session.summary.measure_duration_beats;
        let total = session.summary.total_measures;
        session
            .view
            .load(engine, instrument, beats, total, None)
            .map_err(view_error)?;
        session.notation_instrument = instrument_index;
        Ok(())
    })?;
    Ok(await_engine_and_render(engine))
}

/// After a failed engine or render, switch the staged view to the other
/// engine and wait for its gate in turn.
#[wasm_bindgen(js_name = retryNotation)]
pub fn retry_notation() -> Result<js_sys::Promise, JsValue> {
    wasm_info!("retryNotation");
    let engine = with_session(|session| session.view.retry_alternate().map_err(view_error))?;
    Ok(await_engine_and_render(engine))
}

fn await_engine_and_render(engine: EngineKind) -> js_sys::Promise {
    let gate = GATES.for_engine(engine);
    future_to_promise(async move {
        match gate.wait().await {
            Ok(()) => {
                let plan =
                    with_session(|session| session.view.gate_resolved().map_err(view_error))?;
                issue_plan(plan)?;
                notation_state_value()
            }
            Err(err) => {
                let message = err.to_string();
                let _ = with_session(|session| Ok(session.view.gate_failed(&message)));
                Err(domain_error(err))
            }
        }
    })
}

/// Jump the view to an explicit measure window.
#[wasm_bindgen(js_name = setNotationWindow)]
pub fn set_notation_window(start: u32, end: u32) -> Result<JsValue, JsValue> {
    wasm_info!("setNotationWindow: {}-{}", start, end);
    let plan = with_session(|session| session.view.set_window(start, end).map_err(view_error))?;
    issue_plan(plan)?;
    notation_state_value()
}

/// Advance the window one page. At the last page this is a no-op and the
/// unchanged status is returned.
#[wasm_bindgen(js_name = nextNotationPage)]
pub fn next_notation_page() -> Result<JsValue, JsValue> {
    wasm_info!("nextNotationPage");
    turn_page(true)
}

/// Move the window one page back, clamping at measure 1.
#[wasm_bindgen(js_name = previousNotationPage)]
pub fn previous_notation_page() -> Result<JsValue, JsValue> {
    wasm_info!("previousNotationPage");
    turn_page(false)
}

fn turn_page(forward: bool) -> Result<JsValue, JsValue> {
    let plan = with_session(|session| {
        let plan = if forward {
            session.view.next()
        } else {
            session.view.previous()
        };
        plan.map_err(view_error)
    })?;
    if let Some(plan) = plan {
        issue_plan(plan)?;
    }
    notation_state_value()
}

/// Acknowledge a render the sink finished. Stale tokens are reported back
/// and otherwise ignored.
#[wasm_bindgen(js_name = completeRender)]
pub fn complete_render(token: u32, success: bool, reason: Option<String>) -> Result<JsValue, JsValue> {
    wasm_info!("completeRender: token {} success {}", token, success);
    let outcome = if success {
        RenderOutcome::Done
    } else {
        RenderOutcome::Failed(reason.unwrap_or_else(|| "render failed".to_string()))
    };
    let ack = with_session(|session| Ok(session.view.complete_render(token, outcome)))?;
    Ok(JsValue::from_str(match ack {
        RenderAck::Applied => "applied",
        RenderAck::Stale => "stale",
    }))
}

#[wasm_bindgen(js_name = notationState)]
pub fn notation_state() -> Result<JsValue, JsValue> {
    notation_state_value()
}

/// Register the callback that actually draws render plans. One sink serves
/// both engines; the plan says which library to use.
#[wasm_bindgen(js_name = registerRenderSink)]
pub fn register_render_sink(callback: js_sys::Function) {
    wasm_info!("registerRenderSink");
    RENDER_SINK.with(|sink| *sink.borrow_mut() = Some(callback));
}

fn notation_state_value() -> Result<JsValue, JsValue> {
    with_session(|session| {
        let (state, reason) = match session.view.state() {
            ViewState::Failed(message) => ("failed".to_string(), Some(message.clone())),
            other => (other.name().to_string(), None),
        };
        serialize(
            &NotationStatus {
                state,
                reason,
                engine: session.view.engine().map(|e| e.wire_name()),
                instrument: session.view.instrument_name().map(|s| s.to_string()),
                token: session.view.current_token(),
                window: session.view.window(),
            },
            "notation status",
        )
    })
}

/// Hand a plan to the render sink. Fallback plans carry everything they need
/// and go out immediately; high-fidelity plans first fetch the markup for
/// the window, and a fetch or validation failure fails the render so the
/// view can offer a retry.
fn issue_plan(plan: RenderPlan) -> Result<(), JsValue> {
    match plan.engine {
        EngineKind::Fallback => dispatch_plan(&plan),
        EngineKind::HighFidelity => {
            let (file_path, instrument_index) = with_session(|session| {
                Ok((session.summary.file_path.clone(), session.notation_instrument))
            })?;
            spawn_local(async move {
                let markup = BackendClient::default()
                    .instrument_markup(
                        &file_path,
                        instrument_index,
                        plan.window_start,
                        plan.window_end,
                    )
                    .await;
                match markup {
                    Ok(xml) => match validate_markup(&xml) {
                        Ok(()) => {
                            let plan = plan.with_musicxml(xml);
                            if let Err(err) = dispatch_plan(&plan) {
                                wasm_error!("render dispatch failed: {:?}", err);
                            }
                        }
                        Err(reason) => fail_render(plan.token, reason),
                    },
                    Err(err) => fail_render(plan.token, err.to_string()),
                }
            });
            Ok(())
        }
    }
}

fn dispatch_plan(plan: &RenderPlan) -> Result<(), JsValue> {
    let value = serialize(plan, "render plan")?;
    RENDER_SINK.with(|sink| match sink.borrow().as_ref() {
        Some(callback) => callback.call1(&JsValue::NULL, &value).map(|_| ()),
        None => {
            wasm_warn!("no render sink registered, dropping plan {}", plan.token);
            Ok(())
        }
    })
}

fn fail_render(token: u32, reason: String) {
    wasm_warn!("render {} failed before dispatch: {}", token, reason);
    let mut guard = SESSION.lock().unwrap();
    if let Some(session) = guard.as_mut() {
        session.view.complete_render(token, RenderOutcome::Failed(reason));
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Fetch comparison data for the loaded score and reset the board. Resolves
/// with the instrument names in display order.
#[wasm_bindgen(js_name = fetchComparisonData)]
pub fn fetch_comparison_data() -> Result<js_sys::Promise, JsValue> {
    wasm_info!("fetchComparisonData");
    let file_path = with_session(|session| Ok(session.summary.file_path.clone()))?;
    Ok(future_to_promise(async move {
        let data = BackendClient::default()
            .comparison_data(&file_path)
            .await
            .map_err(domain_error)?;
        let board = ComparisonBoard::new(data);
        let names: Vec<String> = board
            .instrument_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let value = serialize(&names, "instrument names")?;
        with_session(|session| {
            session.board = Some(board);
            Ok(())
        })?;
        Ok(value)
    }))
}

/// Checkbox semantics: select when absent, deselect when present. Returns
/// the new selection with the instrument's color, if any.
#[wasm_bindgen(js_name = toggleComparisonInstrument)]
pub fn toggle_comparison_instrument(index: usize) -> Result<JsValue, JsValue> {
    wasm_info!("toggleComparisonInstrument: {}", index);
    with_session(|session| {
        let board = session
            .board
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Comparison data not loaded"))?;
        let change = board.toggle(index).map_err(selection_error)?;
        serialize(
            &SelectionUpdate {
                selected: change == SelectionChange::Selected,
                color: board.color_of(index),
                selection: board.selected().to_vec(),
            },
            "selection update",
        )
    })
}

/// Show or hide one selected instrument's traces without changing the
/// selection. Unselected indices are ignored. Returns the visibility after
/// the call.
#[wasm_bindgen(js_name = setComparisonVisibility)]
pub fn set_comparison_visibility(index: usize, visible: bool) -> Result<bool, JsValue> {
    with_session(|session| {
        let board = session
            .board
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Comparison data not loaded"))?;
        board.set_visible(index, visible);
        Ok(board.is_visible(index))
    })
}

#[wasm_bindgen(js_name = clearComparisonSelection)]
pub fn clear_comparison_selection() -> Result<(), JsValue> {
    with_session(|session| {
        if let Some(board) = session.board.as_mut() {
            board.clear_selection();
        }
        Ok(())
    })
}

/// Full overlay shape list for a chart redraw.
#[wasm_bindgen(js_name = comparisonShapes)]
pub fn comparison_shapes() -> Result<JsValue, JsValue> {
    with_session(|session| {
        let board = session
            .board
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Comparison data not loaded"))?;
        serialize(&board.shapes(), "comparison shapes")
    })
}

#[wasm_bindgen(js_name = comparisonColor)]
pub fn comparison_color(index: usize) -> Result<Option<String>, JsValue> {
    with_session(|session| {
        let board = session
            .board
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Comparison data not loaded"))?;
        Ok(board.color_of(index).map(|c| c.to_string()))
    })
}

/// Highlight a measure range on the chart, replacing any prior highlight.
/// Returns the shape plus a zoom hint spanning the range.
#[wasm_bindgen(js_name = highlightComparisonRange)]
pub fn highlight_comparison_range(
    start_measure: u32,
    end_measure: u32,
) -> Result<JsValue, JsValue> {
    wasm_info!("highlightComparisonRange: {}-{}", start_measure, end_measure);
    with_session(|session| {
        let board = session
            .board
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Comparison data not loaded"))?;
        let (shape, zoom) = board
            .highlight_range(start_measure, end_measure)
            .map_err(selection_error)?;
        serialize(&HighlightUpdate { shape, zoom }, "highlight update")
    })
}

#[wasm_bindgen(js_name = clearComparisonHighlight)]
pub fn clear_comparison_highlight() -> Result<(), JsValue> {
    with_session(|session| {
        if let Some(board) = session.board.as_mut() {
            board.clear_highlight();
        }
        Ok(())
    })
}

/// Combined markup for the selected instruments over a measure range, for
/// rendering the comparison as notation. Resolves with the markup text.
#[wasm_bindgen(js_name = comparisonMarkup)]
pub fn comparison_markup(
    start_measure: u32,
    end_measure: u32,
) -> Result<js_sys::Promise, JsValue> {
    wasm_info!("comparisonMarkup: measures {}-{}", start_measure, end_measure);
    if start_measure < 1 || end_measure < start_measure {
        return Err(validation_error(format!(
            "invalid measure range {}-{}",
            start_measure, end_measure
        )));
    }
    let (file_path, indices) = with_session(|session| {
        let board = session
            .board
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Comparison data not loaded"))?;
        if board.selected().is_empty() {
            return Err(selection_error(SelectionError::NothingSelected));
        }
        Ok((session.summary.file_path.clone(), board.selected().to_vec()))
    })?;
    Ok(future_to_promise(async move {
        let xml = BackendClient::default()
            .combined_markup(&file_path, &indices, start_measure, end_measure)
            .await
            .map_err(domain_error)?;
        validate_markup(&xml).map_err(domain_error)?;
        Ok(JsValue::from_str(&xml))
    }))
}

/// AI comparison of the selected instruments over a measure range. The note
/// lines are rendered locally, interpolated into the comparison template,
/// and sent with the filtered notes.
#[wasm_bindgen(js_name = comparisonAiQuery)]
pub fn comparison_ai_query(
    start_measure: u32,
    end_measure: u32,
) -> Result<js_sys::Promise, JsValue> {
    wasm_info!("comparisonAiQuery: measures {}-{}", start_measure, end_measure);
    let (described, per_instrument) = with_session(|session| {
        let board = session
            .board
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Comparison data not loaded"))?;
        let described = board
            .describe_notes_in_range(start_measure, end_measure)
            .map_err(selection_error)?;
        let per_instrument = board
            .notes_in_range(start_measure, end_measure)
            .map_err(selection_error)?;
        Ok((described, per_instrument))
    })?;
    let (template, agent) = {
        let store = SETTINGS.lock().unwrap();
        (
            store.settings().prompt_text(PromptKind::Comparison).to_string(),
            store.settings().agent,
        )
    };
    let body = comparison_prompt(&template, start_measure, end_measure, &described)
        .map_err(domain_error)?;
    let prompt = comparison_query_prompt(start_measure, end_measure, &body);
    let instruments: Vec<Instrument> = per_instrument
        .into_iter()
        .enumerate()
        .map(|(position, (name, notes))| Instrument {
            index: position,
            name,
            notes,
        })
        .collect();
    Ok(future_to_promise(async move {
        let answer = BackendClient::default()
            .analyze_with_ai(&instruments, &prompt, agent)
            .await
            .map_err(domain_error)?;
        Ok(JsValue::from_str(&answer))
    }))
}

// ============================================================================
// Panels and chat
// ============================================================================

/// Toggle a collapsible panel, returning the new expanded state.
#[wasm_bindgen(js_name = togglePanel)]
pub fn toggle_panel(panel_id: &str) -> bool {
    UI.lock().unwrap().panels.toggle(panel_id)
}

#[wasm_bindgen(js_name = isPanelExpanded)]
pub fn is_panel_expanded(panel_id: &str) -> bool {
    UI.lock().unwrap().panels.is_expanded(panel_id)
}

#[wasm_bindgen(js_name = collapseAllPanels)]
pub fn collapse_all_panels() {
    UI.lock().unwrap().panels.collapse_all();
}

#[wasm_bindgen(js_name = isPanelQueryBusy)]
pub fn is_panel_query_busy(panel_id: &str) -> bool {
    UI.lock()
        .unwrap()
        .widgets
        .get(panel_id)
        .map(|w| w.is_busy())
        .unwrap_or(false)
}

/// Follow-up question about one report section, answered by the configured
/// chat completions endpoint. The panel's widget stays busy until the
/// promise settles, so a second submit is rejected while one is in flight.
#[wasm_bindgen(js_name = panelAiQuery)]
pub fn panel_ai_query(
    panel_id: &str,
    section_title: &str,
    content_text: &str,
    user_prompt: &str,
) -> Result<js_sys::Promise, JsValue> {
    wasm_info!("panelAiQuery: {}", panel_id);
    {
        let mut ui = UI.lock().unwrap();
        let widget = ui
            .widgets
            .entry(panel_id.to_string())
            .or_insert_with(AiQueryWidget::new);
        widget
            .begin(user_prompt)
            .map_err(|e| validation_error(e.to_string()))?;
    }
    let (fixed, profile) = {
        let store = SETTINGS.lock().unwrap();
        (
            store
                .settings()
                .prompt_text(PromptKind::GeneralPanel)
                .to_string(),
            store.settings().active_profile(),
        )
    };
    let prompt = panel_query_prompt(user_prompt, section_title, content_text, &fixed);
    let panel_id = panel_id.to_string();
    Ok(future_to_promise(async move {
        let outcome = query_completions(profile, prompt).await;
        if let Some(widget) = UI.lock().unwrap().widgets.get_mut(&panel_id) {
            widget.finish();
        }
        outcome.map(|answer| JsValue::from_str(&answer))
    }))
}

async fn query_completions(profile: ChatProfile, prompt: String) -> Result<String, JsValue> {
    let client = CompletionsClient::new(profile).map_err(domain_error)?;
    client.complete(&prompt).await.map_err(domain_error)
}

/// One chat turn through the server-mediated endpoint. The user message is
/// added to the transcript up front; the reply (or an error line) is added
/// when the request settles.
#[wasm_bindgen(js_name = sendChatMessage)]
pub fn send_chat_message(message: &str) -> Result<js_sys::Promise, JsValue> {
    wasm_info!("sendChatMessage");
    UI.lock()
        .unwrap()
        .chat
        .send(message)
        .map_err(|e| validation_error(e.to_string()))?;
    let agent = SETTINGS.lock().unwrap().settings().agent;
    let message = message.to_string();
    Ok(future_to_promise(async move {
        match BackendClient::default().chat(&message, agent).await {
            Ok(reply) => {
                UI.lock().unwrap().chat.receive(&reply);
                Ok(JsValue::from_str(&reply))
            }
            Err(err) => {
                UI.lock().unwrap().chat.receive(&format!("Error: {}", err));
                Err(domain_error(err))
            }
        }
    }))
}

#[wasm_bindgen(js_name = chatTranscript)]
pub fn chat_transcript() -> Result<JsValue, JsValue> {
    let ui = UI.lock().unwrap();
    serialize(&ui.chat.messages(), "chat transcript")
}

// ============================================================================
// Settings and prompts
// ============================================================================

/// Fetch the server's settings and replace the local snapshot. Resolves with
/// whether anything changed; a change also notifies the settings listener.
#[wasm_bindgen(js_name = refreshSettings)]
pub fn refresh_settings() -> js_sys::Promise {
    wasm_info!("refreshSettings");
    future_to_promise(async move {
        let fetched = BackendClient::default()
            .settings()
            .await
            .map_err(domain_error)?;
        apply_settings(fetched)
    })
}

/// Persist settings to the server, then apply them locally.
#[wasm_bindgen(js_name = updateSettings)]
pub fn update_settings(settings: JsValue) -> Result<js_sys::Promise, JsValue> {
    wasm_info!("updateSettings");
    let settings: AppSettings = deserialize(settings, "settings")?;
    Ok(future_to_promise(async move {
        BackendClient::default()
            .save_settings(&settings)
            .await
            .map_err(domain_error)?;
        apply_settings(settings)
    }))
}

#[wasm_bindgen(js_name = currentSettings)]
pub fn current_settings() -> Result<JsValue, JsValue> {
    let store = SETTINGS.lock().unwrap();
    serialize(store.settings(), "settings")
}

/// Register the callback invoked with the new settings whenever the local
/// snapshot actually changes.
#[wasm_bindgen(js_name = registerSettingsListener)]
pub fn register_settings_listener(callback: js_sys::Function) {
    wasm_info!("registerSettingsListener");
    SETTINGS_LISTENER.with(|listener| *listener.borrow_mut() = Some(callback));
}

fn apply_settings(next: AppSettings) -> Result<JsValue, JsValue> {
    let changed = SETTINGS.lock().unwrap().replace(next);
    if changed {
        notify_settings_listener()?;
    }
    Ok(JsValue::from_bool(changed))
}

fn notify_settings_listener() -> Result<(), JsValue> {
    let value = {
        let store = SETTINGS.lock().unwrap();
        serialize(store.settings(), "settings")?
    };
    SETTINGS_LISTENER.with(|listener| {
        if let Some(callback) = listener.borrow().as_ref() {
            callback.call1(&JsValue::NULL, &value)?;
        }
        Ok(())
    })
}

/// Fetch the effective prompt templates (defaults merged with overrides) and
/// fold them into the settings snapshot. Resolves with the template map.
#[wasm_bindgen(js_name = refreshPrompts)]
pub fn refresh_prompts() -> js_sys::Promise {
    wasm_info!("refreshPrompts");
    future_to_promise(async move {
        let prompts = BackendClient::default()
            .prompts()
            .await
            .map_err(domain_error)?;
        let value = serialize(&prompts, "prompt templates")?;
        let mut updated = SETTINGS.lock().unwrap().settings().clone();
        updated.ai_prompts = prompts;
        apply_settings(updated)?;
        Ok(value)
    })
}

/// Persist prompt overrides, then fold them into the settings snapshot.
#[wasm_bindgen(js_name = savePrompts)]
pub fn save_prompts(prompts: JsValue) -> Result<js_sys::Promise, JsValue> {
    wasm_info!("savePrompts");
    let prompts: BTreeMap<String, String> = deserialize(prompts, "prompt templates")?;
    Ok(future_to_promise(async move {
        BackendClient::default()
            .save_prompts(&prompts)
            .await
            .map_err(domain_error)?;
        let mut updated = SETTINGS.lock().unwrap().settings().clone();
        updated.ai_prompts = prompts;
        apply_settings(updated)
    }))
}

// ============================================================================
// Measure arithmetic
// ============================================================================

/// 1-indexed measure number owning a beat offset.
#[wasm_bindgen(js_name = measureNumberAt)]
pub fn measure_number_at(start_beat: f64, beats_per_measure: f64) -> Result<u32, JsValue> {
    if !(beats_per_measure > 0.0) {
        return Err(validation_error(format!(
            "beats per measure must be positive, got {}",
            beats_per_measure
        )));
    }
    Ok(measure_of(start_beat, beats_per_measure))
}

/// Bucket a note list into measures, for callers that chart by measure.
#[wasm_bindgen(js_name = groupNotesByMeasure)]
pub fn group_notes_by_measure(notes: JsValue, beats_per_measure: f64) -> Result<JsValue, JsValue> {
    let notes: Vec<NoteEvent> = deserialize(notes, "note list")?;
    let measures = group_by_measure(&notes, beats_per_measure)
        .map_err(|e| validation_error(e.to_string()))?;
    serialize(&measures, "measure buckets")
}
