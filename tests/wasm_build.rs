//! WASM build test
//!
//! Exercises the exported surface that works without a backend: session
//! bootstrap, measure arithmetic, panels, settings, and the engine gates.

use serde_json::json;
use wasm_bindgen_test::*;

use analyzer_wasm::api;
use analyzer_wasm::{AppSettings, ScoreSummary};

wasm_bindgen_test_configure!(run_in_browser);

fn summary_value(total_measures: u32) -> wasm_bindgen::JsValue {
    serde_wasm_bindgen::to_value(&json!({
        "title": "Quartet in G",
        "total_instruments": 2,
        "instrument_names": ["Violin", "Cello"],
        "overall_key": "G major",
        "total_measures": total_measures,
        "time_signatures": ["4/4"],
        "first_time_signature": "4/4",
        "measure_duration_beats": 4.0,
        "file_path": "/tmp/quartet.xml",
    }))
    .unwrap()
}

#[wasm_bindgen_test]
fn test_load_score_and_read_back_summary() {
    api::close_score();
    let loaded = api::load_score(summary_value(8)).expect("load");
    let summary: ScoreSummary = serde_wasm_bindgen::from_value(loaded).unwrap();
    assert_eq!(summary.total_measures, 8);

    let echoed = api::score_summary().expect("summary");
    let echoed: ScoreSummary = serde_wasm_bindgen::from_value(echoed).unwrap();
    assert_eq!(echoed.title, "Quartet in G");

    api::close_score();
    assert!(api::score_summary().is_err(), "no session after close");
}

#[wasm_bindgen_test]
fn test_score_without_measures_is_rejected() {
    api::close_score();
    assert!(api::load_score(summary_value(0)).is_err());
    assert!(api::score_summary().is_err(), "a rejected load opens no session");
}

#[wasm_bindgen_test]
fn test_measure_arithmetic_exports() {
    assert_eq!(api::measure_number_at(0.0, 4.0).unwrap(), 1);
    assert_eq!(api::measure_number_at(7.5, 4.0).unwrap(), 2);
    assert!(api::measure_number_at(1.0, 0.0).is_err());

    let notes = serde_wasm_bindgen::to_value(&json!([
        {"pitch": 60, "start": 0.0, "duration": 1.0},
        {"pitch": 64, "start": 5.0, "duration": 1.0},
    ]))
    .unwrap();
    let buckets = api::group_notes_by_measure(notes, 4.0).expect("grouping");
    let buckets: serde_json::Value = serde_wasm_bindgen::from_value(buckets).unwrap();
    assert_eq!(buckets.as_array().unwrap().len(), 2);
    assert_eq!(buckets[1]["number"], 2);
}

#[wasm_bindgen_test]
fn test_panel_toggles() {
    assert!(!api::is_panel_expanded("harmonic"));
    assert!(api::toggle_panel("harmonic"));
    assert!(api::is_panel_expanded("harmonic"));
    api::collapse_all_panels();
    assert!(!api::is_panel_expanded("harmonic"));
    assert!(!api::is_panel_query_busy("harmonic"));
}

#[wasm_bindgen_test]
fn test_default_settings_snapshot() {
    let value = api::current_settings().expect("settings");
    let settings: AppSettings = serde_wasm_bindgen::from_value(value).unwrap();
    assert_eq!(settings.theme, "dark");
}

#[wasm_bindgen_test]
async fn test_fallback_gate_signalling() {
    assert!(api::signal_engine_ready("fallback").expect("signal"));
    assert!(
        !api::signal_engine_ready("fallback").expect("signal again"),
        "the second signal loses"
    );

    let status = api::engine_status("fallback").expect("status");
    let status: serde_json::Value = serde_wasm_bindgen::from_value(status).unwrap();
    assert_eq!(status["state"], "ready");
    assert_eq!(status["library"], "VexFlow");

    let promise = api::wait_for_engine("fallback").expect("wait");
    let resolved = wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .expect("a ready gate resolves");
    assert_eq!(resolved.as_string().as_deref(), Some("VexFlow"));
}

#[wasm_bindgen_test]
async fn test_failed_gate_rejects_waiters() {
    assert!(api::signal_engine_failed("high_fidelity", Some("script blocked".to_string()))
        .expect("signal"));
    let promise = api::wait_for_engine("high_fidelity").expect("wait");
    let err = wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .expect_err("a failed gate rejects");
    assert!(err
        .as_string()
        .unwrap_or_default()
        .contains("script blocked"));
}

#[wasm_bindgen_test]
fn test_unknown_engine_is_rejected() {
    assert!(api::signal_engine_ready("abcjs").is_err());
    assert!(api::engine_status("").is_err());
}
