// Paging lifecycle for the windowed notation view

use analyzer_wasm::models::{Instrument, NoteEvent};
use analyzer_wasm::notation::{
    Clef, EngineKind, PaginatedNotationView, RenderAck, RenderOutcome, ViewError, ViewState,
};

/// One note per beat in 4/4, a repeating C major scale, `measures` long
fn scale_instrument(measures: u32) -> Instrument {
    const SCALE: [u8; 8] = [60, 62, 64, 65, 67, 69, 71, 72];
    let notes = (0..measures * 4)
        .map(|beat| {
            let mut note = NoteEvent::new(SCALE[beat as usize % SCALE.len()], beat as f64, 1.0);
            note.velocity = 80;
            note
        })
        .collect();
    Instrument {
        index: 0,
        name: "Violin I".to_string(),
        notes,
    }
}

/// View loaded on the fallback engine with the first render acknowledged
fn rendered_view(measures: u32) -> PaginatedNotationView {
    let mut view = PaginatedNotationView::new();
    view.load(EngineKind::Fallback, scale_instrument(measures), 4.0, measures, None)
        .expect("load should succeed");
    let plan = view.gate_resolved().expect("first render");
    assert_eq!(view.complete_render(plan.token, RenderOutcome::Done), RenderAck::Applied);
    view
}

#[test]
fn test_first_render_covers_the_default_window() {
    let mut view = PaginatedNotationView::new();
    view.load(EngineKind::Fallback, scale_instrument(12), 4.0, 12, None)
        .expect("load should succeed");
    assert_eq!(*view.state(), ViewState::Loading);

    let plan = view.gate_resolved().expect("gate resolution should render");
    assert_eq!(
        (plan.window_start, plan.window_end, plan.total_measures),
        (1, 4, 12)
    );
    assert_eq!(plan.engine, EngineKind::Fallback);
    assert_eq!(plan.instrument_name, "Violin I");
    assert_eq!(plan.clef, Clef::Treble);
    assert_eq!(plan.measures.len(), 4);
    assert!(plan.musicxml.is_none(), "fallback plans carry no markup");
    assert!(
        plan.measures.iter().all(|m| !m.symbols.is_empty()),
        "every measure in the window has notes"
    );
}

#[test]
fn test_paging_to_the_end_and_back_preserves_window_width() {
    let mut view = rendered_view(10);

    let mut forward = Vec::new();
    while let Some(plan) = view.next().expect("page forward") {
        view.complete_render(plan.token, RenderOutcome::Done);
        let w = view.window().unwrap();
        forward.push((w.start, w.end));
    }
    assert_eq!(forward, vec![(5, 8), (7, 10)], "forward pages clamp at the end");

    // another page forward at the boundary stays put
    assert!(view.next().expect("boundary page").is_none());
    assert_eq!(*view.state(), ViewState::Rendered, "boundary no-op leaves the view settled");

    let mut back = Vec::new();
    while let Some(plan) = view.previous().expect("page back") {
        view.complete_render(plan.token, RenderOutcome::Done);
        let w = view.window().unwrap();
        back.push((w.start, w.end));
    }
    assert_eq!(back, vec![(3, 6), (1, 4)], "backward pages clamp at measure 1");
    assert!(view.previous().expect("boundary page").is_none());
}

#[test]
fn test_window_jump_supersedes_inflight_render() {
    let mut view = rendered_view(12);
    let first = view.set_window(5, 8).expect("jump");
    // the user jumps again before the sink reports back
    let second = view.set_window(9, 12).expect("second jump");
    assert!(second.token > first.token, "tokens are monotonic");

    assert_eq!(
        view.complete_render(first.token, RenderOutcome::Done),
        RenderAck::Stale,
        "the superseded completion must be discarded"
    );
    assert_eq!(*view.state(), ViewState::Rendering);

    assert_eq!(
        view.complete_render(second.token, RenderOutcome::Done),
        RenderAck::Applied
    );
    assert_eq!(*view.state(), ViewState::Rendered);
    let w = view.window().unwrap();
    assert_eq!((w.start, w.end), (9, 12));
}

#[test]
fn test_invalid_jump_reports_range_and_keeps_state() {
    let mut view = rendered_view(8);
    let err = view.set_window(6, 9).unwrap_err();
    assert_eq!(
        err,
        ViewError::WindowOutOfRange { start: 6, end: 9, total: 8 }
    );
    assert_eq!(err.to_string(), "measures run 1-8, requested 6-9");
    assert_eq!(*view.state(), ViewState::Rendered, "failed jump must not disturb the view");
    let w = view.window().unwrap();
    assert_eq!((w.start, w.end), (1, 4), "window unchanged after rejection");
}

#[test]
fn test_render_failure_then_retry_on_the_alternate_engine() {
    let mut view = rendered_view(6);
    let plan = view.set_window(3, 6).expect("jump");
    view.complete_render(plan.token, RenderOutcome::Failed("glyph cache exhausted".into()));
    assert_eq!(*view.state(), ViewState::Failed("glyph cache exhausted".into()));

    let engine = view.retry_alternate().expect("retry");
    assert_eq!(
        engine,
        EngineKind::HighFidelity,
        "the fallback retries onto the primary engine"
    );
    assert_eq!(*view.state(), ViewState::Loading);

    let plan = view.gate_resolved().expect("render after retry");
    assert_eq!(plan.engine, EngineKind::HighFidelity);
    assert_eq!((plan.window_start, plan.window_end), (3, 6), "retry keeps the window");
    view.complete_render(plan.token, RenderOutcome::Done);
    assert_eq!(*view.state(), ViewState::Rendered);
}
