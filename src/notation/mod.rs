//! Staff notation: clef selection, symbol mapping, and the paginated view.

pub mod clef;
pub mod engine;
pub mod glyphs;
pub mod view;

pub use clef::{choose_clef, Clef};
pub use engine::{validate_markup, EngineKind, MeasurePlan, RenderPlan};
pub use glyphs::{measure_symbols, pitch_name, StaffSymbol, MAX_SYMBOLS_PER_MEASURE};
pub use view::{
    NavigationWindow, PaginatedNotationView, RenderAck, RenderOutcome, ViewError, ViewState,
};
