pub mod errors;
pub mod result;
pub mod diff;
pub mod reconcile;
pub mod query;
pub mod model;
pub mod sort;
pub mod state;
pub mod store;
pub mod layout;
pub mod entries;
pub mod settings;
pub mod logging;
pub mod browser;

pub use diff::{
    Change,
    ChangeKind,
    TieBreak,
    apply_script,
    coalesce,
    edit_script,
    edit_script_by,
};
pub use reconcile::{
    ChangeListener,
    EntryLoader,
    KeysOnly,
    ListenerId,
    Reconciler,
    UpdateReport,
    loader_fn,
};
pub use query::parse_query;
pub use model::{Experiment, FieldKey, FieldKind, LoadSummary, ResultStats, RunId};
pub use sort::{SortOrder, sort_experiments};
pub use state::{DbFilter, Fields, RowMarker, ViewMode, format_value};
pub use store::{MemoryStore, RunStore, StoreHandle};
pub use layout::{StudyInfo, discover_studies};
pub use entries::{Connection, Database, Study};
pub use settings::{Settings, SettingsStore};
pub use browser::{Browser, BrowserEffect, BrowserEvent, StudyPath};
pub use ordered_float::OrderedFloat;
pub use roaring::RoaringBitmap;
