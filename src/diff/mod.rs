//! Two-level diff engine: metadata-level depot diff and raw-dump line diff

pub mod tracker;
pub mod unified;

pub use tracker::{
    categorize_strings, depot_name, enhance_with_string_analysis, process_update, CategoryBlock,
    DepotChange, DiffResult, UpdateType,
};
pub use unified::generate_unified_diff;
