pub mod dedup;
pub mod enrich;
pub mod resolve;
pub mod search;

pub use dedup::{group_by_title, normalize_title, DuplicateGroup};
pub use enrich::{sort_for_display, EnrichedPaper, EnrichmentConfig, EnrichmentCoordinator};
pub use resolve::{ConflictResolver, Resolution};
pub use search::{SearchOutcome, SearchTool};
