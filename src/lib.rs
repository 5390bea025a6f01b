pub mod client;
pub mod config;
pub mod error;
pub mod progress;
pub mod resilience;
pub mod tools;

pub use client::{MetaSearchClient, Paper};
pub use client::providers::{SearchQuery, YearFilter};
pub use config::{Config, Credentials};
pub use error::{Error, ErrorCategory, Result};
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use resilience::RetryConfig;
pub use tools::{EnrichedPaper, EnrichmentCoordinator, SearchOutcome, SearchTool};
