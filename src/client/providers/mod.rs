pub mod acl;
pub mod arxiv;
pub mod dblp;
pub mod query;
pub mod scholar;
pub mod scopus;
pub mod traits;

pub use acl::AclAnthologyProvider;
pub use arxiv::ArxivProvider;
pub use dblp::DblpProvider;
pub use scholar::ScholarProvider;
pub use scopus::ScopusProvider;
pub use traits::{
    ProviderError, QueryLog, SearchQuery, SourceProvider, YearFilter, DEFAULT_MAX_RESULTS,
};
