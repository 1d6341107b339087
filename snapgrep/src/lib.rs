pub mod archive;
pub mod config;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod request;
pub mod results;
pub mod search;

pub use archive::{Archive, ArchiveEntry, ArchiveProvider, MemoryArchive, ZipSnapshot, ZipStore};
pub use config::{Limits, SearchConfig};
pub use errors::{SearchError, SearchResult};
pub use metrics::{ScanMetrics, ScanStats};
pub use request::{PatternRequest, SearchRequest};
pub use results::{FileMatch, LineMatch, SearchOutput};
pub use search::{search, search_repo, CompiledMatcher, ScanOptions, Searcher};
