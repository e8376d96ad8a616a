pub mod freshness;
pub mod reconciler;
pub mod walker;

pub use freshness::{compare, Freshness, StaleReason};
pub use reconciler::{
    delete_source, Collections, ErrorPolicy, FileOutcome, IngestOptions, IngestReport, Reconciler,
    SourceDeletion,
};
pub use walker::{describe_file, resolve_source, walk, FileDescriptor};
