//! Decides whether a file's stored representation is still current.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::models::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    SizeChanged,
    ModifiedChanged,
    /// A previous run stopped before all chunks were written.
    NotVectorized,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::SizeChanged => write!(f, "size changed"),
            StaleReason::ModifiedChanged => write!(f, "modification time changed"),
            StaleReason::NotVectorized => write!(f, "previous ingestion incomplete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Absent,
    Fresh,
    Stale(StaleReason),
}

/// Compare a stored document with a file's current size and modification time.
///
/// Timestamps are compared as instants, so differently formatted renderings
/// of the same time are equal.
pub fn compare(existing: Option<&Document>, size: u64, m_time: DateTime<Utc>) -> Freshness {
    let Some(doc) = existing else {
        return Freshness::Absent;
    };
    if doc.size != size {
        Freshness::Stale(StaleReason::SizeChanged)
    } else if doc.m_time != m_time {
        Freshness::Stale(StaleReason::ModifiedChanged)
    } else if !doc.vectorized {
        Freshness::Stale(StaleReason::NotVectorized)
    } else {
        Freshness::Fresh
    }
}
