//! Typed failure kinds of the index API, surfaced through [`eyre::Report`]
//! and matched with `downcast_ref::<IndexError>()`.

use thiserror::Error;

/// Failure kinds an index operation can surface.
///
/// I/O and layout failures travel as plain [`eyre::Report`]s with context;
/// this enum covers the conditions callers are expected to branch on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The index file exists but its meta page does not describe the
    /// requested relation, key offset, and key type.
    #[error("index file '{0}' does not match the requested relation and key")]
    BadIndexInfo(String),

    /// Scan operators outside their permitted sets: the low operator must
    /// be `Gt` or `Gte`, the high operator `Lt` or `Lte`.
    #[error("scan operators must be GT/GTE for the low bound and LT/LTE for the high bound")]
    BadOpcodes,

    /// The scan range is empty because the low value exceeds the high value.
    #[error("invalid scan range: low value exceeds high value")]
    BadScanRange,

    /// No key in the index satisfies the scan predicate.
    #[error("no key in the index satisfies the scan predicate")]
    NoSuchKeyFound,

    /// `scan_next` or `end_scan` was called with no scan in progress.
    #[error("no scan is in progress")]
    ScanNotInitialized,

    /// The scan has returned every matching entry. The current leaf stays
    /// pinned until `end_scan` releases it.
    #[error("scan has returned all matching entries")]
    ScanCompleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_downcast_through_eyre() {
        let report = eyre::Report::new(IndexError::BadOpcodes);
        assert_eq!(
            report.downcast_ref::<IndexError>(),
            Some(&IndexError::BadOpcodes)
        );
    }

    #[test]
    fn bad_index_info_names_the_file() {
        let err = IndexError::BadIndexInfo("employees.4".into());
        assert!(err.to_string().contains("employees.4"));
    }
}
