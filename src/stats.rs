//! Per-run counters.

use tracing::info;

use crate::utils::format_count;

/// What happened to the list files and entries of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_skipped_metadata: usize,
    pub files_skipped_category: usize,
    pub files_unreadable: usize,
    pub files_failed: usize,
    pub entries_rejected: usize,
    pub documents: usize,
}

impl RunStats {
    pub fn files_skipped(&self) -> usize {
        self.files_skipped_metadata
            + self.files_skipped_category
            + self.files_unreadable
            + self.files_failed
    }

    pub fn log_summary(&self) {
        info!(
            "Processed {} of {} list files ({} skipped: {} without metadata, {} filtered by category, {} unreadable, {} failed)",
            self.files_processed,
            self.files_found,
            self.files_skipped(),
            self.files_skipped_metadata,
            self.files_skipped_category,
            self.files_unreadable,
            self.files_failed
        );
        info!(
            "Emitted {} documents, rejected {} entries",
            format_count(self.documents),
            format_count(self.entries_rejected)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_skipped_sums_reasons() {
        let stats = RunStats {
            files_found: 10,
            files_processed: 5,
            files_skipped_metadata: 2,
            files_skipped_category: 1,
            files_unreadable: 1,
            files_failed: 1,
            ..Default::default()
        };
        assert_eq!(stats.files_skipped(), 5);
        assert_eq!(stats.files_processed + stats.files_skipped(), stats.files_found);
    }
}
