//! Upload tiering and batching of files.

use chronicle_net::FileUpload;
use chronicle_shared::constants::{
    ELEVATED_PREMIUM_TIER, HARD_FILE_LIMIT, LOW_TIER_FILE_LIMIT, MAX_FILES_PER_MESSAGE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTier {
    Upload,
    /// Sent as its source URL instead of being uploaded.
    Deferred,
}

pub fn classify(size: u64, premium_tier: u8) -> FileTier {
    if size >= HARD_FILE_LIMIT {
        return FileTier::Deferred;
    }
    if size > LOW_TIER_FILE_LIMIT && premium_tier < ELEVATED_PREMIUM_TIER {
        return FileTier::Deferred;
    }
    FileTier::Upload
}

/// Files to upload plus the source URLs of the deferred ones.
#[derive(Debug, Default)]
pub struct PartitionedFiles {
    pub uploads: Vec<FileUpload>,
    pub deferred: Vec<String>,
}

impl PartitionedFiles {
    pub fn push(&mut self, url: &str, file: FileUpload, premium_tier: u8) {
        match classify(file.size(), premium_tier) {
            FileTier::Upload => self.uploads.push(file),
            FileTier::Deferred => {
                tracing::debug!(url, size = file.size(), "deferring oversized file");
                self.deferred.push(url.to_string());
            }
        }
    }

    /// Upload batches of at most ten files, in order.
    pub fn batches(&self) -> Vec<Vec<FileUpload>> {
        self.uploads
            .chunks(MAX_FILES_PER_MESSAGE)
            .map(<[FileUpload]>::to_vec)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_tier_defers_above_eight_megabytes() {
        assert_eq!(classify(9_000_000, 0), FileTier::Deferred);
        assert_eq!(classify(9_000_000, 1), FileTier::Deferred);
        assert_eq!(classify(8_000_000, 0), FileTier::Upload);
    }

    #[test]
    fn test_elevated_tier_uploads_up_to_hard_limit() {
        assert_eq!(classify(9_000_000, 2), FileTier::Upload);
        assert_eq!(classify(49_999_999, 3), FileTier::Upload);
    }

    #[test]
    fn test_hard_limit_always_defers() {
        for tier in 0..=3 {
            assert_eq!(classify(50_000_000, tier), FileTier::Deferred);
        }
    }

    #[test]
    fn test_batches_of_ten() {
        let mut files = PartitionedFiles::default();
        for i in 0..23 {
            files.push(&format!("u{i}"), FileUpload::new(format!("{i}.txt"), vec![0u8; 4]), 0);
        }
        let batches = files.batches();
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![10, 10, 3]
        );
        assert_eq!(batches[2][0].filename, "20.txt");
    }
}
