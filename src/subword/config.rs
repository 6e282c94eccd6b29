//! Subword Configuration

/// N-gram and bucket settings of a subword table
///
/// Fixed once the table's format is known; changing any field invalidates
/// the bucket membership of every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubwordConfig {
    /// Shortest n-gram, in characters
    pub min_n: usize,

    /// Longest n-gram, in characters
    pub max_n: usize,

    /// Number of hash buckets (0 = no subword information)
    pub bucket: usize,

    /// Byte-level hashing compatible with the reference format.
    /// `false` selects the legacy character-level hash.
    pub compatible_hash: bool,
}

impl Default for SubwordConfig {
    fn default() -> Self {
        Self {
            min_n: 3,
            max_n: 6,
            bucket: 2_000_000,
            compatible_hash: true,
        }
    }
}

impl SubwordConfig {
    /// Set the n-gram length range
    pub fn with_ngram_range(mut self, min_n: usize, max_n: usize) -> Self {
        self.min_n = min_n;
        self.max_n = max_n;
        self
    }

    /// Set the number of buckets
    pub fn with_buckets(mut self, bucket: usize) -> Self {
        self.bucket = bucket;
        self
    }

    /// Select the hash function
    pub fn with_compatible_hash(mut self, compatible: bool) -> Self {
        self.compatible_hash = compatible;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = SubwordConfig::default()
            .with_ngram_range(2, 4)
            .with_buckets(100)
            .with_compatible_hash(false);
        assert_eq!(config.min_n, 2);
        assert_eq!(config.max_n, 4);
        assert_eq!(config.bucket, 100);
        assert!(!config.compatible_hash);
    }
}
