//! Context configuration

/// Tunables shared by every matrix created from a [`Context`](crate::Context)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Largest accepted row or column count
    pub max_dimension: usize,
    /// Sparse slots reserved when a sparse allocation gets no hint
    pub default_nnz_reserve: usize,
    /// Fill the target of an empty transfer with `Element::invalid()`
    ///
    /// Catches callers that read before the full overwrite an empty transfer
    /// requires.
    pub poison_empty_transfers: bool,
    /// Location changes after which a handle logs a thrash warning
    pub thrash_warning_threshold: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_dimension: i32::MAX as usize,
            default_nnz_reserve: 10_000,
            poison_empty_transfers: cfg!(debug_assertions),
            thrash_warning_threshold: 64,
        }
    }
}

impl ContextConfig {
    /// Set the dimension limit
    pub fn with_max_dimension(mut self, max_dimension: usize) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// Set the default sparse reservation
    pub fn with_default_nnz_reserve(mut self, reserve: usize) -> Self {
        self.default_nnz_reserve = reserve;
        self
    }

    /// Enable or disable poisoning of empty transfers
    pub fn with_poison_empty_transfers(mut self, poison: bool) -> Self {
        self.poison_empty_transfers = poison;
        self
    }

    /// Set the thrash warning threshold (0 disables the warning)
    pub fn with_thrash_warning_threshold(mut self, threshold: usize) -> Self {
        self.thrash_warning_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ContextConfig::default();
        assert_eq!(cfg.max_dimension, i32::MAX as usize);
        assert_eq!(cfg.default_nnz_reserve, 10_000);
        assert_eq!(cfg.poison_empty_transfers, cfg!(debug_assertions));
    }

    #[test]
    fn test_builder_setters() {
        let cfg = ContextConfig::default()
            .with_max_dimension(100)
            .with_poison_empty_transfers(true)
            .with_thrash_warning_threshold(0);
        assert_eq!(cfg.max_dimension, 100);
        assert!(cfg.poison_empty_transfers);
        assert_eq!(cfg.thrash_warning_threshold, 0);
    }
}
