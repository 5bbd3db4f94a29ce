//! Vectorizer knobs consumed by the access analysis.
//!
//! All values are plain data. A [`VectorizerParams`] is passed by reference
//! into every analysis entry point and never mutated during an analysis.

/// Configuration shared between the vectorizer and the access analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorizerParams {
    /// Vector width forced by the user, 0 to let the vectorizer choose.
    pub force_vector_width: u32,
    /// Interleave count forced by the user, 0 to let the vectorizer choose.
    pub force_vector_interleave: u32,
    /// Maximum number of runtime pointer comparisons a loop may need.
    pub runtime_memory_check_threshold: u32,
    /// Widest vector, in elements, the target supports.
    pub max_vector_width: u32,
}

impl VectorizerParams {
    pub const MAX_VECTOR_WIDTH: u32 = 64;
    pub const RUNTIME_MEMORY_CHECK_THRESHOLD: u32 = 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force_vector_width(mut self, width: u32) -> Self {
        self.force_vector_width = width;
        self
    }

    pub fn with_force_vector_interleave(mut self, interleave: u32) -> Self {
        self.force_vector_interleave = interleave;
        self
    }

    pub fn with_runtime_memory_check_threshold(mut self, threshold: u32) -> Self {
        self.runtime_memory_check_threshold = threshold;
        self
    }

    pub fn with_max_vector_width(mut self, width: u32) -> Self {
        self.max_vector_width = width;
        self
    }

    /// Forced vector width, 1 when the vectorizer is free to choose.
    #[inline]
    pub fn forced_factor(&self) -> u64 {
        self.force_vector_width.max(1) as u64
    }

    /// Forced interleave count, 1 when the vectorizer is free to choose.
    #[inline]
    pub fn forced_interleave(&self) -> u64 {
        self.force_vector_interleave.max(1) as u64
    }

    #[inline]
    pub fn is_interleave_forced(&self) -> bool {
        self.force_vector_interleave != 0
    }
}

impl Default for VectorizerParams {
    fn default() -> Self {
        Self {
            force_vector_width: 0,
            force_vector_interleave: 0,
            runtime_memory_check_threshold: Self::RUNTIME_MEMORY_CHECK_THRESHOLD,
            max_vector_width: Self::MAX_VECTOR_WIDTH,
        }
    }
}
