//! Decode-time configuration, analogous to the teacher's `DecoderOptions::ber()`/`der()` presets.

use crate::parser::DEFAULT_MAX_DEPTH;

#[derive(Copy, Clone, Debug)]
pub struct DecodeConfig {
    /// Reject trailing bytes after the outermost TLV, and non-minimal tag/length encodings.
    pub strict: bool,
    /// Recursion bound for nested indefinite-length TLVs.
    pub max_depth: usize,
    /// Optional caller-imposed cap on the total input length, checked before parsing begins.
    pub max_input_len: Option<usize>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: DEFAULT_MAX_DEPTH,
            max_input_len: None,
        }
    }
}

impl DecodeConfig {
    pub fn ber() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_input_len(mut self, max_input_len: usize) -> Self {
        self.max_input_len = Some(max_input_len);
        self
    }
}
