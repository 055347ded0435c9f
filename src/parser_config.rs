//! Parser configuration for controlling lenient/strict reading modes.

/// Parser options for controlling error handling and recovery behavior.
///
/// These options trade strict PDF compliance for broader compatibility
/// with malformed or non-standard files.
///
/// # Example
///
/// ```
/// use pdf_oxide_reader::parser_config::ParserOptions;
///
/// // Lenient mode - repair what can be repaired (default)
/// let lenient = ParserOptions::lenient();
///
/// // Strict mode - no reconstruction, no length repair
/// let strict = ParserOptions::strict();
///
/// // Custom configuration
/// let custom = ParserOptions {
///     max_page_tree_depth: 16,
///     ..ParserOptions::default()
/// };
/// assert!(custom.allow_reconstruction);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    /// Rebuild the xref by scanning the whole file when the trusted
    /// `startxref` chain cannot be read.
    pub allow_reconstruction: bool,

    /// Cross-check every direct xref entry against the object header at its
    /// offset before trusting the table.
    pub verify_xref: bool,

    /// Maximum object nesting depth (DoS protection)
    ///
    /// Prevents stack overflow from deeply nested arrays/dictionaries
    /// in malicious PDFs.
    ///
    /// PDF Spec: ISO 32000-1:2008, Section H.1 - Implementation Limits
    pub max_nesting: usize,

    /// Maximum depth of the `/Pages` tree walked by page lookup.
    pub max_page_tree_depth: usize,

    /// Allow objects without "endobj" keyword
    pub allow_missing_endobj: bool,

    /// Scan for `endstream` when a stream's `/Length` is wrong or unresolvable
    pub allow_malformed_streams: bool,

    /// Size of each backward window searched for `startxref`.
    pub startxref_window: u64,

    /// Number of backward windows searched before giving up.
    pub startxref_max_windows: usize,

    /// Maximum decompressed stream size in bytes for whole-stream reads
    ///
    /// Default: 100 MB. Set to 0 to disable check.
    pub max_decompressed_size: usize,
}

impl Default for ParserOptions {
    /// Default configuration: lenient mode
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: fail instead of repairing.
    ///
    /// Use this for validating files or when parsing trusted input.
    pub fn strict() -> Self {
        Self {
            allow_reconstruction: false,
            verify_xref: true,
            max_nesting: 100, // PDF spec recommended limit
            max_page_tree_depth: 64,
            allow_missing_endobj: false,
            allow_malformed_streams: false,
            startxref_window: 512,
            startxref_max_windows: 30,
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
        }
    }

    /// Lenient mode: attempt to recover from structural damage.
    ///
    /// Broken objects degrade to Null and the xref is rebuilt when needed.
    pub fn lenient() -> Self {
        Self {
            allow_reconstruction: true,
            verify_xref: true,
            max_nesting: 100,
            max_page_tree_depth: 64,
            allow_missing_endobj: true,
            allow_malformed_streams: true,
            startxref_window: 512,
            startxref_max_windows: 30,
            max_decompressed_size: 100 * 1024 * 1024,
        }
    }

    /// Check a decoded size against `max_decompressed_size`.
    pub(crate) fn within_decompressed_limit(&self, size: usize) -> bool {
        self.max_decompressed_size == 0 || size <= self.max_decompressed_size
    }
}
