//! Error types for manifest decoding.
//!
//! Every stage of the pipeline has its own error so callers can tell
//! "the site changed its script format" ([`FormatError`]) apart from
//! "this one volume carries malformed data" (everything else).

use thiserror::Error;

/// The page or script does not have any shape the decoder knows about.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// No inline script carrying the escaped `eval` marker was found.
    #[error("page does not contain the packed manifest script")]
    ScriptNotFound,

    /// The packer preamble was found but the invocation around it differs.
    #[error("packer invocation has an unexpected shape: {0}")]
    MalformedPacker(String),

    /// A string argument of the script holds a broken escape sequence.
    #[error("invalid string literal in script: {0}")]
    InvalidLiteral(String),

    /// Neither the compressed (V1) nor the packed (V2) shape matched.
    #[error("script matches no known manifest variant")]
    UnknownVariant,
}

/// Malformed compact-text (LZ-string Base64) input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },

    #[error("back-reference {code} is outside the dictionary (size {dict_size})")]
    InvalidBackReference { code: u32, dict_size: usize },

    #[error("decoded text contains an unpaired UTF-16 surrogate")]
    InvalidUtf16,
}

/// Packer invariants violated while rebuilding the payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObfuscationError {
    #[error("radix {0} is below 2")]
    InvalidRadix(u32),

    #[error("symbol table declares {declared} symbols but carries {actual}")]
    TokenCountMismatch { declared: usize, actual: usize },

    #[error("symbol {symbol:?} refers to slot {index}, past the end of the table")]
    SymbolOutOfRange { symbol: String, index: usize },

    #[error("substituted payload has unbalanced brackets")]
    Unbalanced,
}

/// The decoded text does not carry a usable image manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no JSON object found in decoded payload")]
    NotFound,

    #[error("manifest is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("manifest field `{0}` is missing")]
    Missing(&'static str),

    #[error("manifest field `{0}` has the wrong type")]
    InvalidType(&'static str),

    #[error("manifest lists no files")]
    EmptyFiles,

    #[error("manifest path {0:?} does not start with '/'")]
    InvalidPath(String),
}

/// Any failure of the decoding pipeline.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Obfuscation(#[from] ObfuscationError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

impl DecodeError {
    /// True when the failure means the site's script format has drifted and
    /// the decoder itself needs an update, as opposed to one bad volume.
    pub fn is_format_change(&self) -> bool {
        matches!(self, DecodeError::Format(_))
    }
}

/// Result type alias for decoding operations
pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_change_classification() {
        assert!(DecodeError::from(FormatError::UnknownVariant).is_format_change());
        assert!(DecodeError::from(FormatError::ScriptNotFound).is_format_change());
        assert!(!DecodeError::from(CodecError::InvalidUtf16).is_format_change());
        assert!(!DecodeError::from(ManifestError::EmptyFiles).is_format_change());
        assert!(!DecodeError::from(ObfuscationError::Unbalanced).is_format_change());
    }

    #[test]
    fn test_messages() {
        let err = CodecError::InvalidCharacter {
            ch: '*',
            position: 3,
        };
        assert_eq!(err.to_string(), "invalid character '*' at position 3");
        assert_eq!(
            ManifestError::Missing("sl.e").to_string(),
            "manifest field `sl.e` is missing"
        );
    }
}
