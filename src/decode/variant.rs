//! Recognition of the two manifest script shapes.
//!
//! - **V1** wraps one LZ-string call: the decompressed text is the script.
//! - **V2** is a `p,a,c,k,e,d` packer call whose token table is
//!   LZ-string compressed and split through the site's `splic` helper.
//!
//! Detection is strict. Once the packer preamble is seen the rest of the
//! call must match exactly, and a script of neither shape is reported as a
//! format change instead of being decoded on a best-effort basis.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::error::{DecodeError, FormatError};
use super::lzstring::decompress_from_base64;
use super::packer::{PackerInvocation, TokenTable, deobfuscate};

/// Start of a packer envelope, `(function(p,a,c,k,e,d){`.
static PACKER_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\(\s*function\s*\(\s*p\s*,\s*a\s*,\s*c\s*,\s*k\s*,\s*e\s*,\s*\w+\s*\)\s*\{")
        .expect("preamble pattern is valid")
});

/// The complete packer call with its four literal arguments.
static PACKER_INVOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)^\s*\(\s*function\s*\(\s*p\s*,\s*a\s*,\s*c\s*,\s*k\s*,\s*e\s*,\s*\w+\s*\)\s*\{.*?\}",
        r"\s*\(\s*'(?P<payload>(?:[^'\\]|\\.)*)'",
        r"\s*,\s*(?P<radix>[0-9]+)",
        r"\s*,\s*(?P<count>[0-9]+)",
        r"\s*,\s*'(?P<table>(?:[^'\\]|\\.)*)'",
        r"\s*(?P<split>\[\s*'(?:\\x73\\x70\\x6c\\x69\\x63|splic)'\s*\]|\.splic|\.split)",
        r"\s*\(\s*'(?P<delim>(?:[^'\\]|\\.)+)'\s*\)",
        r"\s*,\s*0\s*,\s*\{\s*\}\s*\)\s*\)\s*;?\s*$",
    ))
    .expect("invocation pattern is valid")
});

/// A parenthesised LZ-string call with no packer around it.
static COMPRESSED_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)^\s*\(\s*(?:",
        r"(?:LZString\s*\.\s*)?decompressFromBase64\s*\(\s*'(?P<direct>[^']*)'\s*\)",
        r"|'(?P<data>[^']*)'\s*(?:\[\s*'(?:\\x73\\x70\\x6c\\x69\\x63|splic)'\s*\]|\.splic)",
        r"\s*\(\s*'(?:[^'\\]|\\.)+'\s*\)",
        r")\s*\)\s*;?\s*$",
    ))
    .expect("compressed script pattern is valid")
});

/// Protocol V1 arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedScript {
    /// LZ-string Base64 text of the whole script.
    pub data: String,
}

/// Protocol V2 arguments, token table still in its scripted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedScript {
    pub payload: String,
    pub radix: u32,
    pub token_count: usize,
    pub table: TokenTable,
}

impl PackedScript {
    /// Expand the token table, producing a ready-to-run invocation.
    pub fn into_invocation(self) -> Result<PackerInvocation, DecodeError> {
        let tokens = self.table.expand()?;
        Ok(PackerInvocation {
            payload: self.payload,
            radix: self.radix,
            token_count: self.token_count,
            tokens,
        })
    }
}

/// A recognised manifest script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    /// Older protocol: the script is a single compressed string.
    V1(CompressedScript),
    /// Current protocol: packer-wrapped with a compressed token table.
    V2(PackedScript),
}

impl Variant {
    /// Recover the plain script text carrying the manifest.
    pub fn decode(self) -> Result<String, DecodeError> {
        match self {
            Variant::V1(script) => Ok(decompress_from_base64(&script.data)?),
            Variant::V2(script) => {
                let invocation = script.into_invocation()?;
                Ok(deobfuscate(&invocation)?)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variant::V1(_) => "v1",
            Variant::V2(_) => "v2",
        }
    }
}

/// Decide which protocol `raw` uses and capture its literal arguments.
///
/// # Errors
///
/// - [`FormatError::MalformedPacker`] when the packer preamble is present
///   but the call around it has a different shape
/// - [`FormatError::UnknownVariant`] when neither protocol matches
/// - [`FormatError::InvalidLiteral`] when a string argument holds a broken
///   escape sequence
pub fn classify(raw: &str) -> Result<Variant, FormatError> {
    if PACKER_PREAMBLE.is_match(raw) {
        let caps = PACKER_INVOCATION.captures(raw).ok_or_else(|| {
            FormatError::MalformedPacker("call arguments do not match the packer shape".into())
        })?;
        return packed_script(&caps).map(Variant::V2);
    }

    if let Some(caps) = COMPRESSED_SCRIPT.captures(raw) {
        let data = caps
            .name("direct")
            .or_else(|| caps.name("data"))
            .map(|m| m.as_str().to_owned())
            .unwrap_or_default();
        return Ok(Variant::V1(CompressedScript { data }));
    }

    Err(FormatError::UnknownVariant)
}

fn packed_script(caps: &Captures) -> Result<PackedScript, FormatError> {
    let payload = unescape_js(&caps["payload"])?;
    let radix = caps["radix"]
        .parse()
        .map_err(|_| FormatError::MalformedPacker(format!("radix {} out of range", &caps["radix"])))?;
    let token_count = caps["count"]
        .parse()
        .map_err(|_| FormatError::MalformedPacker(format!("count {} out of range", &caps["count"])))?;

    let joined = unescape_js(&caps["table"])?;
    let delimiter = unescape_js(&caps["delim"])?;
    let table = if &caps["split"] == ".split" {
        TokenTable::Plain { joined, delimiter }
    } else {
        TokenTable::Compressed {
            data: joined,
            delimiter,
        }
    };

    Ok(PackedScript {
        payload,
        radix,
        token_count,
        table,
    })
}

/// Unescape the body of a single-quoted JavaScript string literal.
pub(crate) fn unescape_js(literal: &str) -> Result<String, FormatError> {
    let mut units: Vec<u16> = Vec::with_capacity(literal.len());
    let mut chars = literal.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(ch.encode_utf16(&mut buf));
            continue;
        }

        let escaped = chars
            .next()
            .ok_or_else(|| FormatError::InvalidLiteral("trailing backslash".into()))?;
        let unit = match escaped {
            'n' => '\n' as u16,
            'r' => '\r' as u16,
            't' => '\t' as u16,
            'b' => 0x08,
            'f' => 0x0c,
            'v' => 0x0b,
            '0' => 0,
            'x' => hex_escape(&mut chars, 2)?,
            'u' => hex_escape(&mut chars, 4)?,
            // Line continuation
            '\n' => continue,
            other => {
                let mut buf = [0u16; 2];
                units.extend_from_slice(other.encode_utf16(&mut buf));
                continue;
            }
        };
        units.push(unit);
    }

    String::from_utf16(&units)
        .map_err(|_| FormatError::InvalidLiteral("unpaired surrogate escape".into()))
}

fn hex_escape(chars: &mut std::str::Chars<'_>, digits: usize) -> Result<u16, FormatError> {
    let hex: String = chars.by_ref().take(digits).collect();
    if hex.len() != digits {
        return Err(FormatError::InvalidLiteral(format!("truncated escape \\{hex}")));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FormatError::InvalidLiteral(format!("invalid hex escape {hex:?}")));
    }
    u16::from_str_radix(&hex, 16)
        .map_err(|_| FormatError::InvalidLiteral(format!("invalid hex escape {hex:?}")))
}
