//! Packed manifest decoding.
//!
//! A volume page ships its image list inside an inline script that is
//! handed to `window["\x65\x76\x61\x6c"]`. This module recovers that list
//! without executing any script.
//!
//! ## Architecture
//!
//! - [`lzstring`]: the LZ-string Base64 codec the site compresses with
//! - [`packer`]: reversal of the `p,a,c,k,e,d` symbol substitution
//! - [`variant`]: recognition of the V1 (compressed) and V2 (packed) scripts
//! - [`manifest`]: extraction and validation of the embedded JSON object
//! - [`pages`]: page URL construction
//!
//! ## Pipeline
//!
//! 1. [`extract_script`] finds the marked script in the page HTML
//! 2. [`classify`] decides the protocol and captures its literal arguments
//! 3. [`Variant::decode`] rebuilds the plain script text
//! 4. [`manifest::parse`] validates the JSON object into an [`ImageManifest`]
//! 5. [`page_urls`] joins host, path, files and tokens
//!
//! Every step is pure and synchronous. Errors are terminal for the volume
//! being decoded; see [`DecodeError::is_format_change`].

pub mod error;
pub mod lzstring;
pub mod manifest;
pub mod packer;
pub mod pages;
pub mod variant;

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

pub use error::{CodecError, DecodeError, FormatError, ManifestError, ObfuscationError, Result};
pub use manifest::{ImageManifest, SecurityTokens};
pub use packer::{PackerInvocation, SymbolTable, deobfuscate};
pub use pages::{PageUrl, page_urls};
pub use variant::{Variant, classify};

/// Inline script handed to the hex-escaped `eval` property.
static SCRIPT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*>\s*window\["\\x65\\x76\\x61\\x6c"\](?P<body>.*?)</script>"#)
        .expect("script pattern is valid")
});

/// Locate the manifest script in a volume page and return the argument of
/// the `eval` call.
pub fn extract_script(html: &str) -> std::result::Result<&str, FormatError> {
    SCRIPT_REGEX
        .captures(html)
        .and_then(|caps| caps.name("body"))
        .map(|body| body.as_str().trim())
        .ok_or(FormatError::ScriptNotFound)
}

/// Decode an extracted script into its image manifest.
pub fn decode_script(raw: &str) -> Result<ImageManifest> {
    let variant = classify(raw)?;
    debug!(variant = variant.name(), "Decoding manifest script");
    let text = variant.decode()?;
    Ok(manifest::parse(&text)?)
}

/// Decode the image manifest of a volume page.
pub fn decode_page(html: &str) -> Result<ImageManifest> {
    decode_script(extract_script(html)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOLUME_V1: &str = include_str!("../../tests/fixtures/volume_v1.html");
    const VOLUME_V2: &str = include_str!("../../tests/fixtures/volume_v2.html");

    #[test]
    fn test_extract_script() {
        let raw = extract_script(VOLUME_V2).unwrap();
        assert!(raw.starts_with("(function(p,a,c,k,e,d)"));
        assert!(raw.ends_with(",0,{}))"));

        let raw = extract_script(VOLUME_V1).unwrap();
        assert!(raw.starts_with("(LZString.decompressFromBase64('"));
    }

    #[test]
    fn test_missing_script() {
        let html = r#"<script type="text/javascript">eval(function(){})</script>"#;
        assert_eq!(extract_script(html), Err(FormatError::ScriptNotFound));
        assert!(decode_page(html).unwrap_err().is_format_change());
    }

    #[test]
    fn test_decode_v2_page() {
        let manifest = decode_page(VOLUME_V2).unwrap();
        assert_eq!(manifest.path, "/ps3/t/test/vol01/");
        assert_eq!(
            manifest.files,
            vec!["001.jpg.webp", "002.jpg.webp", "003.jpg.webp"]
        );
        assert_eq!(
            manifest.security,
            SecurityTokens {
                e: "1700000000".to_string(),
                m: "aBc-XyZ_09".to_string(),
            }
        );

        let urls = page_urls(&manifest, "https://i.hamreus.com");
        assert_eq!(
            urls[0].url,
            "https://i.hamreus.com/ps3/t/test/vol01/001.jpg.webp?e=1700000000&m=aBc-XyZ_09"
        );
        assert_eq!(urls[2].number, 3);
    }

    #[test]
    fn test_decode_v1_page() {
        let manifest = decode_page(VOLUME_V1).unwrap();
        assert_eq!(manifest.path, "/ps1/old/");
        assert_eq!(manifest.files, vec!["a.png", "b.png"]);
        assert_eq!(manifest.security.e, "1500000000");
        assert_eq!(manifest.security.m, "OldTok");
    }

    #[test]
    fn test_corrupt_token_table_is_codec_error() {
        let raw = extract_script(VOLUME_V2).unwrap().replacen("FYBw", "F*Bw", 1);
        assert!(matches!(
            decode_script(&raw),
            Err(DecodeError::Codec(CodecError::InvalidCharacter { ch: '*', .. }))
        ));
    }

    #[test]
    fn test_unknown_variant_never_decodes() {
        let err = decode_script("(SMH.imgData({\"path\":\"/x/\"}))").unwrap_err();
        assert!(matches!(err, DecodeError::Format(FormatError::UnknownVariant)));
    }
}
