//! Reversal of the `p,a,c,k,e,d` packer.
//!
//! The packer replaces every word of the source with a short symbol, the
//! radix-`a` numeral of that word's slot in a token table, and ships the
//! table alongside. Undoing it needs no script execution: rebuild the
//! symbol names, map them to their tokens and substitute whole words once.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{CodecError, ObfuscationError};
use super::lzstring::decompress_from_base64;

/// Maximal runs of ASCII word characters, the unit the packer substitutes.
static WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-Za-z_]+").expect("word pattern is valid"));

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Arguments of one packer call, with the token table already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackerInvocation {
    /// Packed source text with symbols in place of words.
    pub payload: String,
    /// Base of the symbol numerals.
    pub radix: u32,
    /// Number of symbols the invocation declares.
    pub token_count: usize,
    /// Replacement words, indexed by symbol value. Empty entries keep the
    /// symbol as written.
    pub tokens: Vec<String>,
}

/// The token table argument as it appears in the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTable {
    /// `'a|b|c'.split('|')`
    Plain { joined: String, delimiter: String },
    /// `'<lz-string base64>'['\x73\x70\x6c\x69\x63']('\x7c')`, decompressed
    /// before it is split.
    Compressed { data: String, delimiter: String },
}

impl TokenTable {
    /// Expand the table into its individual tokens.
    pub fn expand(&self) -> Result<Vec<String>, CodecError> {
        let (joined, delimiter) = match self {
            TokenTable::Plain { joined, delimiter } => (joined.clone(), delimiter),
            TokenTable::Compressed { data, delimiter } => {
                (decompress_from_base64(data)?, delimiter)
            }
        };
        Ok(joined.split(delimiter.as_str()).map(str::to_owned).collect())
    }
}

/// Canonical symbol name of slot `c` for the given radix.
///
/// Digits above 35 continue at code point `v + 29`, so radix 62 uses
/// `0-9a-zA-Z`.
pub fn symbol_name(c: usize, radix: u32) -> String {
    let mut name = String::new();
    push_symbol_name(c, radix as usize, &mut name);
    name
}

fn push_symbol_name(c: usize, radix: usize, out: &mut String) {
    if c >= radix {
        push_symbol_name(c / radix, radix, out);
    }
    let v = c % radix;
    let digit = if v <= 35 {
        BASE36_DIGITS[v] as char
    } else {
        char::from_u32(v as u32 + 29).unwrap_or(char::REPLACEMENT_CHARACTER)
    };
    out.push(digit);
}

/// Slot index of `word` if it is the canonical symbol name of some slot
/// for this radix.
///
/// Leading zeros and digits at or above the radix disqualify a word.
pub fn symbol_index(word: &str, radix: u32) -> Option<usize> {
    if word.is_empty() || (word.len() > 1 && word.starts_with('0')) {
        return None;
    }
    let radix = radix as usize;
    let mut index = 0usize;
    for ch in word.chars() {
        let digit = match ch {
            '0'..='9' => ch as usize - '0' as usize,
            'a'..='z' => ch as usize - 'a' as usize + 10,
            'A'..='Z' => ch as usize - 29,
            _ => return None,
        };
        if digit >= radix {
            return None;
        }
        index = index.saturating_mul(radix).saturating_add(digit);
    }
    Some(index)
}

/// Symbol name to replacement text for one invocation.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    radix: u32,
    symbols: HashMap<String, String>,
}

impl SymbolTable {
    /// Build the table from the highest slot down to slot 0.
    pub fn build(radix: u32, tokens: &[String]) -> Self {
        let mut symbols = HashMap::with_capacity(tokens.len());
        for (c, token) in tokens.iter().enumerate().rev() {
            let name = symbol_name(c, radix);
            let value = if token.is_empty() {
                name.clone()
            } else {
                token.clone()
            };
            symbols.insert(name, value);
        }
        Self { radix, symbols }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.symbols.get(name).map(String::as_str)
    }

    /// Replace every whole-word symbol in `payload`, in a single pass.
    ///
    /// Words that are not symbol names are copied unchanged. A symbol name
    /// past the end of the table is an error.
    pub fn substitute(&self, payload: &str) -> Result<String, ObfuscationError> {
        let mut source = String::with_capacity(payload.len());
        let mut last = 0;

        for word in WORD_REGEX.find_iter(payload) {
            source.push_str(&payload[last..word.start()]);
            let text = word.as_str();
            match self.get(text) {
                Some(token) => source.push_str(token),
                None => {
                    if let Some(index) = symbol_index(text, self.radix) {
                        return Err(ObfuscationError::SymbolOutOfRange {
                            symbol: text.to_string(),
                            index,
                        });
                    }
                    source.push_str(text);
                }
            }
            last = word.end();
        }
        source.push_str(&payload[last..]);

        Ok(source)
    }
}

/// Rebuild the packed source text.
///
/// # Errors
///
/// - [`ObfuscationError::InvalidRadix`] if the radix is below 2
/// - [`ObfuscationError::TokenCountMismatch`] if the declared symbol count
///   differs from the number of tokens shipped
/// - [`ObfuscationError::SymbolOutOfRange`] if the payload names a slot
///   the table does not have
/// - [`ObfuscationError::Unbalanced`] if the result does not close its
///   brackets
pub fn deobfuscate(invocation: &PackerInvocation) -> Result<String, ObfuscationError> {
    if invocation.radix < 2 {
        return Err(ObfuscationError::InvalidRadix(invocation.radix));
    }
    if invocation.token_count != invocation.tokens.len() {
        return Err(ObfuscationError::TokenCountMismatch {
            declared: invocation.token_count,
            actual: invocation.tokens.len(),
        });
    }

    let table = SymbolTable::build(invocation.radix, &invocation.tokens);
    let source = table.substitute(&invocation.payload)?;

    if !is_balanced(&source) {
        return Err(ObfuscationError::Unbalanced);
    }
    Ok(source)
}

/// Check that `{}`, `[]` and `()` nest properly outside string literals.
fn is_balanced(source: &str) -> bool {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in source.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }

        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' | '[' | '(' => stack.push(ch),
            '}' | ']' | ')' => {
                let expected = match ch {
                    '}' => '{',
                    ']' => '[',
                    _ => '(',
                };
                if stack.pop() != Some(expected) {
                    return false;
                }
            }
            _ => {}
        }
    }

    stack.is_empty() && quote.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(payload: &str, radix: u32, tokens: &[&str]) -> PackerInvocation {
        PackerInvocation {
            payload: payload.to_string(),
            radix,
            token_count: tokens.len(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_symbol_names() {
        assert_eq!(symbol_name(0, 62), "0");
        assert_eq!(symbol_name(10, 62), "a");
        assert_eq!(symbol_name(35, 62), "z");
        assert_eq!(symbol_name(36, 62), "A");
        assert_eq!(symbol_name(61, 62), "Z");
        assert_eq!(symbol_name(62, 62), "10");
        assert_eq!(symbol_name(3843, 62), "ZZ");
        assert_eq!(symbol_name(123, 10), "123");
        assert_eq!(symbol_name(5, 2), "101");
    }

    #[test]
    fn test_empty_tokens_keep_numeral() {
        let inv = invocation("0 1 2 3 4", 62, &["foo", "", "bar", "", "baz"]);
        assert_eq!(deobfuscate(&inv).unwrap(), "foo 1 bar 3 baz");
    }

    #[test]
    fn test_whole_word_matching() {
        let mut tokens = vec![""; 11];
        tokens[10] = "X";
        // `abc` and `xa` hold digits outside radix 11
        let inv = invocation("a abc a_1 xa (a)", 11, &tokens);
        assert_eq!(deobfuscate(&inv).unwrap(), "X abc a_1 xa (X)");
    }

    #[test]
    fn test_single_pass() {
        // A replacement that is itself a symbol name must not be expanded again.
        let inv = invocation("0 1", 62, &["1", "done"]);
        assert_eq!(deobfuscate(&inv).unwrap(), "1 done");
    }

    #[test]
    fn test_invalid_radix() {
        let inv = invocation("0", 1, &["x"]);
        assert_eq!(deobfuscate(&inv), Err(ObfuscationError::InvalidRadix(1)));
    }

    #[test]
    fn test_token_count_mismatch() {
        let mut inv = invocation("0 1 2", 62, &["a", "b"]);
        inv.token_count = 3;
        assert_eq!(
            deobfuscate(&inv),
            Err(ObfuscationError::TokenCountMismatch {
                declared: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_symbol_out_of_range() {
        let inv = invocation("0 5 1", 62, &["foo", "bar"]);
        assert_eq!(
            deobfuscate(&inv),
            Err(ObfuscationError::SymbolOutOfRange {
                symbol: "5".to_string(),
                index: 5
            })
        );

        let inv = invocation("0.SMH()", 62, &["x"]);
        assert!(matches!(
            deobfuscate(&inv),
            Err(ObfuscationError::SymbolOutOfRange { index: 210595, .. })
        ));
    }

    #[test]
    fn test_symbol_index() {
        assert_eq!(symbol_index("0", 62), Some(0));
        assert_eq!(symbol_index("Z", 62), Some(61));
        assert_eq!(symbol_index("10", 62), Some(62));
        assert_eq!(symbol_index("ZZ", 62), Some(3843));
        assert_eq!(symbol_index("101", 2), Some(5));
        // Not canonical
        assert_eq!(symbol_index("01", 62), None);
        assert_eq!(symbol_index("a_1", 62), None);
        assert_eq!(symbol_index("a", 10), None);
        assert_eq!(symbol_index("A", 36), None);
        assert_eq!(symbol_index("", 62), None);

        for c in [0, 9, 35, 36, 61, 62, 1000, 3843] {
            assert_eq!(symbol_index(&symbol_name(c, 62), 62), Some(c));
        }
    }

    #[test]
    fn test_unbalanced_output() {
        let inv = invocation("0({", 62, &["f"]);
        assert_eq!(deobfuscate(&inv), Err(ObfuscationError::Unbalanced));
    }

    #[test]
    fn test_balance_ignores_strings() {
        assert!(is_balanced(r#"f({"a":"}{","b":['(']})"#));
        assert!(is_balanced(r#"{\"a\":1}"#));
        assert!(!is_balanced(r#"f("open)"#));
        assert!(!is_balanced("(]"));
    }

    #[test]
    fn test_expand_tables() {
        let plain = TokenTable::Plain {
            joined: "var||a".to_string(),
            delimiter: "|".to_string(),
        };
        assert_eq!(plain.expand().unwrap(), vec!["var", "", "a"]);

        let compressed = TokenTable::Compressed {
            data: "GYexB9wIwQwJyA==".to_string(),
            delimiter: "|".to_string(),
        };
        assert_eq!(compressed.expand().unwrap(), vec!["foo", "", "bar"]);
    }
}
