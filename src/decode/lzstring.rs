//! Compact-text codec (LZ-string, Base64 framing).
//!
//! The site compresses token tables, and in its older protocol the whole
//! manifest script, with the LZ-string scheme: an LZW-style dictionary coder
//! whose code width grows by one bit every time the dictionary doubles,
//! packed six bits per character into the standard Base64 alphabet.
//!
//! ## Stream layout
//!
//! - Codes are read least-significant bit first; each input character
//!   supplies its six bits most-significant first.
//! - Codes 0, 1 and 2 are control codes: an 8-bit literal, a 16-bit literal
//!   and end-of-stream. Every other code indexes the dictionary.
//! - The first code is 2 bits wide and must be a literal. The width then
//!   starts at 3 bits and grows when the `enlarge_in` countdown runs out.
//!
//! Output is a sequence of UTF-16 code units, turned into a `String` at the
//! end so surrogate pairs split across dictionary entries are reassembled.

use std::collections::{HashMap, HashSet};

use super::error::CodecError;

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Bits carried by one Base64 character.
const BITS_PER_CHAR: u32 = 6;

const LITERAL_8: u32 = 0;
const LITERAL_16: u32 = 1;
const END_OF_STREAM: u32 = 2;

/// Map a Base64 character to its 6-bit value. `=` is padding and reads as
/// zero bits.
fn base64_value(ch: char, position: usize) -> Result<u8, CodecError> {
    match ch {
        'A'..='Z' => Ok(ch as u8 - b'A'),
        'a'..='z' => Ok(ch as u8 - b'a' + 26),
        '0'..='9' => Ok(ch as u8 - b'0' + 52),
        '+' => Ok(62),
        '/' => Ok(63),
        '=' => Ok(0),
        _ => Err(CodecError::InvalidCharacter { ch, position }),
    }
}

/// Reads variable-width codes out of a sequence of 6-bit values.
struct BitReader {
    values: Vec<u8>,
    index: usize,
    mask: u8,
}

impl BitReader {
    fn new(values: Vec<u8>) -> Self {
        Self {
            values,
            index: 0,
            mask: 1 << (BITS_PER_CHAR - 1),
        }
    }

    /// Read `width` bits, least significant first. Reads past the end of
    /// the input yield zero bits.
    fn read(&mut self, width: u32) -> u32 {
        let mut bits = 0u32;
        for i in 0..width {
            let value = self.values.get(self.index).copied().unwrap_or(0);
            if value & self.mask != 0 {
                bits |= 1 << i;
            }
            self.mask >>= 1;
            if self.mask == 0 {
                self.mask = 1 << (BITS_PER_CHAR - 1);
                self.index += 1;
            }
        }
        bits
    }

    fn is_exhausted(&self) -> bool {
        self.index >= self.values.len()
    }
}

/// Decompress an LZ-string Base64 payload into text.
///
/// Empty input decodes to an empty string. Decoding stops at the
/// end-of-stream code or when the input runs out, whichever comes first.
///
/// # Errors
///
/// - [`CodecError::InvalidCharacter`] for characters outside the Base64
///   alphabet (padding `=` is accepted anywhere)
/// - [`CodecError::InvalidBackReference`] for a code beyond the dictionary
/// - [`CodecError::InvalidUtf16`] if the result holds an unpaired surrogate
pub fn decompress_from_base64(input: &str) -> Result<String, CodecError> {
    if input.is_empty() {
        return Ok(String::new());
    }

    let values = input
        .chars()
        .enumerate()
        .map(|(position, ch)| base64_value(ch, position))
        .collect::<Result<Vec<_>, _>>()?;

    let units = decompress(BitReader::new(values))?;
    String::from_utf16(&units).map_err(|_| CodecError::InvalidUtf16)
}

fn decompress(mut reader: BitReader) -> Result<Vec<u16>, CodecError> {
    // Slots 0..=2 stand for the control codes and are never emitted.
    let mut dictionary: Vec<Vec<u16>> = vec![Vec::new(); 3];

    let first = match reader.read(2) {
        LITERAL_8 => reader.read(8) as u16,
        LITERAL_16 => reader.read(16) as u16,
        END_OF_STREAM => return Ok(Vec::new()),
        code => {
            return Err(CodecError::InvalidBackReference {
                code,
                dict_size: dictionary.len(),
            });
        }
    };

    dictionary.push(vec![first]);
    let mut w = vec![first];
    let mut output = w.clone();

    let mut width = 3u32;
    let mut enlarge_in = 4u32;

    loop {
        if reader.is_exhausted() {
            return Ok(output);
        }

        let code = match reader.read(width) {
            END_OF_STREAM => return Ok(output),
            literal @ (LITERAL_8 | LITERAL_16) => {
                let unit_width = if literal == LITERAL_8 { 8 } else { 16 };
                let unit = reader.read(unit_width) as u16;
                dictionary.push(vec![unit]);
                enlarge_in -= 1;
                dictionary.len() - 1
            }
            code => code as usize,
        };

        if enlarge_in == 0 {
            enlarge_in = 1 << width;
            width += 1;
        }

        let entry = match dictionary.get(code) {
            Some(entry) => entry.clone(),
            // KwKwK: the code being defined right now
            None if code == dictionary.len() => {
                let mut entry = w.clone();
                entry.push(w[0]);
                entry
            }
            None => {
                return Err(CodecError::InvalidBackReference {
                    code: code as u32,
                    dict_size: dictionary.len(),
                });
            }
        };

        output.extend_from_slice(&entry);

        let mut grown = w;
        grown.push(entry[0]);
        dictionary.push(grown);
        enlarge_in -= 1;

        w = entry;

        if enlarge_in == 0 {
            enlarge_in = 1 << width;
            width += 1;
        }
    }
}

/// Packs codes into Base64 characters, mirroring [`BitReader`].
struct BitWriter {
    value: u8,
    position: u32,
    out: String,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            value: 0,
            position: 0,
            out: String::new(),
        }
    }

    fn write(&mut self, mut code: u32, width: u32) {
        for _ in 0..width {
            self.push_bit((code & 1) as u8);
            code >>= 1;
        }
    }

    fn push_bit(&mut self, bit: u8) {
        self.value = (self.value << 1) | bit;
        if self.position == BITS_PER_CHAR - 1 {
            self.out.push(BASE64_ALPHABET[self.value as usize] as char);
            self.position = 0;
            self.value = 0;
        } else {
            self.position += 1;
        }
    }

    fn finish(mut self) -> String {
        loop {
            self.value <<= 1;
            if self.position == BITS_PER_CHAR - 1 {
                self.out.push(BASE64_ALPHABET[self.value as usize] as char);
                break;
            }
            self.position += 1;
        }

        match self.out.len() % 4 {
            0 => {}
            rem => self.out.extend(std::iter::repeat_n('=', 4 - rem)),
        }
        self.out
    }
}

/// Encoder state for [`compress_to_base64`].
struct Compressor {
    dictionary: HashMap<Vec<u16>, u32>,
    /// Single units seen but not yet emitted as a literal.
    pending: HashSet<u16>,
    dict_size: u32,
    width: u32,
    enlarge_in: u32,
    writer: BitWriter,
}

impl Compressor {
    fn new() -> Self {
        Self {
            dictionary: HashMap::new(),
            pending: HashSet::new(),
            dict_size: 3,
            width: 2,
            enlarge_in: 2,
            writer: BitWriter::new(),
        }
    }

    fn tick(&mut self) {
        self.enlarge_in -= 1;
        if self.enlarge_in == 0 {
            self.enlarge_in = 1 << self.width;
            self.width += 1;
        }
    }

    fn emit(&mut self, w: &[u16]) {
        if w.len() == 1 && self.pending.remove(&w[0]) {
            let unit = w[0];
            if unit < 256 {
                self.writer.write(LITERAL_8, self.width);
                self.writer.write(unit as u32, 8);
            } else {
                self.writer.write(LITERAL_16, self.width);
                self.writer.write(unit as u32, 16);
            }
            self.tick();
        } else {
            let code = self.dictionary[w];
            self.writer.write(code, self.width);
        }
        self.tick();
    }

    fn add(&mut self, entry: Vec<u16>) {
        self.dictionary.insert(entry, self.dict_size);
        self.dict_size += 1;
    }
}

/// Compress text into the LZ-string Base64 form understood by
/// [`decompress_from_base64`], padded with `=` to a multiple of four.
pub fn compress_to_base64(input: &str) -> String {
    let mut state = Compressor::new();
    let mut w: Vec<u16> = Vec::new();

    for unit in input.encode_utf16() {
        if !state.dictionary.contains_key([unit].as_slice()) {
            state.add(vec![unit]);
            state.pending.insert(unit);
        }

        let mut wc = w.clone();
        wc.push(unit);
        if state.dictionary.contains_key(&wc) {
            w = wc;
        } else {
            state.emit(&w);
            state.add(wc);
            w = vec![unit];
        }
    }

    if !w.is_empty() {
        state.emit(&w);
    }

    state.writer.write(END_OF_STREAM, state.width);
    state.writer.finish()
}
