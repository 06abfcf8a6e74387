//! Encoding converter: classifies a byte stream and transcodes it to and from the
//! UTF-8 text held by a document, one block at a time.
//!
//! Classification order:
//! 1. A UTF-8 or UTF-16 byte order mark forces the matching mode.
//! 2. Without a BOM the leading window is sniffed: a `coding: utf-8` cookie in the
//!    first two lines, or valid UTF-8 containing non-ASCII bytes, selects UTF-8.
//! 3. Anything else is 8-bit, mapped through windows-1252 so that every byte
//!    value survives a load/save round trip.

use std::sync::OnceLock;

use encoding_rs::{CoderResult, EncoderResult, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use regex::bytes::Regex;

/// Bytes examined before deciding on an encoding when no BOM is present.
/// Fixed so that classification does not depend on the I/O block size.
const SNIFF_WINDOW: usize = 4096;

pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
pub const UTF16LE_BOM: &[u8] = &[0xFF, 0xFE];
pub const UTF16BE_BOM: &[u8] = &[0xFE, 0xFF];

/// On-disk encoding of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Single byte per character, no BOM.
    #[default]
    EightBit,
    /// UTF-8 detected without a BOM (cookie or content sniffing).
    Utf8,
    /// UTF-8 with the EF BB BF signature.
    Utf8Bom,
    /// UTF-16 little endian with BOM.
    Utf16Le,
    /// UTF-16 big endian with BOM.
    Utf16Be,
}

impl Encoding {
    /// The signature written at the start of the file.
    pub fn bom(self) -> &'static [u8] {
        match self {
            Encoding::Utf8Bom => UTF8_BOM,
            Encoding::Utf16Le => UTF16LE_BOM,
            Encoding::Utf16Be => UTF16BE_BOM,
            Encoding::EightBit | Encoding::Utf8 => &[],
        }
    }

    pub fn is_unicode(self) -> bool {
        self != Encoding::EightBit
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::EightBit => "8-bit",
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf8Bom => "UTF-8 BOM",
            Encoding::Utf16Le => "UTF-16 LE",
            Encoding::Utf16Be => "UTF-16 BE",
        }
    }

    fn codec(self) -> &'static encoding_rs::Encoding {
        match self {
            Encoding::EightBit => WINDOWS_1252,
            Encoding::Utf8 | Encoding::Utf8Bom => UTF_8,
            Encoding::Utf16Le => UTF_16LE,
            Encoding::Utf16Be => UTF_16BE,
        }
    }
}

fn cookie_pattern() -> Option<&'static Regex> {
    static COOKIE: OnceLock<Option<Regex>> = OnceLock::new();
    COOKIE
        .get_or_init(|| Regex::new(r#"(?i)coding[:=]\s*["']?utf-?8"#).ok())
        .as_ref()
}

/// True when one of the first two lines declares UTF-8 (`# -*- coding: utf-8 -*-`).
fn has_utf8_cookie(window: &[u8]) -> bool {
    let Some(cookie) = cookie_pattern() else {
        return false;
    };
    window
        .split(|&b| b == b'\n')
        .take(2)
        .any(|line| cookie.is_match(line))
}

/// Valid UTF-8 apart from a sequence cut off by the end of the window.
fn looks_like_utf8(window: &[u8]) -> bool {
    if window.is_ascii() {
        return false;
    }
    match std::str::from_utf8(window) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Classify the start of a file. Returns the encoding and the BOM length to skip.
pub fn classify(head: &[u8]) -> (Encoding, usize) {
    if let Some((codec, bom_len)) = encoding_rs::Encoding::for_bom(head) {
        let encoding = if codec == UTF_8 {
            Encoding::Utf8Bom
        } else if codec == UTF_16LE {
            Encoding::Utf16Le
        } else {
            Encoding::Utf16Be
        };
        return (encoding, bom_len);
    }
    let window = &head[..head.len().min(SNIFF_WINDOW)];
    if has_utf8_cookie(window) || looks_like_utf8(window) {
        (Encoding::Utf8, 0)
    } else {
        (Encoding::EightBit, 0)
    }
}

/// Incremental byte-to-text converter used by both load paths.
pub struct Reader {
    encoding: Option<Encoding>,
    pending: Vec<u8>,
    decoder: Option<encoding_rs::Decoder>,
}

impl Reader {
    pub fn new() -> Self {
        Self {
            encoding: None,
            pending: Vec::new(),
            decoder: None,
        }
    }

    /// Convert one block. Bytes may be held back until enough of the file has
    /// been seen to classify it, and partial sequences are carried to the next call.
    pub fn convert(&mut self, block: &[u8]) -> String {
        let mut out = String::new();
        if self.decoder.is_none() {
            self.pending.extend_from_slice(block);
            if self.pending.len() >= SNIFF_WINDOW {
                let head = std::mem::take(&mut self.pending);
                self.start(&head, &mut out, false);
            }
        } else {
            self.decode(block, &mut out, false);
        }
        out
    }

    /// Flush held bytes at end of input. A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        if self.decoder.is_none() {
            let head = std::mem::take(&mut self.pending);
            self.start(&head, &mut out, true);
        } else {
            self.decode(&[], &mut out, true);
        }
        self.decoder = None;
        out
    }

    /// Encoding accumulated so far; 8-bit until classified.
    pub fn encoding(&self) -> Encoding {
        self.encoding.unwrap_or_default()
    }

    fn start(&mut self, head: &[u8], out: &mut String, last: bool) {
        let (encoding, bom_len) = classify(head);
        self.encoding = Some(encoding);
        self.decoder = Some(encoding.codec().new_decoder_without_bom_handling());
        self.decode(&head[bom_len..], out, last);
    }

    fn decode(&mut self, mut src: &[u8], out: &mut String, last: bool) {
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        loop {
            let needed = decoder
                .max_utf8_buffer_length(src.len())
                .unwrap_or_else(|| src.len().saturating_mul(3).saturating_add(16));
            out.reserve(needed);
            let (result, read, _) = decoder.decode_to_string(src, out, last);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }
}

impl Default for Reader {
    fn default() -> Self {
        Self::new()
    }
}

/// A character the target encoding has no byte sequence for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unmappable(pub char);

/// Text-to-byte converter used by both save paths. Emits the BOM once.
///
/// Never substitutes: text the 8-bit code page cannot hold is an error, not
/// a numeric character reference.
pub struct Writer {
    encoding: Encoding,
    wrote_bom: bool,
    encoder: Option<encoding_rs::Encoder>,
}

impl Writer {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            wrote_bom: false,
            encoder: None,
        }
    }

    /// Append the encoded form of `text` to `out`. `text` always holds whole
    /// characters, so no surrogate pair is ever split between calls.
    pub fn encode(&mut self, text: &str, out: &mut Vec<u8>) -> Result<(), Unmappable> {
        self.write_bom(out);
        match self.encoding {
            Encoding::Utf8 | Encoding::Utf8Bom => out.extend_from_slice(text.as_bytes()),
            Encoding::Utf16Le => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            Encoding::Utf16Be => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
            }
            Encoding::EightBit => {
                let encoder = self
                    .encoder
                    .get_or_insert_with(|| WINDOWS_1252.new_encoder());
                let mut src = text;
                loop {
                    let needed = encoder
                        .max_buffer_length_from_utf8_without_replacement(src.len())
                        .unwrap_or_else(|| src.len().saturating_add(16));
                    out.reserve(needed);
                    let (result, read) =
                        encoder.encode_from_utf8_to_vec_without_replacement(src, out, false);
                    src = &src[read..];
                    match result {
                        EncoderResult::InputEmpty => break,
                        EncoderResult::OutputFull => continue,
                        EncoderResult::Unmappable(c) => return Err(Unmappable(c)),
                    }
                }
            }
        }
        Ok(())
    }

    /// Emit the BOM even for an empty document so the encoding survives a reload.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        self.write_bom(out);
    }

    fn write_bom(&mut self, out: &mut Vec<u8>) {
        if !self.wrote_bom {
            out.extend_from_slice(self.encoding.bom());
            self.wrote_bom = true;
        }
    }
}

/// Decode a complete byte slice in one go.
pub fn decode_all(bytes: &[u8]) -> (String, Encoding) {
    let mut reader = Reader::new();
    let mut text = reader.convert(bytes);
    text.push_str(&reader.finish());
    (text, reader.encoding())
}

/// Decode bytes known to be in `encoding`, skipping its BOM when present.
pub fn decode_as(bytes: &[u8], encoding: Encoding) -> String {
    let body = bytes.strip_prefix(encoding.bom()).unwrap_or(bytes);
    let (text, _) = encoding.codec().decode_without_bom_handling(body);
    text.into_owned()
}

/// Encode a complete string in one go.
pub fn encode_all(text: &str, encoding: Encoding) -> Result<Vec<u8>, Unmappable> {
    let mut writer = Writer::new(encoding);
    let mut out = Vec::with_capacity(text.len() + 3);
    writer.encode(text, &mut out)?;
    writer.finish(&mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bom_forces_mode() {
        assert_eq!(classify(b"\xEF\xBB\xBFabc"), (Encoding::Utf8Bom, 3));
        assert_eq!(classify(b"\xFF\xFEa\x00"), (Encoding::Utf16Le, 2));
        assert_eq!(classify(b"\xFE\xFF\x00a"), (Encoding::Utf16Be, 2));
        assert_eq!(classify(b"plain ascii"), (Encoding::EightBit, 0));
    }

    #[test]
    fn test_heuristic_utf8() {
        assert_eq!(classify("caf\u{e9}\n".as_bytes()).0, Encoding::Utf8);
        // Latin-1 é on its own is not valid UTF-8
        assert_eq!(classify(b"caf\xE9\n").0, Encoding::EightBit);
        // A multi-byte sequence cut off by the window end still counts
        assert_eq!(classify(b"ab\xE2\x82").0, Encoding::Utf8);
    }

    #[test]
    fn test_cookie_in_first_two_lines() {
        assert_eq!(
            classify(b"#!/usr/bin/python\n# -*- coding: utf-8 -*-\n").0,
            Encoding::Utf8
        );
        assert_eq!(
            classify(b"line one\nline two\n# coding: utf-8\n").0,
            Encoding::EightBit
        );
    }

    #[test]
    fn test_utf16_split_across_blocks() {
        let bytes = encode_all("h\u{e9}llo \u{1F600}", Encoding::Utf16Le).unwrap();
        let mut reader = Reader::new();
        let mut text = String::new();
        for block in bytes.chunks(3) {
            text.push_str(&reader.convert(block));
        }
        text.push_str(&reader.finish());
        assert_eq!(text, "h\u{e9}llo \u{1F600}");
        assert_eq!(reader.encoding(), Encoding::Utf16Le);
    }

    #[test]
    fn test_eight_bit_preserves_every_byte() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let (text, encoding) = decode_all(&bytes);
        assert_eq!(encoding, Encoding::EightBit);
        assert_eq!(encode_all(&text, encoding).unwrap(), bytes);
    }

    #[test]
    fn test_writer_emits_bom_once() {
        let mut writer = Writer::new(Encoding::Utf8Bom);
        let mut out = Vec::new();
        writer.encode("ab", &mut out).unwrap();
        writer.encode("cd", &mut out).unwrap();
        writer.finish(&mut out);
        assert_eq!(out, b"\xEF\xBB\xBFabcd");
    }

    #[test]
    fn test_empty_bom_document_keeps_encoding() {
        let bytes = encode_all("", Encoding::Utf16Be).unwrap();
        assert_eq!(bytes, UTF16BE_BOM);
        assert_eq!(decode_all(&bytes), (String::new(), Encoding::Utf16Be));
    }

    #[test]
    fn test_decode_as_known_encoding() {
        assert_eq!(decode_as(b"\xEF\xBB\xBFabc", Encoding::Utf8Bom), "abc");
        assert_eq!(decode_as(b"caf\xE9", Encoding::EightBit), "caf\u{e9}");
        assert_eq!(decode_as(b"abc", Encoding::Utf8Bom), "abc");
    }

    #[test]
    fn test_eight_bit_refuses_unmappable_text() {
        let mut writer = Writer::new(Encoding::EightBit);
        let mut out = Vec::new();
        writer.encode("caf\u{e9} \u{a3}5", &mut out).unwrap();
        assert_eq!(out, b"caf\xE9 \xA35");
        assert_eq!(
            writer.encode("ok \u{65e5}\u{672c}", &mut out),
            Err(Unmappable('\u{65e5}'))
        );
        assert_eq!(
            encode_all("\u{1F600}", Encoding::EightBit),
            Err(Unmappable('\u{1F600}'))
        );
        // Unicode modes hold anything
        assert!(encode_all("\u{65e5}\u{1F600}", Encoding::Utf8).is_ok());
    }
}
