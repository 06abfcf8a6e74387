//! Line-ending and indentation discovery, plus the text normalizations applied
//! before a save.
//!
//! Both discovery passes look at raw bytes: CR, LF, space and tab are ASCII and
//! can never appear inside a multi-byte UTF-8 sequence.

use std::fmt;

use ropey::Rope;

/// Discovery passes stop after this many bytes.
pub const DISCOVERY_LIMIT: usize = 1_000_000;

/// Line ending style of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EolMode {
    CrLf,
    Cr,
    #[default]
    Lf,
}

impl EolMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EolMode::CrLf => "\r\n",
            EolMode::Cr => "\r",
            EolMode::Lf => "\n",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "CRLF" => Some(EolMode::CrLf),
            "CR" => Some(EolMode::Cr),
            "LF" => Some(EolMode::Lf),
            _ => None,
        }
    }
}

impl fmt::Display for EolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EolMode::CrLf => "CRLF",
            EolMode::Cr => "CR",
            EolMode::Lf => "LF",
        };
        f.write_str(name)
    }
}

/// Tally of line terminators by style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineEndCounts {
    pub cr: usize,
    pub lf: usize,
    pub crlf: usize,
}

/// Count line ends in the first `limit` bytes of `rope`.
pub fn count_line_ends(rope: &Rope, limit: usize) -> LineEndCounts {
    let mut counts = LineEndCounts::default();
    let mut bytes = rope.bytes().take(limit).peekable();
    while let Some(b) = bytes.next() {
        match b {
            b'\r' => {
                if bytes.peek() == Some(&b'\n') {
                    bytes.next();
                    counts.crlf += 1;
                } else {
                    counts.cr += 1;
                }
            }
            b'\n' => counts.lf += 1,
            _ => {}
        }
    }
    counts
}

/// True when `a` is at least every other count and beats at least one of them.
fn dominates(a: usize, b: usize, c: usize) -> bool {
    a >= b && a >= c && (a > b || a > c)
}

/// Pick the dominant line ending. An exact tie across all three styles keeps
/// `current` rather than guessing.
pub fn discover_eol(counts: LineEndCounts, current: EolMode) -> EolMode {
    let LineEndCounts { cr, lf, crlf } = counts;
    if dominates(lf, cr, crlf) {
        EolMode::Lf
    } else if dominates(cr, lf, crlf) {
        EolMode::Cr
    } else if dominates(crlf, lf, cr) {
        EolMode::CrLf
    } else {
        current
    }
}

/// Indentation settings inferred from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndentStyle {
    pub use_tabs: bool,
    pub width: usize,
}

impl fmt::Display for IndentStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.use_tabs {
            write!(f, "tabs")
        } else {
            write!(f, "{} spaces", self.width)
        }
    }
}

/// Infer indentation from the first `limit` bytes.
///
/// Each line that starts indented with spaces votes for the step between its
/// indent and the previous line's (1-8), or repeats the previous vote when
/// the indent is unchanged. A line starting with a tab votes for tabs.
/// The highest tally wins; ties go to the smallest width with tabs ranked
/// below width 1. Returns `None` when nothing voted.
pub fn discover_indent(rope: &Rope, limit: usize, tab_size: usize) -> Option<IndentStyle> {
    // index 0 counts tab-indented lines, 1..=8 space steps
    let mut tallies = [0usize; 9];
    let mut newline = true;
    let mut indent: i64 = 0;
    let mut prev_indent: i64 = 0;
    let mut prev_step: Option<usize> = None;

    for b in rope.bytes().take(limit) {
        match b {
            b'\r' | b'\n' => {
                indent = 0;
                newline = true;
            }
            b' ' if newline => indent += 1,
            _ if newline => {
                if indent > 0 {
                    if indent == prev_indent {
                        if let Some(step) = prev_step {
                            tallies[step] += 1;
                        }
                    } else if indent > prev_indent && prev_indent != -1 {
                        let step = indent - prev_indent;
                        if step <= 8 {
                            let step = step as usize;
                            tallies[step] += 1;
                            prev_step = Some(step);
                        } else {
                            prev_step = None;
                        }
                    }
                    prev_indent = indent;
                } else if b == b'\t' {
                    tallies[0] += 1;
                    prev_indent = -1;
                } else {
                    prev_indent = 0;
                }
                newline = false;
            }
            _ => {}
        }
    }

    let mut top: Option<usize> = None;
    for (width, &tally) in tallies.iter().enumerate() {
        if tally > 0 && top.is_none_or(|t| tally > tallies[t]) {
            top = Some(width);
        }
    }
    match top? {
        0 => Some(IndentStyle {
            use_tabs: true,
            width: tab_size,
        }),
        width => Some(IndentStyle {
            use_tabs: false,
            width,
        }),
    }
}

/// Lengths of the common prefix and common suffix of two strings, both on
/// character boundaries and never overlapping. Equal strings give `(len, 0)`.
pub fn common_ends(a: &str, b: &str) -> (usize, usize) {
    let (ab, bb) = (a.as_bytes(), b.as_bytes());
    let length = ab.len().min(bb.len());
    let mut start = 0;
    while start < length && ab[start] == bb[start] {
        start += 1;
    }
    while !(a.is_char_boundary(start) && b.is_char_boundary(start)) {
        start -= 1;
    }
    let max_last = length - start;
    let mut last = 0;
    while last < max_last && ab[ab.len() - last - 1] == bb[bb.len() - last - 1] {
        last += 1;
    }
    while !(a.is_char_boundary(a.len() - last) && b.is_char_boundary(b.len() - last)) {
        last -= 1;
    }
    (start, last)
}

/// Split `text` into (content, terminator) pairs on CR, LF and CRLF.
fn lines_with_ends(text: &str) -> Vec<(&str, &str)> {
    let mut lines = Vec::new();
    let bytes = text.as_bytes();
    let mut line_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                let end = if bytes.get(i + 1) == Some(&b'\n') { i + 2 } else { i + 1 };
                lines.push((&text[line_start..i], &text[i..end]));
                line_start = end;
                i = end;
            }
            b'\n' => {
                lines.push((&text[line_start..i], &text[i..i + 1]));
                line_start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    lines.push((&text[line_start..], ""));
    lines
}

/// Remove spaces and tabs before every line end.
pub fn strip_trailing_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (content, end) in lines_with_ends(text) {
        out.push_str(content.trim_end_matches([' ', '\t']));
        out.push_str(end);
    }
    out
}

/// Append `eol` when the last line is not empty.
pub fn ensure_final_line_end(text: &str, eol: EolMode) -> String {
    let mut out = text.to_string();
    if !(text.is_empty() || text.ends_with(['\n', '\r'])) {
        out.push_str(eol.as_str());
    }
    out
}

/// Rewrite every line end as `eol`.
pub fn convert_eols(text: &str, eol: EolMode) -> String {
    let mut out = String::with_capacity(text.len());
    for (content, end) in lines_with_ends(text) {
        out.push_str(content);
        if !end.is_empty() {
            out.push_str(eol.as_str());
        }
    }
    out
}
