//! # Format Codec
//!
//! Turns raw file bytes into a [`Document`] and back. The store only talks to
//! the [`Codec`] trait, so a different text format can be plugged in through
//! [`crate::api::IniStore::with_codec`].
//!
//! ## INI Dialect
//!
//! - `[name]` starts a section; anything after the closing bracket is ignored.
//! - A line whose first visible character is not alphanumeric is a comment
//!   (`;`, `#`, `//`, ...).
//! - `key=value`, spaces around `=` allowed. The value ends at `#` or at a `;`
//!   preceded by whitespace.
//! - Other lines are kept but otherwise ignored.
//! - A repeated section header, or a repeated key inside one section, makes
//!   the file malformed.

use crate::error::{Result, StoreError};
use crate::model::{Document, Entry, Line, LineEnding, Section};

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Parser/serializer pair used by the cache.
pub trait Codec: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Document>;

    fn serialize(&self, document: &Document) -> Vec<u8>;
}

#[derive(Debug, Clone, Default)]
pub struct IniCodec {
    force_bom: bool,
}

impl IniCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always write a BOM, even for files that were read without one.
    pub fn with_bom(mut self, bom: bool) -> Self {
        self.force_bom = bom;
        self
    }
}

impl Codec for IniCodec {
    fn parse(&self, bytes: &[u8]) -> Result<Document> {
        let (bom, body) = match bytes.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, bytes),
        };
        let text = std::str::from_utf8(body).map_err(|e| {
            let line = body[..e.valid_up_to()]
                .iter()
                .filter(|b| **b == b'\n')
                .count();
            StoreError::format(line + 1, "invalid UTF-8")
        })?;

        let mut doc = Document {
            sections: Vec::new(),
            line_ending: if text.contains("\r\n") {
                LineEnding::CrLf
            } else {
                LineEnding::Lf
            },
            bom,
            trailing_newline: text.is_empty() || text.ends_with('\n'),
        };

        let mut current = Section::new("");
        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = raw.trim();

            if let Some(name) = parse_header(trimmed) {
                finish_section(&mut doc, current);
                if doc.has_section(name) {
                    return Err(StoreError::format(
                        line_no,
                        format!("duplicate section [{}]", name),
                    ));
                }
                current = Section {
                    name: name.to_string(),
                    header: Some(raw.to_string()),
                    lines: Vec::new(),
                };
                continue;
            }

            match parse_entry(trimmed) {
                Some((key, value)) => {
                    if current.entry(key).is_some() {
                        return Err(StoreError::format(
                            line_no,
                            format!("duplicate key '{}' in section [{}]", key, current.name),
                        ));
                    }
                    current.lines.push(Line::Entry(Entry {
                        key: key.to_string(),
                        value: value.to_string(),
                        raw: Some(raw.to_string()),
                    }));
                }
                None => current.lines.push(Line::Opaque(raw.to_string())),
            }
        }
        finish_section(&mut doc, current);

        Ok(doc)
    }

    fn serialize(&self, document: &Document) -> Vec<u8> {
        let mut lines: Vec<String> = Vec::new();
        for section in &document.sections {
            if let Some(header) = section.render_header() {
                lines.push(header);
            }
            for line in &section.lines {
                lines.push(match line {
                    Line::Entry(entry) => entry.render(),
                    Line::Opaque(text) => text.clone(),
                });
            }
        }

        let ending = document.line_ending.as_str();
        let mut text = lines.join(ending);
        if !lines.is_empty() && document.trailing_newline {
            text.push_str(ending);
        }

        let mut out = Vec::with_capacity(text.len() + BOM.len());
        if document.bom || self.force_bom {
            out.extend_from_slice(BOM);
        }
        out.extend_from_slice(text.as_bytes());
        out
    }
}

fn finish_section(doc: &mut Document, section: Section) {
    // An empty preamble is just the start of the file.
    if section.is_preamble() && section.lines.is_empty() {
        return;
    }
    doc.sections.push(section);
}

fn parse_header(trimmed: &str) -> Option<&str> {
    let rest = trimmed.strip_prefix('[')?;
    let end = rest.find(']')?;
    let name = rest[..end].trim();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn parse_entry(trimmed: &str) -> Option<(&str, &str)> {
    let first = trimmed.chars().next()?;
    if !first.is_alphanumeric() {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, strip_inline_comment(value).trim()))
}

fn strip_inline_comment(value: &str) -> &str {
    let mut prev_is_space = false;
    for (i, ch) in value.char_indices() {
        if ch == '#' || (ch == ';' && prev_is_space) {
            return &value[..i];
        }
        prev_is_space = ch.is_whitespace();
    }
    value
}
