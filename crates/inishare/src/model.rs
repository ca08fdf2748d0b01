//! # Document Model
//!
//! A [`Document`] is the in-memory form of one INI file: an ordered list of
//! [`Section`]s, each an ordered list of [`Line`]s.
//!
//! ## Case Rules
//!
//! Section names are unique ignoring case, and so are keys inside a section.
//! Lookups ignore case too; the spelling found on disk is kept.
//!
//! ## Formatting
//!
//! Comments, blank lines and lines the codec could not interpret are carried
//! as [`Line::Opaque`] and never looked at. Entries remember the line they were
//! parsed from and write it back unchanged until their value changes. Only
//! rewritten entries and new sections get the canonical `key=value` /
//! `[name]` form.
//!
//! ## The Preamble
//!
//! Keys written before the first `[header]` belong to a headerless section
//! whose name is the empty string. It is always the first section.

/// Line terminator used when the document is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// A `key=value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    /// The original text of the line, dropped once the value is rewritten.
    pub raw: Option<String>,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            raw: None,
        }
    }

    /// The text this entry serializes to.
    pub fn render(&self) -> String {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => format!("{}={}", self.key, self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Entry(Entry),
    /// Comment, blank or unparsable line.
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// The original header line, `None` for new sections and the preamble.
    pub header: Option<String>,
    pub lines: Vec<Line>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: None,
            lines: Vec::new(),
        }
    }

    pub fn is_preamble(&self) -> bool {
        self.name.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry(entry) => Some(entry),
            Line::Opaque(_) => None,
        })
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries().find(|e| names_match(&e.key, key))
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.lines.iter_mut().find_map(|line| match line {
            Line::Entry(entry) if names_match(&entry.key, key) => Some(entry),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The header line this section serializes to, if any.
    pub fn render_header(&self) -> Option<String> {
        if self.is_preamble() {
            return None;
        }
        Some(
            self.header
                .clone()
                .unwrap_or_else(|| format!("[{}]", self.name)),
        )
    }
}

/// Case-insensitive comparison used for section names and keys.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub sections: Vec<Section>,
    pub line_ending: LineEnding,
    /// The source started with a UTF-8 byte order mark.
    pub bom: bool,
    pub trailing_newline: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            sections: Vec::new(),
            line_ending: LineEnding::Lf,
            bom: false,
            trailing_newline: true,
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all sections in file order.
    ///
    /// The preamble is listed (as `""`) only when it holds at least one key.
    pub fn section_names(&self) -> Vec<String> {
        self.sections
            .iter()
            .filter(|s| !s.is_preamble() || !s.is_empty())
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| names_match(&s.name, name))
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| names_match(&s.name, name))
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    pub fn has_key(&self, section: &str, key: &str) -> bool {
        self.get_value(section, key).is_some()
    }

    pub fn get_value(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)
            .and_then(|s| s.entry(key))
            .map(|e| e.value.as_str())
    }

    /// Number of keys in `section`, zero when the section is missing.
    pub fn key_count(&self, section: &str) -> usize {
        self.section(section).map(Section::len).unwrap_or(0)
    }

    /// Keys of `section` in file order; empty when the section is missing.
    pub fn keys(&self, section: &str) -> Vec<String> {
        self.section(section)
            .map(|s| s.entries().map(|e| e.key.clone()).collect())
            .unwrap_or_default()
    }

    /// Set `key` in `section`, creating either when missing.
    ///
    /// Returns `false` when the stored value was already `value`.
    pub fn set_value(&mut self, section: &str, key: &str, value: &str) -> bool {
        if self.section(section).is_none() {
            let new_section = Section::new(section);
            if new_section.is_preamble() {
                self.sections.insert(0, new_section);
            } else {
                self.sections.push(new_section);
            }
        }

        let Some(target) = self.section_mut(section) else {
            return false;
        };

        if let Some(entry) = target.entry_mut(key) {
            if entry.value == value {
                return false;
            }
            entry.value = value.to_string();
            entry.raw = None;
            return true;
        }

        // Keep trailing blank lines and comments below the new key.
        let insert_at = target
            .lines
            .iter()
            .rposition(|line| matches!(line, Line::Entry(_)))
            .map(|i| i + 1)
            .unwrap_or_else(|| {
                target
                    .lines
                    .iter()
                    .take_while(|line| matches!(line, Line::Opaque(text) if !text.trim().is_empty()))
                    .count()
            });
        target
            .lines
            .insert(insert_at, Line::Entry(Entry::new(key, value)));
        true
    }

    /// Remove the section whose name matches `name`. Returns whether one was removed.
    pub fn remove_section(&mut self, name: &str) -> bool {
        match self.sections.iter().position(|s| names_match(&s.name, name)) {
            Some(index) => {
                self.sections.remove(index);
                true
            }
            None => false,
        }
    }
}
