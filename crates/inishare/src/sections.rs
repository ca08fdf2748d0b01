//! # Section Name Resolution
//!
//! New data is written under a namespaced section, `<root>\<label>`. Older
//! files still carry the bare `<label>` sections, and some files contain both.
//! [`SectionResolver::resolve`] decides which of the two a caller's label
//! refers to, given the sections the target file already has.
//!
//! ## Rules
//!
//! With namespacing off, the label is used as is. Otherwise, with
//! `normalized = <root>\<label>`:
//!
//! | Label | Existing sections | Result |
//! |-------|-------------------|--------|
//! | already under root, tail well-known | any | `normalized` |
//! | already under root | tail and `normalized` both | the one with more keys, `normalized` on a tie |
//! | already under root | otherwise | `normalized` |
//! | well-known | both | `normalized` |
//! | well-known | only the bare label | bare label |
//! | well-known | otherwise | `normalized` |
//! | other | both | bare label |
//! | other | only `normalized` | `normalized` |
//! | other | otherwise | bare label |
//!
//! "Both" is a duplicate. It is logged and left alone: nothing is merged,
//! renamed or deleted, so the losing section stays in the file.
//!
//! Presence checks and the well-known list ignore case, like the rest of the
//! document model.

use crate::config::StoreConfig;
use crate::model::{names_match, Document};
use tracing::warn;

const SEPARATOR: char = '\\';

/// Per-call switch for namespacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolve {
    #[default]
    Smart,
    /// Use the label exactly as given.
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub name: String,
    /// Both the bare and the namespaced section exist.
    pub duplicate: bool,
}

impl Resolution {
    fn unique(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duplicate: false,
        }
    }

    fn duplicate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duplicate: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SectionResolver {
    root: String,
    well_known: Vec<String>,
    enabled: bool,
}

impl SectionResolver {
    pub fn new<I, S>(root: impl Into<String>, well_known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.into(),
            well_known: well_known.into_iter().map(Into::into).collect(),
            enabled: true,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            config.namespace_root.clone(),
            config.well_known_sections.iter().cloned(),
        )
        .with_enabled(config.smart_sections)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_well_known(&self, label: &str) -> bool {
        self.well_known.iter().any(|known| names_match(known, label))
    }

    /// Whether `label` already starts with the namespace root.
    pub fn is_normalized(&self, label: &str) -> bool {
        !label.is_empty()
            && label
                .get(..self.root.len())
                .is_some_and(|prefix| names_match(prefix, &self.root))
    }

    /// `<root>\<label>`, the label unchanged when it is already under the
    /// root, the root itself for an empty label.
    pub fn normalize(&self, label: &str) -> String {
        if label.is_empty() {
            self.root.clone()
        } else if self.is_normalized(label) {
            label.to_string()
        } else {
            format!("{}{}{}", self.root, SEPARATOR, label)
        }
    }

    pub fn resolve(&self, raw: &str, doc: &Document, mode: Resolve) -> Resolution {
        if !self.enabled || mode == Resolve::Literal {
            return Resolution::unique(raw);
        }

        let normalized = self.normalize(raw);

        if self.is_normalized(raw) {
            let tail = raw.rsplit(SEPARATOR).next().unwrap_or(raw);
            if self.is_well_known(tail) {
                return Resolution::unique(normalized);
            }
            if !names_match(tail, &normalized)
                && is_present(doc, tail)
                && is_present(doc, &normalized)
            {
                let normalized_keys = doc.key_count(&normalized);
                let tail_keys = doc.key_count(tail);
                let winner = if tail_keys > normalized_keys {
                    tail.to_string()
                } else {
                    normalized
                };
                warn!(
                    section = raw,
                    bare = tail,
                    bare_keys = tail_keys,
                    namespaced_keys = normalized_keys,
                    chosen = %winner,
                    "duplicate section found"
                );
                return Resolution::duplicate(winner);
            }
            return Resolution::unique(normalized);
        }

        let has_normalized = is_present(doc, &normalized);
        let has_raw = is_present(doc, raw);

        if self.is_well_known(raw) {
            if has_normalized && has_raw {
                warn!(section = raw, chosen = %normalized, "duplicate section found");
                return Resolution::duplicate(normalized);
            }
            if !has_normalized && has_raw {
                return Resolution::unique(raw);
            }
            return Resolution::unique(normalized);
        }

        if has_normalized && has_raw {
            warn!(section = raw, chosen = raw, "duplicate section found");
            return Resolution::duplicate(raw);
        }
        if has_normalized {
            return Resolution::unique(normalized);
        }
        Resolution::unique(raw)
    }
}

/// A comment-only preamble does not count as a section.
fn is_present(doc: &Document, name: &str) -> bool {
    doc.section(name)
        .is_some_and(|s| !s.is_preamble() || !s.is_empty())
}
