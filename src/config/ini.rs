//! Minimal INI reader used for every configuration file.
//!
//! Format rules:
//! - `[Section]` headers; sections and keys compare case-insensitively
//! - `Key = Value` entries, split on the first `=`
//! - `;` or `#` start a comment that runs to end of line
//! - lines without `=` (outside headers) are ignored
//! - keys keep declaration order; a repeated key replaces the value in place
//!
//! Documents merge left to right: a later document's value wins per section-key, and keys it
//! introduces are appended to the section.

use std::path::{Path, PathBuf};

use log::{debug, warn};

/// One `[Section]` and its ordered entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IniSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(parse_bool)
    }

    /// Comma-separated list value; empty items dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(split_list).unwrap_or_default()
    }

    pub fn set(&mut self, key: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }
}

/// Parsed INI file (or the merge of several).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

impl IniDocument {
    pub fn parse(text: &str) -> Self {
        let mut doc = IniDocument::default();
        let mut current: Option<usize> = None;

        // UTF-8 BOM written by some editors.
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        for raw in text.lines() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let Some(name) = header.strip_suffix(']') else {
                    debug!("ignoring malformed section header '{}'", line);
                    continue;
                };
                current = Some(doc.section_index_or_insert(name.trim()));
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Some(index) = current else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            doc.sections[index].set(key, value.trim());
        }
        doc
    }

    /// Read and parse a file.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    fn section_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(index) = self
            .sections
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
        {
            return index;
        }
        self.sections.push(IniSection::new(name));
        self.sections.len() - 1
    }

    pub fn sections(&self) -> &[IniSection] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Sections named `<prefix><rest>`, yielding `(rest, section)` in document order.
    pub fn sections_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a IniSection)> + 'a {
        self.sections.iter().filter_map(move |s| {
            let head = s.name.get(..prefix.len())?;
            head.eq_ignore_ascii_case(prefix)
                .then(|| (&s.name[prefix.len()..], s))
        })
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    /// Fold `other` into `self`; `other` wins per section-key.
    pub fn merge(&mut self, other: IniDocument) {
        for section in other.sections {
            let index = self.section_index_or_insert(&section.name);
            for (key, value) in section.entries {
                self.sections[index].set(&key, &value);
            }
        }
    }
}

/// Project configuration directory: `<prefix>.ini` followed by `<prefix>_*.ini`.
#[derive(Debug, Clone)]
pub struct ConfigDir {
    pub root: PathBuf,
    pub prefix: String,
}

/// File prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "StashFlow";

impl ConfigDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Matching files: the main file first, then `<prefix>_*.ini` alphabetically.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let main = self.root.join(format!("{}.ini", self.prefix));
        if main.is_file() {
            files.push(main);
        }

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("cannot read config directory {}: {}", self.root.display(), err);
                return files;
            }
        };
        let fragment_prefix = format!("{}_", self.prefix.to_ascii_lowercase());
        let mut fragments: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| {
                        let lower = n.to_ascii_lowercase();
                        lower.starts_with(&fragment_prefix) && lower.ends_with(".ini")
                    })
                    .unwrap_or(false)
            })
            .collect();
        fragments.sort_by_key(|path| path.file_name().map(|n| n.to_ascii_lowercase()));
        files.extend(fragments);
        files
    }

    /// Parse every matching file individually; unreadable files are logged and skipped.
    pub fn documents(&self) -> Vec<(PathBuf, IniDocument)> {
        self.files()
            .into_iter()
            .filter_map(|path| match IniDocument::load(&path) {
                Ok(doc) => Some((path, doc)),
                Err(err) => {
                    warn!("skipping unreadable config {}: {}", path.display(), err);
                    None
                }
            })
            .collect()
    }

    /// All matching files merged in order.
    pub fn merged(&self) -> IniDocument {
        let mut merged = IniDocument::default();
        for (_, doc) in self.documents() {
            merged.merge(doc);
        }
        merged
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}

fn strip_comment(line: &str) -> &str {
    match line.find([';', '#']) {
        Some(index) => &line[..index],
        None => line,
    }
}
