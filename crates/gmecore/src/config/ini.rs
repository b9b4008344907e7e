//! INI file parser/writer for the shared state document.
//!
//! The format is the classic JSGME dialect:
//! - Sections in `[brackets]`
//! - Keys with `=` separator
//! - Comments start with `;` or `#`
//! - CRLF line endings on output
//! - List values are quote-delimited: `"ModA","ModB"`
//!
//! Sections this crate does not own are preserved verbatim across a
//! read/modify/write cycle, since the document may be shared with other
//! subsystems.

use std::collections::BTreeSet;
use std::path::Path;

/// A parsed INI file preserving section order and comments.
#[derive(Debug, Clone, Default)]
pub struct IniFile {
    /// Sections in order. Empty string key = global (no section header).
    pub sections: Vec<IniSection>,
}

#[derive(Debug, Clone)]
pub struct IniSection {
    pub name: String,
    pub entries: Vec<IniEntry>,
}

#[derive(Debug, Clone)]
pub enum IniEntry {
    Comment(String),
    KeyValue { key: String, value: String },
    Blank,
}

impl IniFile {
    /// Parse an INI file from string content.
    pub fn parse(content: &str) -> Self {
        let mut sections = Vec::new();
        let mut current_section = IniSection {
            name: String::new(),
            entries: Vec::new(),
        };

        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                current_section.entries.push(IniEntry::Blank);
            } else if trimmed.starts_with(';') || trimmed.starts_with('#') {
                current_section
                    .entries
                    .push(IniEntry::Comment(trimmed.to_string()));
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                sections.push(current_section);
                current_section = IniSection {
                    name: trimmed[1..trimmed.len() - 1].to_string(),
                    entries: Vec::new(),
                };
            } else if let Some(eq_pos) = trimmed.find('=') {
                let key = trimmed[..eq_pos].trim().to_string();
                let value = trimmed[eq_pos + 1..].trim().to_string();
                current_section
                    .entries
                    .push(IniEntry::KeyValue { key, value });
            } else {
                // Treat unknown lines as comments
                current_section
                    .entries
                    .push(IniEntry::Comment(trimmed.to_string()));
            }
        }

        sections.push(current_section);
        IniFile { sections }
    }

    /// Read and parse an INI file from disk.
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Serialize with CRLF line endings.
    pub fn write_to_string(&self) -> String {
        let mut out = String::new();
        let mut first_named = true;
        for section in &self.sections {
            if !section.name.is_empty() {
                if !first_named {
                    out.push_str("\r\n");
                }
                first_named = false;
                out.push('[');
                out.push_str(&section.name);
                out.push_str("]\r\n");
            } else if section.entries.is_empty() {
                // Skip empty global section entirely
                continue;
            }
            for entry in &section.entries {
                match entry {
                    IniEntry::Comment(c) => {
                        out.push_str(c);
                        out.push_str("\r\n");
                    }
                    IniEntry::KeyValue { key, value } => {
                        out.push_str(key);
                        out.push('=');
                        out.push_str(value);
                        out.push_str("\r\n");
                    }
                    IniEntry::Blank => {
                        out.push_str("\r\n");
                    }
                }
            }
        }
        out
    }

    /// Write the INI file to disk.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let content = self.write_to_string();
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get a value from a specific section by key.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.find_section(section).and_then(|s| {
            s.entries.iter().find_map(|e| match e {
                IniEntry::KeyValue { key: k, value } if k == key => Some(value.as_str()),
                _ => None,
            })
        })
    }

    /// All key-value pairs of a section, in file order.
    pub fn section_pairs(&self, section: &str) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(sec) = self.find_section(section) {
            for entry in &sec.entries {
                if let IniEntry::KeyValue { key, value } = entry {
                    pairs.push((key.clone(), value.clone()));
                }
            }
        }
        pairs
    }

    /// Replace a section's key-value entries wholesale, keeping its position
    /// in the file (or appending a new section). Comments inside the replaced
    /// section are discarded.
    pub fn replace_section(&mut self, section: &str, pairs: &[(String, String)]) {
        let sec = self.find_or_create_section(section);
        sec.entries = pairs
            .iter()
            .map(|(key, value)| IniEntry::KeyValue {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
    }

    fn find_section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn find_or_create_section(&mut self, name: &str) -> &mut IniSection {
        if !self.sections.iter().any(|s| s.name == name) {
            self.sections.push(IniSection {
                name: name.to_string(),
                entries: Vec::new(),
            });
        }
        self.sections.iter_mut().find(|s| s.name == name).unwrap()
    }
}

/// Encode a set of names as a quote-delimited list: `"A","B"`.
pub fn encode_name_list(names: &BTreeSet<String>) -> String {
    names
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a quote-delimited name list. Unquoted comma-separated input is
/// tolerated for hand-edited files.
pub fn decode_name_list(value: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return names;
    }

    if trimmed.contains('"') {
        let mut in_quotes = false;
        let mut current = String::new();
        for ch in trimmed.chars() {
            match ch {
                '"' => {
                    if in_quotes && !current.is_empty() {
                        names.insert(std::mem::take(&mut current));
                    }
                    in_quotes = !in_quotes;
                }
                _ if in_quotes => current.push(ch),
                _ => {}
            }
        }
    } else {
        for part in trimmed.split(',') {
            let part = part.trim();
            if !part.is_empty() {
                names.insert(part.to_string());
            }
        }
    }
    names
}
