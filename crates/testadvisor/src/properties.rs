//! Registry properties file (`testadvisor.properties`).
//!
//! Java-properties syntax: one `key=value` (or `key:value`) per line, `#`
//! and `!` start comments, backslash escapes `\=`, `\:`, `\\`, `\n`, `\t`,
//! and a trailing backslash continues a line. Saving writes keys in sorted
//! order as a whole-file rewrite.

use crate::result::{AdvisorError, AdvisorResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Property holding the client registry GUID
pub const CLIENT_GUID_KEY: &str = "ClientRegistryGuid";
/// Sandbox instance
pub const SANDBOX_INSTANCE_KEY: &str = "SandboxInstance";
/// Sandbox org name
pub const SANDBOX_ORG_NAME_KEY: &str = "SandboxOrgName";
/// Sandbox org id
pub const SANDBOX_ORG_ID_KEY: &str = "SandboxOrgId";
/// Suite name override
pub const TEST_SUITE_NAME_KEY: &str = "TestSuiteName";

/// Keys written into a freshly created registry
pub const DEFAULT_PROPERTIES: [(&str, &str); 10] = [
    (SANDBOX_INSTANCE_KEY, ""),
    (SANDBOX_ORG_NAME_KEY, ""),
    (SANDBOX_ORG_ID_KEY, ""),
    (TEST_SUITE_NAME_KEY, ""),
    ("auth.url", "https://test.salesforce.com"),
    ("portal.clientid", "clientid"),
    ("portal.url", ""),
    ("portal.token.encrypted", "no"),
    ("portal.accesstoken", ""),
    ("portal.refreshtoken", ""),
];

/// In-memory key/value properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Create empty properties
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Properties holding [`DEFAULT_PROPERTIES`]
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut props = Self::new();
        for (key, value) in DEFAULT_PROPERTIES {
            props.set(key, value);
        }
        props
    }

    /// Value for a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Value for a key, empty string when absent
    #[must_use]
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Set a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Iterate in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Generate a client GUID when none is set. Returns the GUID in effect.
    pub fn ensure_client_guid(&mut self) -> String {
        match self.get(CLIENT_GUID_KEY) {
            Some(guid) if !guid.is_empty() => guid.to_string(),
            _ => {
                let guid = Uuid::new_v4().to_string();
                self.set(CLIENT_GUID_KEY, guid.clone());
                guid
            }
        }
    }

    /// Parse properties text
    ///
    /// # Errors
    ///
    /// Returns error on a dangling escape at end of input
    pub fn parse(text: &str) -> AdvisorResult<Self> {
        let mut props = Self::new();
        let mut logical = String::new();

        for line in text.lines() {
            let trimmed = line.trim_start();
            if logical.is_empty() && (trimmed.is_empty() || trimmed.starts_with(['#', '!'])) {
                continue;
            }
            logical.push_str(trimmed);
            if ends_with_continuation(&logical) {
                logical.pop();
                continue;
            }
            let (key, value) = split_entry(&logical)?;
            props.set(key, value);
            logical.clear();
        }

        if !logical.is_empty() {
            let (key, value) = split_entry(&logical)?;
            props.set(key, value);
        }

        Ok(props)
    }

    /// Render as properties text
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("#TestAdvisor registry properties\n");
        for (key, value) in &self.entries {
            out.push_str(&escape(key, true));
            out.push('=');
            out.push_str(&escape(value, false));
            out.push('\n');
        }
        out
    }

    /// Read a properties file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> AdvisorResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Write a properties file, replacing its content
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn store(&self, path: &Path) -> AdvisorResult<()> {
        fs::write(path, self.render())?;
        Ok(())
    }
}

/// A line continues when it ends with an odd number of backslashes
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> AdvisorResult<(String, String)> {
    let mut key = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => key.push(unescape_char(chars.next(), line)?),
            '=' | ':' => break,
            c if c.is_whitespace() => {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                if chars.peek().is_some_and(|c| *c == '=' || *c == ':') {
                    chars.next();
                }
                break;
            }
            c => key.push(c),
        }
    }

    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }

    let mut value = String::new();
    while let Some(c) = chars.next() {
        if c == '\\' {
            value.push(unescape_char(chars.next(), line)?);
        } else {
            value.push(c);
        }
    }

    Ok((key, value))
}

fn unescape_char(c: Option<char>, line: &str) -> AdvisorResult<char> {
    match c {
        Some('n') => Ok('\n'),
        Some('t') => Ok('\t'),
        Some('r') => Ok('\r'),
        Some('f') => Ok('\u{c}'),
        Some(other) => Ok(other),
        None => Err(AdvisorError::properties(format!(
            "dangling escape in line '{line}'"
        ))),
    }
}

fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            c => out.push(c),
        }
    }
    out
}
