//! Parser for the Java `.properties` headers stored inside JPK archives.
//!
//! JPK force maps split their headers in two: every segment carries a small
//! header and points into a shared header through `prefix.*=N` references.
//! [`Properties::resolve`] follows those references.

use std::collections::HashMap;

use thiserror::Error;

/// Errors raised while reading typed values.
#[derive(Error, Debug)]
pub enum PropertiesError {
    #[error("Missing property: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Result type for property lookups.
pub type Result<T> = std::result::Result<T, PropertiesError>;

/// Flat key/value map parsed from a `.properties` file.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: HashMap<String, String>,
}

impl Properties {
    /// Parse the text of a `.properties` file.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        let mut logical = String::new();

        for raw in text.lines() {
            let line = if logical.is_empty() { raw.trim_start() } else { raw.trim() };

            if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
                continue;
            }

            // Odd number of trailing backslashes means the line continues
            let trailing = line.chars().rev().take_while(|&c| c == '\\').count();
            if trailing % 2 == 1 {
                logical.push_str(&line[..line.len() - 1]);
                continue;
            }

            logical.push_str(line);
            if let Some((key, value)) = split_key_value(&logical) {
                entries.insert(unescape(&key), unescape(&value));
            }
            logical.clear();
        }

        if !logical.is_empty() {
            if let Some((key, value)) = split_key_value(&logical) {
                entries.insert(unescape(&key), unescape(&value));
            }
        }

        Self { entries }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Iterate over all keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        let value = self
            .get(key)
            .ok_or_else(|| PropertiesError::Missing(key.to_string()))?;
        value.trim().parse().map_err(|_| PropertiesError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let value = self
            .get(key)
            .ok_or_else(|| PropertiesError::Missing(key.to_string()))?;
        value.trim().parse().map_err(|_| PropertiesError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self
            .get(key)
            .ok_or_else(|| PropertiesError::Missing(key.to_string()))?;
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(PropertiesError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// First value whose key ends with `suffix`, in key order.
    pub fn find_suffix(&self, suffix: &str) -> Option<&str> {
        let mut keys: Vec<&String> = self.entries.keys().filter(|k| k.ends_with(suffix)).collect();
        keys.sort();
        keys.first().and_then(|k| self.get(k))
    }

    /// Look up `key` here, following `prefix.*=N` references into `shared`.
    ///
    /// For `channel.height.lcd-info.encoder.type` with a local entry
    /// `channel.height.lcd-info.*=2` the shared key is
    /// `lcd-info.2.encoder.type`.
    pub fn resolve(&self, key: &str, shared: Option<&Properties>) -> Option<String> {
        if let Some(value) = self.get(key) {
            return Some(value.to_string());
        }
        let shared = shared?;

        let parts: Vec<&str> = key.split('.').collect();
        for split in (1..parts.len()).rev() {
            let prefix = parts[..split].join(".");
            let Some(index) = self.get(&format!("{}.*", prefix)) else {
                continue;
            };
            let last = parts[split - 1];
            let rest = parts[split..].join(".");
            let shared_key = format!("{}.{}.{}", last, index.trim(), rest);
            if let Some(value) = shared.get(&shared_key) {
                return Some(value.to_string());
            }
        }
        None
    }

    /// [`Properties::resolve`] parsed as `f64`.
    pub fn resolve_f64(&self, key: &str, shared: Option<&Properties>) -> Result<f64> {
        let value = self
            .resolve(key, shared)
            .ok_or_else(|| PropertiesError::Missing(key.to_string()))?;
        value.trim().parse().map_err(|_| PropertiesError::InvalidValue {
            key: key.to_string(),
            value,
        })
    }
}

fn split_key_value(line: &str) -> Option<(String, String)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' => {
                let key = line[..i].to_string();
                let mut rest = line[i..].trim_start_matches([' ', '\t']);
                if let Some(stripped) = rest.strip_prefix(['=', ':']) {
                    rest = stripped.trim_start_matches([' ', '\t']);
                }
                return Some((key, rest.to_string()));
            }
            _ => {}
        }
    }
    if line.is_empty() {
        None
    } else {
        Some((line.to_string(), String::new()))
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
