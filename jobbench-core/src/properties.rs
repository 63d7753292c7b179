use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Flat key/value configuration, as read from a `.properties` file or a flat YAML mapping.
///
/// Blank values are treated as absent, so `connections-min=` behaves like a missing key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    /// Loads a config file, picking the format from its extension (`.yaml`/`.yml` or properties).
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
            "yaml" | "yml" => Self::from_yaml(&text),
            _ => Ok(Self::parse(&text)),
        }
    }

    /// Parses Java-style properties: `key=value`, `key: value` or `key value`,
    /// `#`/`!` comments and trailing-backslash line continuations.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut values = BTreeMap::new();
        let mut pending = String::new();

        for raw in text.lines() {
            let line = raw.trim();
            if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
            {
                continue;
            }

            if let Some(stripped) = line.strip_suffix('\\') {
                pending.push_str(stripped);
                continue;
            }
            pending.push_str(line);

            let entry = std::mem::take(&mut pending);
            if let Some((key, value)) = split_entry(&entry) {
                values.insert(key.to_string(), value.to_string());
            }
        }

        if let Some((key, value)) = split_entry(&pending) {
            values.insert(key.to_string(), value.to_string());
        }

        Self { values }
    }

    /// Parses a flat YAML mapping of scalars. Nested values are rejected.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let doc: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(text)
            .map_err(|err| Error::Configuration(format!("invalid yaml config: {err}")))?;

        let mut values = BTreeMap::new();
        for (key, value) in doc {
            let value = match value {
                serde_yaml::Value::Null => continue,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::String(s) => s,
                _ => {
                    return Err(Error::Configuration(format!(
                        "`{key}` must be a scalar value in a flat mapping"
                    )));
                }
            };
            values.insert(key, value);
        }

        Ok(Self { values })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Applies `KEY=VALUE` overrides in order; later entries win.
    pub fn apply_overrides<'a, I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in overrides {
            self.set(key, value);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };

        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(Error::invalid(key, raw, "true or false")),
        }
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };

        raw.parse::<i64>()
            .map(Some)
            .map_err(|_| Error::invalid(key, raw, "an integer"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn split_entry(entry: &str) -> Option<(&str, &str)> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let sep = entry
        .char_indices()
        .find(|(_, ch)| matches!(ch, '=' | ':') || ch.is_whitespace())
        .map(|(idx, _)| idx);

    match sep {
        None => Some((entry, "")),
        Some(idx) => {
            let key = entry[..idx].trim();
            let rest = entry[idx..].trim_start();
            let value = rest
                .strip_prefix('=')
                .or_else(|| rest.strip_prefix(':'))
                .unwrap_or(rest)
                .trim();
            Some((key, value))
        }
    }
}
