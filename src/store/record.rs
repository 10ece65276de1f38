//! Credential records parsed from decrypted store entries.
//!
//! An entry's first line is the password. Every later `key: value` line
//! becomes a field; synonyms are folded into `login` and `url`, `host` is
//! derived from `url`, and a default `pattern` is synthesized from `host`.

use std::collections::BTreeMap;

use serde::Serialize;
use url::Url;

use super::glob::glob_match;

/// Raw keys folded into `login`, highest priority first.
const LOGIN_SYNONYMS: [&str; 3] = ["user", "username", "name"];

/// Raw keys folded into `url`, highest priority first.
const URL_SYNONYMS: [&str; 3] = ["uri", "host", "homepage"];

/// A normalized store entry. Serializes as one flat JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialRecord {
    pub password: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl CredentialRecord {
    /// Parse decrypted lines into a record.
    ///
    /// Returns `None` for an empty entry, or when the entry has neither a
    /// `pattern` nor a `url` from which one can be derived.
    pub fn from_lines<I, S>(lines: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lines = lines.into_iter();
        let password = lines.next()?.as_ref().to_string();

        let mut fields = BTreeMap::new();
        for line in lines {
            let Some((key, value)) = line.as_ref().split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            if key.is_empty() || key == "password" {
                continue;
            }
            fields
                .entry(key)
                .or_insert_with(|| value.trim().to_string());
        }

        Self::normalize(password, fields)
    }

    fn normalize(password: String, mut fields: BTreeMap<String, String>) -> Option<Self> {
        collapse(&mut fields, "login", &LOGIN_SYNONYMS);
        collapse(&mut fields, "url", &URL_SYNONYMS);

        if let Some(host) = fields.get("url").and_then(|url| host_of(url)) {
            fields.insert("host".to_string(), host);
        }

        if !fields.contains_key("pattern") {
            let host = fields.get("host")?;
            // IPv6 hosts carry brackets, which would otherwise open a class.
            let pattern = format!("*{}/*", host.replace('[', "[[]"));
            fields.insert("pattern".to_string(), pattern);
        }

        Some(Self { password, fields })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn pattern(&self) -> Option<&str> {
        self.get("pattern")
    }

    /// Whether this record's pattern glob-matches `identifier`.
    pub fn matches(&self, identifier: &str) -> bool {
        self.pattern()
            .map(|pattern| glob_match(pattern, identifier))
            .unwrap_or(false)
    }
}

/// Fold `synonyms` into `canonical`. An existing canonical key wins; every
/// synonym is removed either way.
fn collapse(fields: &mut BTreeMap<String, String>, canonical: &str, synonyms: &[&str]) {
    let chosen = synonyms.iter().find_map(|key| fields.get(*key).cloned());
    for key in synonyms {
        fields.remove(*key);
    }
    if let Some(value) = chosen {
        fields.entry(canonical.to_string()).or_insert(value);
    }
}

/// Network location of `url`: host plus any explicit non-default port.
///
/// Scheme-less values such as `example.com/login` are read as `https://`.
pub fn host_of(url: &str) -> Option<String> {
    let url = url.trim();
    let parsed = match Url::parse(url) {
        Ok(parsed) if parsed.host_str().is_some() => parsed,
        _ if !url.contains("://") => Url::parse(&format!("https://{}", url)).ok()?,
        _ => return None,
    };
    let host = parsed.host_str().filter(|h| !h.is_empty())?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
