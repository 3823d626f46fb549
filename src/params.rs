//! Query parameters of plugin URLs
//!
//! The host invokes every action with a query string such as
//! `?action=download&url=...&lang=hr`, and drill-down entries carry their
//! follow-up action the same way.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;

/// Actions the host can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Search subtitles for the playing or focused episode
    Search,
    /// Search with a term entered by the user
    ManualSearch,
    /// Download a subtitle picked from a search result
    Download,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Search => "search",
            Action::ManualSearch => "manualsearch",
            Action::Download => "download",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Action::Search),
            "manualsearch" => Ok(Action::ManualSearch),
            "download" => Ok(Action::Download),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded query parameters; the first occurrence of a key wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Parses a query string, with or without the leading `?`
    ///
    /// A full plugin URL is accepted too; everything up to the `?` is
    /// ignored then.
    pub fn parse(query: &str) -> Self {
        let query = match query.split_once('?') {
            Some((_, query)) => query,
            None => query,
        };

        let mut params = HashMap::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }

        Self(params)
    }

    /// Returns a parameter, treating empty values as missing
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Sets a parameter, replacing an existing value
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }
}

/// Encodes a value for use in a query string (spaces become `+`)
pub fn quote(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Builds a `plugin://` URL invoking `action` on the addon
pub fn plugin_url(addon_id: &str, action: Action, params: &[(&str, &str)]) -> String {
    let mut url = format!("plugin://{}/?action={}", addon_id, action);
    for (key, value) in params {
        url.push('&');
        url.push_str(key);
        url.push('=');
        url.push_str(&quote(value));
    }
    url
}
