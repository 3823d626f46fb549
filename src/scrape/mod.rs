//! Extractors for the prijevodi-online.org markup
//!
//! Everything here is a pure function over raw HTML or response headers.
//! The extractors are tied to the exact shape of the site's markup: when the
//! markup doesn't match they return empty results instead of failing. The
//! only exception is [`search_params`], since nothing can be searched without
//! the values it extracts.

mod tag_scan;

use tag_scan::{ArchiveScanner, SeasonScanner, tag_events};

use crate::file_operations::{dashify, sanitize_filename};
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

static SEARCH_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"po_search\.url\s*=\s*'(\S+)'").expect("valid regex"));
static SEARCH_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"po_search\.key\s*=\s*'(\S+)'").expect("valid regex"));
static TV_SHOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(/serije/[^"\s]+)".*?</b>(.+?)</a>"#).expect("valid regex")
});
static LOGIN_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<p class="error">(.+)</p>"#).expect("valid regex"));
static ATTACHMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"attachment; filename="(.+)""#).expect("valid regex"));

/// Header sent with every subtitle archive download
const CONTENT_DESCRIPTION: &str = "content-description";
const CONTENT_TRANSFER_ENCODING: &str = "content-transfer-encoding";

/// Errors raised by the extractors that cannot degrade to an empty result
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScrapeError {
    /// One of the inline script assignments on the home page is missing
    #[error("Search {0} was not found")]
    SearchParamMissing(&'static str),
}

/// Search endpoint and key, published by the home page as inline script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    /// Endpoint path relative to the site root
    pub url: String,
    /// Key that has to be posted along with every search
    pub key: String,
}

/// Show title to show page path, as returned by a search
pub type ShowListing = BTreeMap<String, String>;

/// A link to the subtitle list of one episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeLink {
    /// Text of the link, e.g. the episode title
    pub label: String,
    /// Path of the episode's subtitle page
    pub url: String,
}

/// Season number to episode number to link, keys zero-padded to two digits
pub type SeasonTable = BTreeMap<String, BTreeMap<String, EpisodeLink>>;

/// One downloadable subtitle archive of an episode
///
/// Serialized as a two element array, which is the shape of the on-disk
/// `subtitles.json` cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct ArchiveEntry {
    /// Release description, usually mentions the language
    pub description: String,
    /// Which video releases the subtitle is synced to
    pub suitability: String,
}

impl From<(String, String)> for ArchiveEntry {
    fn from((description, suitability): (String, String)) -> Self {
        Self {
            description,
            suitability,
        }
    }
}

impl From<ArchiveEntry> for (String, String) {
    fn from(entry: ArchiveEntry) -> Self {
        (entry.description, entry.suitability)
    }
}

/// Download path to archive description
pub type ArchiveListing = BTreeMap<String, ArchiveEntry>;

/// Extracts the search endpoint and key from the home page
pub fn search_params(html: &str) -> Result<SearchParams, ScrapeError> {
    let url = SEARCH_URL_RE
        .captures(html)
        .map(|c| c[1].to_string())
        .ok_or(ScrapeError::SearchParamMissing("URL"))?;
    let key = SEARCH_KEY_RE
        .captures(html)
        .map(|c| c[1].to_string())
        .ok_or(ScrapeError::SearchParamMissing("key"))?;

    Ok(SearchParams { url, key })
}

/// Extracts show titles and their page paths from a search result
pub fn result_links(html: &str) -> ShowListing {
    TV_SHOW_RE
        .captures_iter(html)
        .map(|c| (c[2].to_string(), c[1].to_string()))
        .collect()
}

/// Builds the season/episode table from a show page
pub fn season_table(html: &str) -> SeasonTable {
    let mut scanner = SeasonScanner::default();
    for event in tag_events(html) {
        scanner.feed(&event);
    }
    scanner.finish()
}

/// Builds the archive listing from an episode page
pub fn archive_table(html: &str) -> ArchiveListing {
    let mut scanner = ArchiveScanner::default();
    for event in tag_events(html) {
        scanner.feed(&event);
    }
    scanner.finish()
}

/// Returns the error message of a rejected login, as plain text
///
/// The forum answers failed logins with a regular 200 page, so the body has
/// to be checked for the error paragraph.
pub fn login_error(html: &str) -> Option<String> {
    LOGIN_ERROR_RE
        .captures(html)
        .map(|c| nanohtml2text::html2text(&c[1]).trim().to_string())
}

/// Derives the archive file name from download response headers
///
/// Returns `None` unless the response carries the attachment signature of a
/// subtitle download: `Content-Description: File Transfer`,
/// `Content-Transfer-Encoding: binary` and an attachment
/// `Content-Disposition`.
pub fn archive_filename(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| headers.get(name).map(header_text);

    if header(CONTENT_DESCRIPTION)? != "File Transfer" {
        return None;
    }
    if header(CONTENT_TRANSFER_ENCODING)? != "binary" {
        return None;
    }

    let disposition = header(CONTENT_DISPOSITION.as_str())?;
    let name = ATTACHMENT_RE.captures(&disposition)?;

    let name = dashify(&sanitize_filename(&name[1]));
    if name.is_empty() { None } else { Some(name) }
}

/// Decodes a header value as UTF-8, falling back to Latin-1
///
/// Servers put non-ASCII file names into `Content-Disposition` as raw bytes.
fn header_text(value: &HeaderValue) -> Cow<'_, str> {
    let bytes = value.as_bytes();
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}
