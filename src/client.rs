//! Session client for prijevodi-online.org
//!
//! The site has no API. A session logs into the forum, scrapes the home page
//! for the search endpoint, searches for a show, and then walks from the show
//! page to an episode page and finally to a subtitle archive. Every step
//! depends on state gathered by the previous ones, so the client keeps that
//! state and only moves forward.

use crate::scrape::{
    self, ArchiveListing, ScrapeError, SearchParams, SeasonTable, ShowListing,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default location of the site
pub const SITE_URL: &str = "https://www.prijevodi-online.org";

const LOGIN_PATH: &str = "/smf/index.php?action=login2";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.79 Safari/537.36";

/// Errors that can occur while talking to the site
#[derive(Debug, Error)]
pub enum PrevodiError {
    /// Transport failure or non-success HTTP status
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured site URL cannot be used to build request headers
    #[error("Invalid site URL {url}: {reason}")]
    InvalidSiteUrl { url: String, reason: String },

    /// Credentials were rejected
    #[error("Login failed: {0}")]
    Auth(String),

    /// Search parameters or the requested show could not be found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Season and episode are not part of the selected show
    #[error("Invalid parameters for TV show '{show}': season {season}, episode {episode}")]
    InvalidSelector {
        show: String,
        season: String,
        episode: String,
    },

    /// The download response is not a subtitle archive
    #[error("Archive name verification failed for {url}")]
    NotAnArchive { url: String },

    /// No download link was given
    #[error("Link for downloading archive was not provided")]
    MissingLink,
}

impl From<ScrapeError> for PrevodiError {
    fn from(error: ScrapeError) -> Self {
        PrevodiError::NotFound(error.to_string())
    }
}

/// Forum login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// The show picked from the search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedShow {
    /// Title as listed by the site
    pub title: String,
    /// Path of the show page
    pub url: String,
    /// Stable identifier built from the last two path segments of `url`
    pub id: String,
}

/// A downloaded subtitle archive
#[derive(Debug, Clone)]
pub struct DownloadedArchive {
    /// Normalized file name announced by the server
    pub filename: String,
    /// Raw archive content
    pub bytes: Vec<u8>,
}

/// An authenticated session with prijevodi-online.org
pub struct Prevodi {
    client: Client,
    site_url: String,
    credentials: Credentials,
    search: Option<SearchParams>,
    shows: ShowListing,
    show: Option<SelectedShow>,
    seasons: SeasonTable,
    archives: ArchiveListing,
}

impl Prevodi {
    /// Creates a client for the public site
    pub fn new(credentials: Credentials) -> Result<Self, PrevodiError> {
        Self::with_site_url(SITE_URL, credentials)
    }

    /// Creates a client for the site at `site_url`
    ///
    /// The `Origin` and `Referer` headers the site expects are derived from
    /// the URL. Cookies set by the login are kept for the whole session.
    pub fn with_site_url(site_url: &str, credentials: Credentials) -> Result<Self, PrevodiError> {
        let site_url = site_url.trim_end_matches('/').to_string();
        let headers = default_headers(&site_url)?;

        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            site_url,
            credentials,
            search: None,
            shows: ShowListing::new(),
            show: None,
            seasons: SeasonTable::new(),
            archives: ArchiveListing::new(),
        })
    }

    /// Logs into the forum
    ///
    /// The forum reports bad credentials on a regular page, so a successful
    /// response is still checked for an error message.
    pub fn login(&mut self) -> Result<(), PrevodiError> {
        debug!(user = %self.credentials.username, "Logging in");

        let body = self
            .client
            .post(self.url(LOGIN_PATH))
            .form(&[
                ("user", self.credentials.username.as_str()),
                ("passwrd", self.credentials.password.as_str()),
                ("cookielength", "-1"),
            ])
            .send()
            .and_then(Response::error_for_status)?
            .text()?;

        if let Some(message) = scrape::login_error(&body) {
            warn!(%message, "Login rejected");
            return Err(PrevodiError::Auth(message));
        }

        info!(user = %self.credentials.username, "Logged in");
        Ok(())
    }

    /// Searches shows by title
    ///
    /// An empty response means nothing was found and yields an empty listing.
    pub fn search(&mut self, term: &str) -> Result<&ShowListing, PrevodiError> {
        let params = self.search_params()?;
        let url = self.url(&params.url);

        debug!(%term, %url, "Searching");
        let body = self
            .client
            .post(url)
            .form(&[("search", term), ("key", params.key.as_str())])
            .send()
            .and_then(Response::error_for_status)?
            .text()?;

        self.shows = scrape::result_links(&body);
        debug!(count = self.shows.len(), "Search finished");

        Ok(&self.shows)
    }

    /// Selects a show from the last search and loads its seasons
    ///
    /// The title has to match a listed title exactly, ignoring case.
    pub fn select_show(&mut self, title: &str) -> Result<&SeasonTable, PrevodiError> {
        let wanted = title.to_lowercase();
        let (title, url) = self
            .shows
            .iter()
            .find(|(listed, _)| listed.to_lowercase() == wanted)
            .map(|(listed, url)| (listed.clone(), url.clone()))
            .ok_or_else(|| {
                PrevodiError::NotFound(format!("Exact show title '{}' could not be found", title))
            })?;

        let page = self
            .client
            .get(self.url(&url))
            .send()
            .and_then(Response::error_for_status)?
            .text()?;

        self.seasons = scrape::season_table(&page.replace(['\n', '\r'], ""));

        let id = show_id(&url);
        debug!(%title, %id, seasons = self.seasons.len(), "Show selected");
        self.show = Some(SelectedShow { title, url, id });

        Ok(&self.seasons)
    }

    /// Loads the subtitle archives of an episode of the selected show
    ///
    /// `season` and `episode` are zero-padded, two digit numbers.
    pub fn list_subtitles(
        &mut self,
        season: &str,
        episode: &str,
    ) -> Result<&ArchiveListing, PrevodiError> {
        let link = self
            .seasons
            .get(season)
            .and_then(|episodes| episodes.get(episode))
            .map(|link| link.url.clone())
            .ok_or_else(|| PrevodiError::InvalidSelector {
                show: self
                    .show
                    .as_ref()
                    .map(|s| s.title.clone())
                    .unwrap_or_default(),
                season: season.to_string(),
                episode: episode.to_string(),
            })?;

        let params = self.search_params()?;
        let body = self
            .client
            .post(format!("{}/", self.url(&link)))
            .form(&[("key", params.key.as_str())])
            .send()
            .and_then(Response::error_for_status)?
            .text()?;

        self.archives = scrape::archive_table(&body);
        debug!(season, episode, count = self.archives.len(), "Subtitles listed");

        Ok(&self.archives)
    }

    /// Downloads a subtitle archive, following redirects
    pub fn fetch_archive(&self, link: &str) -> Result<DownloadedArchive, PrevodiError> {
        if link.is_empty() {
            return Err(PrevodiError::MissingLink);
        }

        let url = self.url(link);
        let response = self
            .client
            .get(&url)
            .send()
            .and_then(Response::error_for_status)?;

        let filename = scrape::archive_filename(response.headers())
            .ok_or_else(|| PrevodiError::NotAnArchive { url: url.clone() })?;
        let bytes = response.bytes()?.to_vec();

        if !infer::is_archive(&bytes) {
            warn!(%filename, "Downloaded content does not look like an archive");
        }
        info!(
            %filename,
            size = %humansize::format_size(bytes.len(), humansize::DECIMAL),
            "Archive downloaded"
        );

        Ok(DownloadedArchive { filename, bytes })
    }

    /// Shows found by the last search
    pub fn shows(&self) -> &ShowListing {
        &self.shows
    }

    /// The currently selected show
    pub fn selected_show(&self) -> Option<&SelectedShow> {
        self.show.as_ref()
    }

    /// Seasons of the selected show
    pub fn seasons(&self) -> &SeasonTable {
        &self.seasons
    }

    /// Archives of the last listed episode
    pub fn archives(&self) -> &ArchiveListing {
        &self.archives
    }

    /// Returns the search parameters, scraping the home page on first use
    fn search_params(&mut self) -> Result<SearchParams, PrevodiError> {
        if let Some(params) = &self.search {
            return Ok(params.clone());
        }

        let home = self
            .client
            .get(format!("{}/", self.site_url))
            .send()
            .and_then(Response::error_for_status)?
            .text()?;

        let params = scrape::search_params(&home)?;
        debug!(url = %params.url, "Search parameters discovered");
        self.search = Some(params.clone());

        Ok(params)
    }

    /// Resolves a site relative path; absolute URLs are used as they are
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.site_url, path.trim_start_matches('/'))
        }
    }
}

/// Builds the browser-like header set the site expects from its own pages
fn default_headers(site_url: &str) -> Result<HeaderMap, PrevodiError> {
    let invalid = |reason: String| PrevodiError::InvalidSiteUrl {
        url: site_url.to_string(),
        reason,
    };

    let parsed = url::Url::parse(site_url).map_err(|e| invalid(e.to_string()))?;
    if parsed.host_str().is_none() {
        return Err(invalid("URL has no host".to_string()));
    }
    let origin = parsed.origin().ascii_serialization();

    let mut headers = HeaderMap::new();
    let mut insert = |name: HeaderName, value: String| -> Result<(), PrevodiError> {
        let value = HeaderValue::from_str(&value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(name, value);
        Ok(())
    };

    insert(ORIGIN, origin.clone())?;
    insert(REFERER, format!("{}/", origin))?;
    insert(USER_AGENT, BROWSER_USER_AGENT.to_string())?;
    insert(
        HeaderName::from_static("x-requested-with"),
        "XMLHttpRequest".to_string(),
    )?;
    insert(HeaderName::from_static("sec-fetch-mode"), "cors".to_string())?;
    insert(
        HeaderName::from_static("sec-fetch-site"),
        "same-origin".to_string(),
    )?;

    Ok(headers)
}

/// Joins the last two path segments of a show URL with a dash
///
/// `/serije/1234/foo-show` becomes `1234-foo-show`.
fn show_id(url: &str) -> String {
    let mut segments: Vec<&str> = url
        .trim_matches('/')
        .rsplit('/')
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();
    segments.reverse();
    segments.join("-")
}
