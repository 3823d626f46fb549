//! Action dispatch
//!
//! The media player invokes the addon with a query string naming an action.
//! `search` lists subtitles for an episode, `manualsearch` lists shows for a
//! typed term, and `download` fetches and unpacks the subtitle picked from a
//! search result.

use crate::archive::Archive;
use crate::archive::unrar::UnrarTool;
use crate::cache::CacheStorage;
use crate::client::{Credentials, Prevodi, PrevodiError};
use crate::config::{AppDirs, Config};
use crate::file_operations::{
    execute_copy, execute_rename, possible_subtitles, subtitle_candidate,
};
use crate::languages::LanguageFilter;
use crate::params::{Action, Params, plugin_url};
use crate::scrape::ArchiveListing;
use crate::{HandlerError, ProgressEvent};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Identifier of the addon, used in drill-down URLs
pub const ADDON_ID: &str = "service.subtitles.prevodi";

/// Name of the archive listing file in an episode's cache directory
const SUBTITLES_FILE: &str = "subtitles.json";

/// The episode subtitles are looked for
///
/// Filled from the playing file or the focused list item by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaInfo {
    pub year: String,
    /// Zero-padded to two digits
    pub season: String,
    /// Zero-padded to two digits
    pub episode: String,
    pub title: String,
    pub original_title: String,
    pub show_title: String,
    /// Path or URL of the video file
    pub file_path: String,
}

impl MediaInfo {
    /// Describes an episode, padding season and episode numbers
    pub fn episode(show_title: &str, season: &str, episode: &str, file_path: &str) -> Self {
        Self {
            season: pad(season),
            episode: pad(episode),
            show_title: show_title.to_string(),
            file_path: file_path.to_string(),
            ..Default::default()
        }
    }

    /// Title to search the site for
    pub fn search_title(&self) -> &str {
        if self.show_title.is_empty() {
            &self.title
        } else {
            &self.show_title
        }
    }

    /// Applies `tvshow`, `season`, `episode` and `filepath` query parameters
    fn with_params(&self, params: &Params) -> Self {
        let mut media = self.clone();
        if let Some(show) = params.get("tvshow") {
            media.show_title = show.to_string();
        }
        if let Some(season) = params.get("season") {
            media.season = pad(season);
        }
        if let Some(episode) = params.get("episode") {
            media.episode = pad(episode);
        }
        if let Some(file_path) = params.get("filepath") {
            media.file_path = file_path.to_string();
        }
        media
    }
}

fn pad(number: &str) -> String {
    format!("{:0>2}", number.trim())
}

/// An item handed back to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEntry {
    /// A subtitle file ready to be loaded
    Subtitle { path: PathBuf, lang: String },
    /// A selectable row invoking `url` when picked
    Listing {
        label: String,
        label2: String,
        /// Language code shown as a flag
        thumbnail: String,
        url: String,
    },
}

/// Runs actions against the site with a fixed configuration
pub struct ActionHandler {
    config: Config,
    dirs: AppDirs,
    unrar: UnrarTool,
    media: MediaInfo,
}

impl ActionHandler {
    pub fn new(config: Config, dirs: AppDirs, unrar: UnrarTool, media: MediaInfo) -> Self {
        Self {
            config,
            dirs,
            unrar,
            media,
        }
    }

    /// Housekeeping before an action runs
    ///
    /// Empties the temp directory, creates the working directories and
    /// removes expired cache entries. Returns the removed cache paths.
    pub fn prepare(&self) -> Result<Vec<PathBuf>, HandlerError> {
        if self.dirs.temp.exists() {
            fs::remove_dir_all(&self.dirs.temp).map_err(|e| HandlerError::Io {
                path: self.dirs.temp.clone(),
                source: e,
            })?;
        }
        for dir in [&self.dirs.cache, &self.dirs.unrar, &self.dirs.temp] {
            fs::create_dir_all(dir).map_err(|e| HandlerError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }

        let Some(max_age) = self.config.cache_max_age() else {
            return Ok(Vec::new());
        };
        let removed = self.cache()?.sweep(max_age)?;
        debug!(
            "Removed {} items older than {} days",
            removed.len(),
            self.config.cache_max_age_days
        );

        Ok(removed)
    }

    /// Runs the action named by the `action` parameter of a query string
    pub fn run_query<F>(
        &self,
        query: &str,
        progress_callback: F,
    ) -> Result<Vec<DirectoryEntry>, HandlerError>
    where
        F: FnMut(ProgressEvent),
    {
        let params = Params::parse(query);
        debug!(%query, "Action handler invoked");

        let action = params
            .get("action")
            .ok_or(HandlerError::MissingParameter("action"))?
            .parse::<Action>()
            .map_err(HandlerError::UnknownAction)?;

        self.run(action, &params, progress_callback)
    }

    /// Logs in and runs `action`
    ///
    /// Progress events are emitted through the callback, pass `|_| {}` to
    /// stay silent.
    pub fn run<F>(
        &self,
        action: Action,
        params: &Params,
        mut progress_callback: F,
    ) -> Result<Vec<DirectoryEntry>, HandlerError>
    where
        F: FnMut(ProgressEvent),
    {
        if self.config.username.is_empty() || self.config.password.is_empty() {
            return Err(HandlerError::MissingCredentials);
        }

        let credentials = Credentials {
            username: self.config.username.clone(),
            password: self.config.password.clone(),
        };
        let mut session = Prevodi::with_site_url(&self.config.site_url, credentials)?;

        progress_callback(ProgressEvent::LoggingIn {
            username: self.config.username.clone(),
        });
        session.login()?;

        let entries = match action {
            Action::Search => self.search(&mut session, params, &mut progress_callback)?,
            Action::ManualSearch => {
                self.manual_search(&mut session, params, &mut progress_callback)?
            }
            Action::Download => self.download(&session, params, &mut progress_callback)?,
        };

        progress_callback(ProgressEvent::Complete {
            entry_count: entries.len(),
        });

        Ok(entries)
    }

    fn cache(&self) -> Result<CacheStorage<ArchiveListing>, HandlerError> {
        Ok(CacheStorage::open(&self.dirs.cache, SUBTITLES_FILE)?)
    }

    fn language_filter(&self, params: &Params) -> LanguageFilter {
        match params.get("languages") {
            Some(languages) => {
                let names: Vec<&str> = languages.split(',').map(str::trim).collect();
                LanguageFilter::new(&names)
            }
            None => LanguageFilter::new(&self.config.languages),
        }
    }

    /// Lists the subtitles of the current episode in the configured languages
    fn search(
        &self,
        session: &mut Prevodi,
        params: &Params,
        progress_callback: &mut impl FnMut(ProgressEvent),
    ) -> Result<Vec<DirectoryEntry>, HandlerError> {
        let media = self.media.with_params(params);
        let title = media.search_title();
        let cache = self.cache()?;
        let cache_dir = cache.episode_dir(title, &media.season, &media.episode);
        debug!(?media, cache_dir = %cache_dir.display(), "Searching for subtitles");

        let archives = match cache.load(&cache_dir)? {
            Some(archives) => {
                progress_callback(ProgressEvent::LoadedFromCache {
                    cache_dir: cache_dir.clone(),
                });
                archives
            }
            None => {
                progress_callback(ProgressEvent::SearchingShow {
                    title: title.to_string(),
                });
                session.search(title)?;

                let seasons = match session.select_show(title) {
                    Ok(seasons) => seasons,
                    Err(PrevodiError::NotFound(message)) => {
                        error!("{}", message);
                        return Ok(Vec::new());
                    }
                    Err(e) => return Err(e.into()),
                };
                progress_callback(ProgressEvent::ShowSelected {
                    title: title.to_string(),
                    season_count: seasons.len(),
                });
                if seasons.is_empty() {
                    return Ok(Vec::new());
                }

                let archives = session.list_subtitles(&media.season, &media.episode)?.clone();
                if archives.is_empty() {
                    return Ok(Vec::new());
                }

                let path = cache.store(&cache_dir, &archives)?;
                debug!("Saved data to '{}'", path.display());
                archives
            }
        };

        let filter = self.language_filter(params);
        let cache_dir_str = cache_dir.to_string_lossy();
        let mut entries = Vec::new();

        for (url, entry) in &archives {
            let Some(language) = filter.matches(&entry.description) else {
                continue;
            };
            debug!(
                %url,
                name = %entry.description,
                suitable = %entry.suitability,
                lang = language.iso,
                "Subtitle"
            );

            entries.push(DirectoryEntry::Listing {
                label: language.label.to_string(),
                label2: format!("[B]{}[/B]", entry.description),
                thumbnail: language.iso.to_string(),
                url: plugin_url(
                    ADDON_ID,
                    Action::Download,
                    &[
                        ("url", url.as_str()),
                        ("suitable", entry.suitability.as_str()),
                        ("cachedir", &*cache_dir_str),
                        ("lang", language.iso),
                        ("filepath", media.file_path.as_str()),
                    ],
                ),
            });
        }

        progress_callback(ProgressEvent::SubtitlesListed {
            total: archives.len(),
            matching: entries.len(),
        });

        Ok(entries)
    }

    /// Lists shows matching a typed term as entries searching the episode
    fn manual_search(
        &self,
        session: &mut Prevodi,
        params: &Params,
        progress_callback: &mut impl FnMut(ProgressEvent),
    ) -> Result<Vec<DirectoryEntry>, HandlerError> {
        let term = params
            .get("searchstring")
            .ok_or(HandlerError::MissingParameter("searchstring"))?;
        info!("Searching subtitles with term '{}'", term);

        progress_callback(ProgressEvent::SearchingShow {
            title: term.to_string(),
        });
        let shows = session.search(term)?;

        let media = self.media.with_params(params);
        let entries = shows
            .iter()
            .map(|(title, url)| DirectoryEntry::Listing {
                label: title.clone(),
                label2: url.clone(),
                thumbnail: String::new(),
                url: plugin_url(
                    ADDON_ID,
                    Action::Search,
                    &[
                        ("tvshow", title.as_str()),
                        ("season", media.season.as_str()),
                        ("episode", media.episode.as_str()),
                        ("filepath", media.file_path.as_str()),
                    ],
                ),
            })
            .collect();

        Ok(entries)
    }

    /// Provides the picked subtitle, downloading and unpacking it if needed
    fn download(
        &self,
        session: &Prevodi,
        params: &Params,
        progress_callback: &mut impl FnMut(ProgressEvent),
    ) -> Result<Vec<DirectoryEntry>, HandlerError> {
        let cache_dir = PathBuf::from(
            params
                .get("cachedir")
                .ok_or(HandlerError::MissingParameter("cachedir"))?,
        );
        let lang = params
            .get("lang")
            .ok_or(HandlerError::MissingParameter("lang"))?;
        let file_path = params
            .get("filepath")
            .ok_or(HandlerError::MissingParameter("filepath"))?;

        let cached = possible_subtitles(&cache_dir, file_path, lang)?;
        let subtitle = match cached.into_iter().next() {
            Some(subtitle) => {
                debug!("Using cached subtitles: {}", subtitle.display());
                progress_callback(ProgressEvent::UsingCachedSubtitle {
                    path: subtitle.clone(),
                });
                subtitle
            }
            None => {
                let link = params.get("url").unwrap_or_default();
                let unpacked =
                    self.unpack(session, link, &cache_dir, file_path, lang, progress_callback)?;
                match unpacked {
                    Some(subtitle) => subtitle,
                    None => return Ok(Vec::new()),
                }
            }
        };

        // Handed over from the temp dir, which is wiped on the next start
        let returned = execute_copy(&subtitle, &self.dirs.temp)?;
        debug!("Returned subtitle: '{}', lang: '{}'", returned.display(), lang);

        Ok(vec![DirectoryEntry::Subtitle {
            path: returned,
            lang: lang.to_string(),
        }])
    }

    /// Downloads the archive behind `link` and extracts its first file
    ///
    /// The extracted file is renamed after the video. Returns `None` for an
    /// empty archive.
    fn unpack(
        &self,
        session: &Prevodi,
        link: &str,
        cache_dir: &Path,
        file_path: &str,
        lang: &str,
        progress_callback: &mut impl FnMut(ProgressEvent),
    ) -> Result<Option<PathBuf>, HandlerError> {
        debug!("Downloading subtitles for '{}'", file_path);
        progress_callback(ProgressEvent::DownloadingArchive {
            url: link.to_string(),
        });
        let downloaded = session.fetch_archive(link)?;

        fs::create_dir_all(cache_dir).map_err(|e| HandlerError::Io {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;
        let archive_path = cache_dir.join(&downloaded.filename);
        fs::write(&archive_path, &downloaded.bytes).map_err(|e| HandlerError::Io {
            path: archive_path.clone(),
            source: e,
        })?;
        debug!("Subtitle archive saved as '{}'", archive_path.display());

        let extracted = match self.extract_first(&archive_path, cache_dir, progress_callback) {
            Ok(Some(extracted)) => extracted,
            Ok(None) => return Ok(None),
            Err(e) => {
                // Unusable archives are not left behind in the cache
                if archive_path.exists() {
                    if let Err(remove_error) = fs::remove_file(&archive_path) {
                        warn!(
                            "Unable to remove '{}': {}",
                            archive_path.display(),
                            remove_error
                        );
                    }
                }
                return Err(e);
            }
        };

        let extension = extracted
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let final_name = subtitle_candidate(file_path, lang, &extension);
        let subtitle = execute_rename(&extracted, cache_dir, &final_name)?;
        debug!(
            "Renamed subtitle file '{}' to '{}'",
            extracted.display(),
            subtitle.display()
        );

        Ok(Some(subtitle))
    }

    /// Extracts the first file of an archive into `destination` and deletes
    /// the archive
    ///
    /// Returns `None` for an empty archive.
    fn extract_first(
        &self,
        archive_path: &Path,
        destination: &Path,
        progress_callback: &mut impl FnMut(ProgressEvent),
    ) -> Result<Option<PathBuf>, HandlerError> {
        let mut archive = Archive::open(archive_path, &self.unrar)?;
        let files = archive.list()?;
        let Some(member) = files.first() else {
            warn!("No files in archive '{}'", archive_path.display());
            archive.remove()?;
            return Ok(None);
        };
        debug!(?files, "Archive content");

        progress_callback(ProgressEvent::Extracting {
            archive: archive_path.to_path_buf(),
            member: member.clone(),
        });
        let extracted = archive.extract(member, destination)?;
        archive.remove()?;

        Ok(Some(extracted))
    }
}
