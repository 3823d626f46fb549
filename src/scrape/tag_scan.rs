//! Tag scanners for show and episode pages
//!
//! The pages are flattened into a stream of start tags and text nodes in
//! document order. Each scanner is a small state machine that remembers which
//! kind of element it last entered and interprets the following text
//! accordingly. End tags are not part of the stream; a state only changes
//! when a relevant start tag arrives or its text has been consumed.

use super::{ArchiveEntry, ArchiveListing, EpisodeLink, SeasonTable};
use regex::Regex;
use scraper::{Html, Node};
use std::sync::LazyLock;

static SEASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Sezona\s+(\d+)").expect("valid regex"));
static EPISODE_NUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)").expect("valid regex"));

/// Path prefix of subtitle archive downloads
const DOWNLOAD_PREFIX: &str = "/preuzmi-prijevod/";

/// A single event of the flattened page
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TagEvent {
    /// An element was opened
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    /// A text node
    Text(String),
}

impl TagEvent {
    fn attr(&self, wanted: &str) -> Option<&str> {
        match self {
            TagEvent::Start { attrs, .. } => attrs
                .iter()
                .find(|(name, _)| name == wanted)
                .map(|(_, value)| value.as_str()),
            TagEvent::Text(_) => None,
        }
    }
}

/// Flattens an HTML page into start tag and text events in document order
pub(crate) fn tag_events(html: &str) -> Vec<TagEvent> {
    let document = Html::parse_document(html);

    document
        .root_element()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Element(element) => Some(TagEvent::Start {
                name: element.name().to_string(),
                attrs: element
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
            }),
            Node::Text(text) => Some(TagEvent::Text(String::from(&**text))),
            _ => None,
        })
        .collect()
}

/// Zero-pads a season or episode number to two digits
fn pad(number: &str) -> String {
    format!("{:0>2}", number)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
enum SeasonState {
    #[default]
    Idle,
    /// Inside `<h3>`, expecting "Sezona N"
    SeasonHeader,
    /// Inside `<li class="broj">`, expecting the episode number
    EpisodeCounter,
    /// Inside `<a class="open" rel="...">`, expecting the link label
    SubtitleLink { rel: String },
}

/// Scans a show page into a [`SeasonTable`]
#[derive(Debug, Default)]
pub(crate) struct SeasonScanner {
    state: SeasonState,
    season: Option<String>,
    episode: Option<String>,
    table: SeasonTable,
}

impl SeasonScanner {
    pub fn feed(&mut self, event: &TagEvent) {
        match event {
            TagEvent::Start { name, .. } => self.start_tag(name, event),
            TagEvent::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    self.text(text);
                }
            }
        }
    }

    fn start_tag(&mut self, name: &str, event: &TagEvent) {
        match name {
            "h3" => self.state = SeasonState::SeasonHeader,
            "li" => {
                self.state = if event.attr("class") == Some("broj") {
                    SeasonState::EpisodeCounter
                } else {
                    SeasonState::Idle
                };
            }
            "a" => {
                // Matched by attribute name, the parser does not keep source order
                self.state = match (event.attr("class"), event.attr("rel")) {
                    (Some("open"), Some(rel)) => SeasonState::SubtitleLink {
                        rel: rel.to_string(),
                    },
                    _ => SeasonState::Idle,
                };
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        match std::mem::take(&mut self.state) {
            SeasonState::Idle => {}
            SeasonState::SeasonHeader => match SEASON_RE.captures(text) {
                Some(captures) => {
                    let season = pad(&captures[1]);
                    self.table.entry(season.clone()).or_default();
                    self.season = Some(season);
                    self.episode = None;
                }
                // Other header text, keep waiting for the season number
                None => self.state = SeasonState::SeasonHeader,
            },
            SeasonState::EpisodeCounter => match EPISODE_NUM_RE.captures(text) {
                Some(captures) => self.episode = Some(pad(&captures[1])),
                None => self.state = SeasonState::EpisodeCounter,
            },
            SeasonState::SubtitleLink { rel } => {
                if let (Some(season), Some(episode)) = (&self.season, &self.episode) {
                    self.table
                        .entry(season.clone())
                        .or_default()
                        .entry(episode.clone())
                        .or_insert_with(|| EpisodeLink {
                            label: text.to_string(),
                            url: rel,
                        });
                }
            }
        }
    }

    pub fn finish(self) -> SeasonTable {
        self.table
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ArchiveState {
    #[default]
    Idle,
    /// Inside a download anchor, expecting its description
    Description,
    /// Inside a cell following a download anchor, expecting the suitability
    Suitability,
}

#[derive(Debug)]
struct PendingArchive {
    url: String,
    description: Option<String>,
    suitability: Option<String>,
}

/// Scans an episode page into an [`ArchiveListing`]
#[derive(Debug, Default)]
pub(crate) struct ArchiveScanner {
    state: ArchiveState,
    pending: Option<PendingArchive>,
    listing: ArchiveListing,
}

impl ArchiveScanner {
    pub fn feed(&mut self, event: &TagEvent) {
        match event {
            TagEvent::Start { name, .. } if name == "a" => {
                if let Some(href) = event.attr("href").filter(|h| h.starts_with(DOWNLOAD_PREFIX)) {
                    self.flush();
                    self.pending = Some(PendingArchive {
                        url: href.to_string(),
                        description: None,
                        suitability: None,
                    });
                    self.state = ArchiveState::Description;
                }
            }
            // A new row ends whatever the previous one described
            TagEvent::Start { name, .. } if name == "tr" => {
                self.flush();
                self.state = ArchiveState::Idle;
            }
            TagEvent::Start { name, .. } if name == "td" => {
                let waiting = self
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.description.is_some() && p.suitability.is_none());
                if waiting {
                    self.state = ArchiveState::Suitability;
                }
            }
            TagEvent::Start { .. } => {}
            TagEvent::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                let Some(pending) = self.pending.as_mut() else {
                    return;
                };
                match self.state {
                    ArchiveState::Idle => {}
                    ArchiveState::Description => pending.description = Some(text.to_string()),
                    ArchiveState::Suitability => pending.suitability = Some(text.to_string()),
                }
                self.state = ArchiveState::Idle;
            }
        }
    }

    fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.listing.insert(
                pending.url,
                ArchiveEntry {
                    description: pending.description.unwrap_or_default(),
                    suitability: pending.suitability.unwrap_or_default(),
                },
            );
        }
    }

    pub fn finish(mut self) -> ArchiveListing {
        self.flush();
        self.listing
    }
}
