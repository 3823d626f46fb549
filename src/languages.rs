//! Subtitle languages offered by the site
//!
//! Archive descriptions mention the language as a separate word, e.g.
//! `Show 1x01 Hrvatski` or `Show 1x01 HR`. A description is matched against
//! the codes of the configured languages to decide whether to offer it.

use regex::{Regex, RegexBuilder};

/// A language the site publishes subtitles in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Name used in the configuration
    pub name: &'static str,
    /// Code as it appears at the start of a word in descriptions
    pub code: &'static str,
    /// ISO 639-1 code used for file names and flags
    pub iso: &'static str,
    /// Label shown next to a subtitle
    pub label: &'static str,
}

/// All supported languages
pub const LANGUAGES: &[Language] = &[
    Language {
        name: "Bosnian",
        code: "bs",
        iso: "bs",
        label: "Bosanski",
    },
    Language {
        name: "Croatian",
        code: "hr",
        iso: "hr",
        label: "Hrvatski",
    },
    Language {
        name: "English",
        code: "en",
        iso: "en",
        label: "English",
    },
    Language {
        name: "Serbian",
        code: "sr",
        iso: "sr",
        label: "Srpski",
    },
    Language {
        name: "Serbian (Cyrillic)",
        code: "cirilica",
        iso: "sr",
        label: "Српски (ћирилица)",
    },
    Language {
        name: "German",
        code: "de",
        iso: "de",
        label: "Deutsch",
    },
    Language {
        name: "Serbo-Croatian",
        code: "sh",
        iso: "sh",
        label: "Srpskohrvatski",
    },
];

/// Looks up a language by configured name or by code
///
/// `ba` is accepted as an alternative code for Bosnian.
pub fn find(name_or_code: &str) -> Option<&'static Language> {
    let wanted = match name_or_code.trim().to_lowercase().as_str() {
        "ba" => "bs".to_string(),
        other => other.to_string(),
    };

    LANGUAGES
        .iter()
        .find(|l| l.name.to_lowercase() == wanted || l.code == wanted)
}

/// Selects archive descriptions written in one of a set of languages
#[derive(Debug, Clone)]
pub struct LanguageFilter {
    languages: Vec<&'static Language>,
    pattern: Option<Regex>,
}

impl LanguageFilter {
    /// Builds a filter from configured names; unknown names are ignored
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut languages: Vec<&'static Language> = Vec::new();
        for language in names.iter().filter_map(|n| find(n.as_ref())) {
            if !languages.contains(&language) {
                languages.push(language);
            }
        }

        let pattern = if languages.is_empty() {
            None
        } else {
            let alternatives: Vec<String> =
                languages.iter().map(|l| regex::escape(l.code)).collect();
            RegexBuilder::new(&format!(r"\s+({})", alternatives.join("|")))
                .case_insensitive(true)
                .build()
                .ok()
        };

        Self { languages, pattern }
    }

    /// Selected languages, in configuration order
    pub fn languages(&self) -> &[&'static Language] {
        &self.languages
    }

    /// Returns the language a description is written in, if it is selected
    pub fn matches(&self, description: &str) -> Option<&'static Language> {
        let captures = self.pattern.as_ref()?.captures(description)?;
        let matched = captures[1].to_lowercase();

        self.languages.iter().copied().find(|l| l.code == matched)
    }
}
