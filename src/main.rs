use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use prevodi::config::config_path;
use prevodi::logging::{init_logging, init_logging_stderr};
use prevodi::{
    Action, ActionHandler, AppDirs, Config, DirectoryEntry, HandlerError, MediaInfo, Params,
    ProgressEvent, UnrarTool,
};
use std::process;

/// Subtitles for TV episodes from prijevodi-online.org
#[derive(Debug, Parser)]
#[command(name = "prevodi")]
#[command(about = "Find and download subtitles from prijevodi-online.org", long_about = None)]
struct Cli {
    /// Forum user name, overrides the configuration file
    #[arg(long, global = true)]
    username: Option<String>,

    /// Forum password, overrides the configuration file
    #[arg(long, global = true)]
    password: Option<String>,

    /// Comma separated subtitle languages, e.g. "Croatian,English"
    #[arg(long, global = true)]
    languages: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List subtitles of an episode
    Search {
        /// TV show title
        #[arg(long)]
        show: String,
        #[arg(long)]
        season: String,
        #[arg(long)]
        episode: String,
        /// Video file the subtitle is named after
        #[arg(long)]
        file: String,
    },

    /// List shows matching a search term
    ManualSearch {
        term: String,
        #[arg(long, default_value = "1")]
        season: String,
        #[arg(long, default_value = "1")]
        episode: String,
        #[arg(long, default_value = "")]
        file: String,
    },

    /// Run a plugin URL printed by a previous listing
    Open {
        /// `plugin://...` URL or bare query string
        url: String,

        /// Download without asking for confirmation
        #[arg(long, short)]
        yes: bool,
    },
}

/// Handles progress events and prints formatted output to stdout
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::LoggingIn { username } => {
            println!("Logging in as {}...", username);
        }
        ProgressEvent::LoadedFromCache { cache_dir } => {
            println!("Using cached listing from {}", cache_dir.display());
        }
        ProgressEvent::SearchingShow { title } => {
            println!("Searching for '{}'...", title);
        }
        ProgressEvent::ShowSelected {
            title,
            season_count,
        } => {
            println!("Found {} season(s) for '{}'", season_count, title);
        }
        ProgressEvent::SubtitlesListed { total, matching } => {
            println!("{} of {} subtitle(s) in the selected languages", matching, total);
        }
        ProgressEvent::UsingCachedSubtitle { path } => {
            println!("Subtitle already downloaded: {}", path.display());
        }
        ProgressEvent::DownloadingArchive { url } => {
            println!("Downloading {}...", url);
        }
        ProgressEvent::Extracting { archive, member } => {
            println!("Extracting '{}' from {}...", member, archive.display());
        }
        ProgressEvent::Complete { entry_count } => {
            println!("\nDone, {} result(s).\n", entry_count);
        }
    }
}

fn print_entries(entries: &[DirectoryEntry]) {
    if entries.is_empty() {
        println!("No subtitles found.");
        return;
    }

    for entry in entries {
        match entry {
            DirectoryEntry::Subtitle { path, lang } => {
                println!("[{}] {}", lang, path.display());
            }
            DirectoryEntry::Listing {
                label,
                label2,
                thumbnail,
                url,
            } => {
                if thumbnail.is_empty() {
                    println!("{}  {}", label, label2);
                } else {
                    println!("[{}] {}  {}", thumbnail, label, label2);
                }
                println!("    {}", url);
            }
        }
    }
}

/// Asks for new credentials and stores them in the configuration file
fn ask_credentials(config: &mut Config) -> Result<(), dialoguer::Error> {
    config.username = Input::<String>::new()
        .with_prompt("prijevodi-online.org user name")
        .with_initial_text(config.username.clone())
        .interact_text()?;
    config.password = Password::new().with_prompt("Password").interact()?;

    match config_path().and_then(|path| config.save(&path)) {
        Ok(()) => tracing::info!("Credentials saved"),
        Err(e) => eprintln!("Warning: credentials not saved: {}", e),
    }

    Ok(())
}

fn exit_with(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let dirs = AppDirs::new().unwrap_or_else(|e| exit_with(e));
    if let Err(e) = init_logging(&dirs.logs) {
        init_logging_stderr();
        tracing::warn!("log file unavailable, logging to stderr: {}", e);
    }

    let mut config = Config::load_or_init().unwrap_or_else(|e| exit_with(e));
    if let Some(username) = cli.username {
        config.username = username;
    }
    if let Some(password) = cli.password {
        config.password = password;
    }

    let unrar = match &config.unrar_path {
        Some(path) => UnrarTool::at(path),
        None => UnrarTool::bundled(&dirs.unrar).unwrap_or_else(|e| exit_with(e)),
    };

    let (action, mut params, media) = match cli.command {
        Command::Search {
            show,
            season,
            episode,
            file,
        } => (
            Action::Search,
            Params::default(),
            MediaInfo::episode(&show, &season, &episode, &file),
        ),
        Command::ManualSearch {
            term,
            season,
            episode,
            file,
        } => {
            let mut params = Params::default();
            params.set("searchstring", term);
            (
                Action::ManualSearch,
                params,
                MediaInfo::episode("", &season, &episode, &file),
            )
        }
        Command::Open { url, yes } => {
            let params = Params::parse(&url);
            let action = params
                .get("action")
                .unwrap_or_default()
                .parse::<Action>()
                .unwrap_or_else(|action| exit_with(format!("Unknown action '{}'", action)));

            if action == Action::Download && !yes {
                let suitable = params.get("suitable").unwrap_or("unknown release");
                let confirmed = Confirm::new()
                    .with_prompt(format!("Download subtitle for {}?", suitable))
                    .default(true)
                    .interact()
                    .unwrap_or(false);
                if !confirmed {
                    tracing::debug!("Subtitle download cancelled");
                    return;
                }
            }

            (action, params, MediaInfo::default())
        }
    };
    if let Some(languages) = cli.languages {
        params.set("languages", languages);
    }

    // Credentials are asked for once, when missing or rejected
    let mut asked = false;
    let entries = loop {
        let handler =
            ActionHandler::new(config.clone(), dirs.clone(), unrar.clone(), media.clone());
        if let Err(e) = handler.prepare() {
            exit_with(e);
        }

        match handler.run(action, &params, handle_progress_event) {
            Ok(entries) => break entries,
            Err(e) if e.is_auth_failure() || matches!(e, HandlerError::MissingCredentials) => {
                if asked {
                    exit_with(e);
                }
                eprintln!("{}", e);
                if let Err(e) = ask_credentials(&mut config) {
                    exit_with(e);
                }
                asked = true;
            }
            Err(e) => exit_with(e),
        }
    };

    print_entries(&entries);
}
