// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::PathBuf;

use kobo_anki::app_config::{self, Config};
use kobo_anki::app_controller::{Controller, CreateRequest, InputSource};
use kobo_anki::source::{BookSort, SourceFilter};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for BookSort to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliBookSort {
    Author,
    Book,
    Date,
}

impl From<CliBookSort> for BookSort {
    fn from(sort: CliBookSort) -> Self {
        match sort {
            CliBookSort::Author => BookSort::Author,
            CliBookSort::Book => BookSort::Book,
            CliBookSort::Date => BookSort::DateAdded,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a deck from Kobo highlights or a word list
    Create(CreateArgs),

    /// List the books on the Kobo
    #[command(name = "list-books")]
    ListBooks {
        /// Path to a KoboReader.sqlite instead of the mounted device
        #[arg(long)]
        own_path: Option<PathBuf>,

        /// Sort order
        #[arg(long, value_enum, default_value = "author")]
        sort: CliBookSort,
    },

    /// Generate shell completions for kobo-anki
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Only highlights from books by this author
    #[arg(short, long)]
    author: Option<String>,

    /// Only highlights from this book
    #[arg(short, long)]
    title: Option<String>,

    /// Highlights created on or after this date (YYYY-MM-DD)
    #[arg(long, requires = "end_date")]
    start_date: Option<String>,

    /// Highlights created on or before this date (YYYY-MM-DD)
    #[arg(long, requires = "start_date")]
    end_date: Option<String>,

    /// Path to a KoboReader.sqlite instead of the mounted device
    #[arg(long, conflicts_with = "import")]
    own_path: Option<PathBuf>,

    /// Text file with one word or phrase per line
    #[arg(short, long)]
    import: Option<PathBuf>,

    /// Name of the deck
    #[arg(short, long)]
    deck_name: Option<String>,

    /// Skip audio generation
    #[arg(long)]
    no_audio: bool,

    /// Only write the import file, do not add the deck to a running Anki
    #[arg(long)]
    no_anki_import: bool,

    /// Number of cards processed at once
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Directory the deck is written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// DeepL API key
    #[arg(long, env = "DEEPL_API_KEY", hide_env_values = true)]
    deepl_key: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    /// Configuration file path
    #[arg(long, default_value = "conf.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// kobo-anki - study cards from your e-reader highlights
///
/// Translates Kobo highlights or a word list with DeepL, optionally adds
/// spoken audio via OpenAI, and writes an Anki import file.
#[derive(Parser, Debug)]
#[command(name = "kobo-anki")]
#[command(version)]
#[command(about = "Turn Kobo highlights into translated Anki cards")]
#[command(long_about = "kobo-anki reads highlights from a Kobo e-reader (or a plain word list), translates them with DeepL and writes an Anki deck, with optional spoken audio.

EXAMPLES:
    kobo-anki create                                  # All highlights of the mounted Kobo
    kobo-anki create -a \"Thomas Mann\"                 # Highlights of one author
    kobo-anki create --start-date 2024-01-01 --end-date 2024-02-01
    kobo-anki create --own-path KoboReader.sqlite     # Use a copied database
    kobo-anki create -i words.txt --no-audio          # Import a word list without audio
    kobo-anki create --no-anki-import                 # Only write the import file
    kobo-anki list-books --sort date                  # Books on the device
    kobo-anki completions bash > kobo-anki.bash       # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one is created. API keys may also come from DEEPL_API_KEY and
    OPENAI_API_KEY.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // The logger itself passes everything, `set_max_level` does the filtering
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until a configuration says otherwise
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "kobo-anki", &mut std::io::stdout());
            Ok(())
        }
        Commands::ListBooks { own_path, sort } => run_list_books(own_path, sort.into()),
        Commands::Create(args) => run_create(args).await,
    }
}

fn run_list_books(own_path: Option<PathBuf>, sort: BookSort) -> Result<()> {
    let books = Controller::list_books(own_path, sort)?;
    if books.is_empty() {
        warn!("No books with reading activity found");
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    for book in books {
        writeln!(stdout, "{}\t{}\t{}", book.author, book.title, book.date_added)?;
    }
    Ok(())
}

async fn run_create(args: CreateArgs) -> Result<()> {
    // A level given on the command line applies right away
    if let Some(level) = &args.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = Config::load_or_create(&args.config)?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    if args.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    let input = match &args.import {
        Some(path) => InputSource::TextFile(path.clone()),
        None => InputSource::Kobo {
            db_path: args.own_path.clone(),
            filter: SourceFilter {
                author: args.author.clone(),
                title: args.title.clone(),
                start_date: args.start_date.clone(),
                end_date: args.end_date.clone(),
            },
        },
    };

    let request = CreateRequest {
        input,
        deck_name: args.deck_name.clone(),
        audio: config.speech.enabled,
        output_dir: args.output_dir.clone(),
    };

    let controller = Controller::with_config(config)?;
    match controller.create_deck(request).await {
        Ok(outcome) => {
            if let (Some(export), None) = (&outcome.export, &outcome.imported) {
                info!("Import {:?} into Anki via File > Import", export.notes_path);
            }
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}

/// Apply command line values on top of the loaded configuration
fn apply_overrides(config: &mut Config, args: &CreateArgs) {
    if let Some(key) = &args.deepl_key {
        config.translation.api_key = key.clone();
    }
    if let Some(key) = &args.openai_key {
        config.speech.api_key = key.clone();
    }
    if args.no_audio {
        config.speech.enabled = false;
    }
    if args.no_anki_import {
        config.anki.enabled = false;
    }
    if let Some(concurrency) = args.concurrency {
        config.pipeline.concurrent_requests = concurrency;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone().into();
    }
}
