use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use medprice::combiner::combine;
use medprice::config::{DEFAULT_DATABASE_PATH, ServerConfig};
use medprice::query::list_sorted;
use medprice::reconcile::{Outcome, Reconciler};
use medprice::scraper::{DEFAULT_KEYWORDS, Progress, WebScraper};
use medprice::server;
use medprice::store::Store;
use medprice::types::{SortKey, Source, UpdateRequest};

#[derive(Parser)]
#[command(name = "medprice")]
#[command(about = "Pharmacy price scraper and comparison API", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        long,
        global = true,
        env = "DATABASE_PATH",
        default_value = DEFAULT_DATABASE_PATH,
        help = "Path to the SQLite database"
    )]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    Pharmeasy,
    Apollo,
    All,
}

impl SourceArg {
    fn sources(self) -> Vec<Source> {
        match self {
            SourceArg::Pharmeasy => vec![Source::Pharmeasy],
            SourceArg::Apollo => vec![Source::Apollo],
            SourceArg::All => Source::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FilterBy {
    Price,
    Discount,
}

impl From<FilterBy> for SortKey {
    fn from(filter: FilterBy) -> Self {
        match filter {
            FilterBy::Price => SortKey::Price,
            FilterBy::Discount => SortKey::Discount,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the comparison API over HTTP
    Serve {
        #[arg(long, env = "BIND_ADDRESS", help = "Address to bind, e.g. 127.0.0.1:8000")]
        bind: Option<String>,
    },
    /// Scrape search results and product pages into the source tables
    Scrape {
        #[arg(long, value_enum, default_value = "all", help = "Pharmacy to scrape")]
        source: SourceArg,

        #[arg(
            short = 'k',
            long = "keyword",
            help = "Medicine to search for (repeatable, defaults to the built-in list)"
        )]
        keywords: Vec<String>,

        #[arg(
            long,
            default_value = "scraped.txt",
            help = "File tracking pharmeasy keywords already scraped"
        )]
        progress_file: PathBuf,
    },
    /// Seed the combined table from both sources if it is empty
    Combine,
    /// Print the combined view
    List {
        #[arg(long, value_enum, default_value = "price", help = "Sort order")]
        filter_by: FilterBy,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Set a best price or best offer, deriving the other half
    Update {
        #[arg(long)]
        name: String,

        #[arg(long)]
        brand: String,

        #[arg(long, help = "Best price found")]
        best_price: Option<f64>,

        #[arg(long, help = "Best offer in percent")]
        best_offer: Option<f64>,

        #[arg(long, help = "Clear both values regardless of the others")]
        force_clear: bool,
    },
    /// Clear the best price and best offer of an entry
    Reset {
        #[arg(long)]
        name: String,

        #[arg(long)]
        brand: String,
    },
    /// Lowercase product names in every table
    NormalizeNames,
}

fn open_store(path: &PathBuf) -> Store {
    Store::open(path).unwrap_or_else(|e| {
        log::error!("Error opening database: {}", e);
        process::exit(1);
    })
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .target(env_logger::Target::Stderr)
        .init();

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = ServerConfig::from_env().with_database_path(&cli.database);
            if let Some(bind) = bind {
                config = config.with_bind_address(bind);
            }

            if let Err(e) = server::serve(config).await {
                log::error!("Server error: {}", e);
                process::exit(1);
            }
        }

        Commands::Scrape {
            source,
            keywords,
            progress_file,
        } => {
            let keywords: Vec<String> = if keywords.is_empty() {
                DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
            } else {
                keywords
            };

            let scraper = WebScraper::new().unwrap_or_else(|e| {
                log::error!("Error creating scraper: {}", e);
                process::exit(1);
            });
            let store = open_store(&cli.database);

            for source in source.sources() {
                let mut progress = match source {
                    Source::Pharmeasy => Some(Progress::load(&progress_file).unwrap_or_else(|e| {
                        log::error!("Error reading {}: {}", progress_file.display(), e);
                        process::exit(1);
                    })),
                    Source::Apollo => None,
                };

                let stats = scraper
                    .scrape(&store, source, &keywords, progress.as_mut())
                    .await
                    .unwrap_or_else(|e| {
                        log::error!("Error scraping {}: {}", source, e);
                        process::exit(1);
                    });

                println!("{}:{}", source, stats);
            }
        }

        Commands::Combine => {
            let store = open_store(&cli.database);
            let inserted = combine(&store).unwrap_or_else(|e| {
                log::error!("Error combining sources: {}", e);
                process::exit(1);
            });
            let total = store.combined_count().unwrap_or_else(|e| {
                log::error!("Error counting combined rows: {}", e);
                process::exit(1);
            });
            println!("Inserted {} row(s); combined table holds {}", inserted, total);
        }

        Commands::List { filter_by, format } => {
            let store = open_store(&cli.database);
            let records = combine(&store)
                .and_then(|_| store.combined_records())
                .unwrap_or_else(|e| {
                    log::error!("Error reading combined table: {}", e);
                    process::exit(1);
                });
            let records = list_sorted(records, filter_by.into());

            match format {
                OutputFormat::Json => serialize_json(&records),
                OutputFormat::Text => {
                    if records.is_empty() {
                        println!("No entries to display.");
                    } else {
                        for (i, record) in records.iter().enumerate() {
                            println!("{:>3}. {}", i + 1, record);
                        }
                        println!("\nTotal: {}", records.len());
                    }
                }
            }
        }

        Commands::Update {
            name,
            brand,
            best_price,
            best_offer,
            force_clear,
        } => {
            let store = open_store(&cli.database);
            let request = UpdateRequest {
                name: Some(name),
                brand: Some(brand),
                best_price,
                best_offer,
                force_clear,
            };

            let outcome = combine(&store)
                .and_then(|_| Reconciler::new(&store).apply(&request))
                .unwrap_or_else(|e| {
                    log::error!("Error applying update: {}", e);
                    process::exit(1);
                });

            match outcome {
                Outcome::Updated {
                    best_price,
                    best_offer,
                } => println!(
                    "Updated: best price {:?}, best offer {:?}",
                    best_price, best_offer
                ),
                other => {
                    log::warn!("No change applied: {:?}", other);
                    process::exit(1);
                }
            }
        }

        Commands::Reset { name, brand } => {
            let store = open_store(&cli.database);
            let outcome = store
                .ensure_combined_table()
                .and_then(|_| Reconciler::new(&store).reset(&name, &brand))
                .unwrap_or_else(|e| {
                    log::error!("Error resetting entry: {}", e);
                    process::exit(1);
                });

            if outcome == Outcome::NotFound {
                log::warn!("No entry found for {} ({})", name, brand);
                process::exit(1);
            }
            println!("Reset {} ({})", name, brand);
        }

        Commands::NormalizeNames => {
            let store = open_store(&cli.database);
            let updated = store.normalize_names().unwrap_or_else(|e| {
                log::error!("Error normalizing names: {}", e);
                process::exit(1);
            });
            println!("Lowercased {} name(s)", updated);
        }
    }
}
