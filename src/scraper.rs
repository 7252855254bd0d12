use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::Client;
use reqwest::header::USER_AGENT;

use crate::parser::{parse_product, parse_search_results};
use crate::store::{Store, StoreError};
use crate::types::Source;

pub const PHARMEASY_BASE_URL: &str = "https://pharmeasy.in";
pub const APOLLO_BASE_URL: &str = "https://www.apollopharmacy.in";

/// Browser user agents apollo sessions pick from.
pub const APOLLO_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/112.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.1 Safari/605.1.15",
];

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "paracetamol",
    "dolo 650",
    "combiflam",
    "zincovit",
    "calpol",
    "crocin",
    "azithromycin",
    "cetirizine",
    "sinarest",
    "metformin",
    "atorvastatin",
    "pantoprazole",
    "omeprazole",
    "amoxicillin",
    "aspirin",
    "ibuprofen",
    "diclofenac",
    "levocetirizine",
    "nimesulide",
    "benadryl",
    "dexorange",
    "liv 52",
    "zandu balm",
    "revital",
    "shelcal",
    "becosules",
    "neurobion forte",
    "eldecalcitol",
    "thyronorm",
    "losartan",
    "telmisartan",
    "ramipril",
    "cilnidipine",
    "glimepiride",
    "gliclazide",
    "pioglitazone",
    "linagliptin",
    "sitagliptin",
    "insulin",
];

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Storage error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Progress file error: {0}")]
    ProgressError(#[from] io::Error),
}

/// Random pause between requests, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Throttle {
    pub const PAGE: Throttle = Throttle {
        min_secs: 2.0,
        max_secs: 4.0,
    };
    pub const KEYWORD: Throttle = Throttle {
        min_secs: 5.0,
        max_secs: 8.0,
    };
    pub const APOLLO_PAGE: Throttle = Throttle {
        min_secs: 3.0,
        max_secs: 6.0,
    };
    pub const NONE: Throttle = Throttle {
        min_secs: 0.0,
        max_secs: 0.0,
    };

    /// Pause after each search or product page of `source`.
    pub fn page(source: Source) -> Throttle {
        match source {
            Source::Pharmeasy => Throttle::PAGE,
            Source::Apollo => Throttle::APOLLO_PAGE,
        }
    }

    /// Extra pause between two keywords of `source`.
    pub fn keyword(source: Source) -> Throttle {
        match source {
            Source::Pharmeasy => Throttle::KEYWORD,
            Source::Apollo => Throttle::NONE,
        }
    }

    fn next_delay(&self) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs_f64(self.min_secs.max(0.0));
        }
        let secs = rand::thread_rng().gen_range(self.min_secs..self.max_secs);
        Duration::from_secs_f64(secs)
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Keywords already scraped, persisted one per line.
#[derive(Debug)]
pub struct Progress {
    path: PathBuf,
    completed: HashSet<String>,
}

impl Progress {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, io::Error> {
        let path = path.into();
        let completed = match fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, completed })
    }

    pub fn is_done(&self, keyword: &str) -> bool {
        self.completed.contains(keyword)
    }

    pub fn mark_done(&mut self, keyword: &str) -> Result<(), io::Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{keyword}")?;
        self.completed.insert(keyword.to_string());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapeStats {
    pub keywords: usize,
    pub skipped_keywords: usize,
    pub links: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failures: usize,
}

impl std::fmt::Display for ScrapeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nScrape summary:")?;
        writeln!(f, "  Keywords searched: {}", self.keywords)?;
        writeln!(f, "  Keywords skipped:  {}", self.skipped_keywords)?;
        writeln!(f, "  Product links:     {}", self.links)?;
        writeln!(f, "  Rows inserted:     {}", self.inserted)?;
        writeln!(f, "  Duplicates:        {}", self.duplicates)?;
        writeln!(f, "  Failures:          {}", self.failures)
    }
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    apollo_user_agent: &'static str,
    throttle_override: Option<(Throttle, Throttle)>,
}

impl WebScraper {
    pub fn new() -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        let apollo_user_agent = APOLLO_USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(APOLLO_USER_AGENTS[0]);

        Ok(Self {
            client,
            apollo_user_agent,
            throttle_override: None,
        })
    }

    /// Uses the same page and keyword pauses for every source.
    pub fn with_throttle(mut self, page: Throttle, keyword: Throttle) -> Self {
        self.throttle_override = Some((page, keyword));
        self
    }

    fn page_throttle(&self, source: Source) -> Throttle {
        self.throttle_override
            .map_or_else(|| Throttle::page(source), |(page, _)| page)
    }

    fn keyword_throttle(&self, source: Source) -> Throttle {
        self.throttle_override
            .map_or_else(|| Throttle::keyword(source), |(_, keyword)| keyword)
    }

    /// User agent sent to `source`; apollo gets a browser agent fixed per session.
    pub fn user_agent(&self, source: Source) -> Option<&'static str> {
        match source {
            Source::Pharmeasy => None,
            Source::Apollo => Some(self.apollo_user_agent),
        }
    }

    pub fn base_url(source: Source) -> &'static str {
        match source {
            Source::Pharmeasy => PHARMEASY_BASE_URL,
            Source::Apollo => APOLLO_BASE_URL,
        }
    }

    pub fn search_url(source: Source, keyword: &str) -> String {
        match source {
            Source::Pharmeasy => format!("{}/search/all?name={}", PHARMEASY_BASE_URL, keyword),
            Source::Apollo => format!("{}/search-medicines/{}", APOLLO_BASE_URL, keyword),
        }
    }

    pub async fn search(&self, source: Source, keyword: &str) -> Result<Vec<String>, ScraperError> {
        let url = Self::search_url(source, keyword);
        log::info!("Searching {} for '{}'...", source, keyword);
        let html = self.get_html(&url, source).await?;
        self.page_throttle(source).pause().await;

        let links = parse_search_results(&html, source, Self::base_url(source));
        log::info!("Found {} result(s) for '{}'", links.len(), keyword);
        Ok(links)
    }

    /// Fetches one product page and stores what could be extracted from it.
    ///
    /// Returns whether a new row was written.
    pub async fn scrape_product(
        &self,
        store: &Store,
        source: Source,
        url: &str,
    ) -> Result<bool, ScraperError> {
        log::debug!("Fetching product page: {}", url);
        let html = self.get_html(url, source).await?;
        self.page_throttle(source).pause().await;

        let record = parse_product(&html, source);
        let inserted = store.insert_source_record(source, &record)?;
        log::info!(
            "Scraped: {}{}",
            record.name.as_deref().unwrap_or("<unnamed>"),
            if inserted { "" } else { " (duplicate)" }
        );
        Ok(inserted)
    }

    /// Searches each keyword and stores its top products, one page at a time.
    ///
    /// A failed search or product is logged and counted; the run carries on.
    pub async fn scrape(
        &self,
        store: &Store,
        source: Source,
        keywords: &[String],
        mut progress: Option<&mut Progress>,
    ) -> Result<ScrapeStats, ScraperError> {
        let mut stats = ScrapeStats::default();

        for (i, keyword) in keywords.iter().enumerate() {
            if let Some(progress) = progress.as_deref()
                && progress.is_done(keyword)
            {
                log::info!("Skipping already scraped: {}", keyword);
                stats.skipped_keywords += 1;
                continue;
            }

            stats.keywords += 1;
            match self.search(source, keyword).await {
                Ok(links) => {
                    stats.links += links.len();
                    for link in &links {
                        match self.scrape_product(store, source, link).await {
                            Ok(true) => stats.inserted += 1,
                            Ok(false) => stats.duplicates += 1,
                            Err(e) => {
                                log::warn!("Error scraping {}: {}", link, e);
                                stats.failures += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Error finding product links for '{}': {}", keyword, e);
                    stats.failures += 1;
                }
            }

            if let Some(progress) = progress.as_deref_mut() {
                progress.mark_done(keyword)?;
            }

            if i + 1 < keywords.len() {
                self.keyword_throttle(source).pause().await;
            }
        }

        Ok(stats)
    }

    async fn get_html(&self, url: &str, source: Source) -> Result<String, ScraperError> {
        let mut request = self.client.get(url);
        if let Some(agent) = self.user_agent(source) {
            request = request.header(USER_AGENT, agent);
        }

        Ok(request
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?)
    }
}
