pub mod combiner;
pub mod config;
pub mod error;
pub mod parser;
pub mod pricing;
pub mod query;
pub mod reconcile;
pub mod scraper;
pub mod server;
pub mod store;
pub mod types;

pub use reconcile::Reconciler;
pub use scraper::WebScraper;
pub use store::Store;
