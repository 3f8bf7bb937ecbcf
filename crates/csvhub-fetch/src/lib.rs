//! csvhub Fetch
//!
//! Retrieves JSON records from external HTTP APIs and converts them into
//! [`TabularDataset`](csvhub_core::TabularDataset)s for joining.
//!
//! # Example
//!
//! ```no_run
//! use csvhub_fetch::{Fetcher, FetcherConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetcherConfig::builder()
//!     .timeout(Duration::from_secs(5))
//!     .build()?;
//! let fetcher = Fetcher::new(config)?;
//!
//! let url = url::Url::parse("https://api.example.com/scores")?;
//! let scores = fetcher.fetch(&url).await?;
//! println!("{} remote rows", scores.num_rows());
//! # Ok(())
//! # }
//! ```

mod config;
mod fetcher;
mod records;

pub use config::{FetcherConfig, FetcherConfigBuilder, DEFAULT_MAX_BODY_BYTES, DEFAULT_TIMEOUT};
pub use fetcher::Fetcher;
pub use records::records_to_dataset;
