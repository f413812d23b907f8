//! Data providers.
//!
//! - `http`: the blocking gateway every provider goes through
//! - `aggregator`, `ecos`, `naver`: bond-yield sources
//! - `yahoo`: close series for tickers and the ETF proxy source

pub mod aggregator;
pub mod ecos;
pub mod http;
pub mod naver;
pub mod yahoo;

pub use http::{BrowserProfile, HttpGateway, HttpRequest, ReqwestGateway};
pub use yahoo::{CloseSeries, SeriesError, SeriesWindow, YahooSeries};
