//! Scrape source: Naver Finance market-index detail page.
//!
//! The page shows the current level, the absolute change and a Korean direction
//! word ("상승" up, "하락" down, "보합" flat). The change figure's own sign is not
//! trusted; the direction word decides it.
//!
//! Numbers are rendered digit-by-digit in `<span>`s with a screen-reader copy in
//! `<span class="blind">`; when a `.blind` child exists we read that instead.

use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};

use crate::config::ScrapeConfig;
use crate::data::http::{BrowserProfile, HttpGateway, HttpRequest};
use crate::domain::{BondQuerySpec, RawObservation, SourceKind};
use crate::error::{AppError, FetchError};
use crate::resolver::SourceStrategy;

const KIND: SourceKind = SourceKind::Scrape;

/// Direction word next to the change figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn from_token(text: &str) -> Option<Self> {
        if text.contains("하락") {
            Some(Direction::Down)
        } else if text.contains("상승") {
            Some(Direction::Up)
        } else if text.contains("보합") {
            Some(Direction::Flat)
        } else {
            None
        }
    }

    /// Apply this direction to a change magnitude, ignoring the magnitude's sign.
    pub fn signed(self, magnitude: f64) -> f64 {
        match self {
            Direction::Up => magnitude.abs(),
            Direction::Down => -magnitude.abs(),
            Direction::Flat => 0.0,
        }
    }
}

/// Fields read off the detail page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrapedQuote {
    pub value: f64,
    pub change: f64,
    pub direction: Direction,
}

impl ScrapedQuote {
    pub fn signed_delta(&self) -> f64 {
        self.direction.signed(self.change)
    }
}

struct PageSelectors {
    value: Selector,
    change: Selector,
    direction: Selector,
    blind: Selector,
}

impl PageSelectors {
    fn parse(config: &ScrapeConfig) -> Result<Self, AppError> {
        let parse = |what: &str, css: &str| {
            Selector::parse(css).map_err(|e| AppError::config(format!("Invalid scrape.{what} '{css}': {e}")))
        };
        Ok(Self {
            value: parse("value_selector", &config.value_selector)?,
            change: parse("change_selector", &config.change_selector)?,
            direction: parse("direction_selector", &config.direction_selector)?,
            blind: parse("blind", ".blind")?,
        })
    }
}

pub struct ScrapeSource {
    gateway: Arc<dyn HttpGateway>,
    base_url: String,
    browser: BrowserProfile,
    selectors: PageSelectors,
}

impl ScrapeSource {
    pub fn new(gateway: Arc<dyn HttpGateway>, config: &ScrapeConfig, browser: BrowserProfile) -> Result<Self, AppError> {
        Ok(Self {
            gateway,
            base_url: config.base_url.clone(),
            browser,
            selectors: PageSelectors::parse(config)?,
        })
    }

    /// Pull value, change and direction out of a detail page.
    pub fn parse_page(&self, html: &str) -> Result<ScrapedQuote, FetchError> {
        let document = Html::parse_document(html);

        let value_text = self.select_text(&document, &self.selectors.value, "current value")?;
        let change_text = self.select_text(&document, &self.selectors.change, "change")?;
        let direction_text = self.select_text(&document, &self.selectors.direction, "direction")?;

        let value = parse_number(&value_text)
            .ok_or_else(|| FetchError::malformed(KIND, format!("unparsable value '{value_text}'")))?;
        let change = parse_number(&change_text)
            .ok_or_else(|| FetchError::malformed(KIND, format!("unparsable change '{change_text}'")))?;
        let direction = Direction::from_token(&direction_text)
            .ok_or_else(|| FetchError::malformed(KIND, format!("unknown direction word '{direction_text}'")))?;

        Ok(ScrapedQuote {
            value,
            change,
            direction,
        })
    }

    fn select_text(&self, document: &Html, selector: &Selector, what: &str) -> Result<String, FetchError> {
        let element = document
            .select(selector)
            .next()
            .ok_or_else(|| FetchError::malformed(KIND, format!("{what} element not found")))?;
        Ok(self.element_text(element))
    }

    fn element_text(&self, element: ElementRef<'_>) -> String {
        let source = element.select(&self.selectors.blind).next().unwrap_or(element);
        source.text().collect::<String>().trim().to_string()
    }
}

impl SourceStrategy for ScrapeSource {
    fn kind(&self) -> SourceKind {
        KIND
    }

    fn fetch(&self, spec: &BondQuerySpec) -> Result<RawObservation, FetchError> {
        let code = spec
            .scrape_code()
            .ok_or_else(|| FetchError::not_configured(KIND, format!("no page code for {}", spec.key())))?;

        let request = self
            .browser
            .apply(HttpRequest::get(&self.base_url).query("marketindexCd", code));
        let html = self
            .gateway
            .get_text(&request)
            .map_err(|e| FetchError::from_gateway(KIND, e))?;

        let scraped = self.parse_page(&html)?;
        RawObservation::from_change(KIND, scraped.value, scraped.value - scraped.signed_delta())
    }
}

/// Parse a displayed number such as `1,380.50`, `+0.020` or `-0.61%`.
fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
        .collect();
    let value = cleaned.trim_start_matches('+').parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}
