//! Page fetching and text cleanup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::core::config::settings::ScraperSettings;
use crate::core::errors::ServiceError;
use crate::pipeline::types::{PageMetadata, ScrapedPage};

const SKIPPED_ELEMENTS: [&str; 7] = [
    "script", "style", "nav", "footer", "header", "aside", "noscript",
];

const NO_TITLE: &str = "No Title";

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Cleaned page text, or `None` when the page cannot be used.
    async fn fetch(&self, url: &str) -> Option<ScrapedPage>;
}

pub struct HttpPageFetcher {
    client: Client,
    max_chars: usize,
}

impl HttpPageFetcher {
    pub fn new(settings: &ScraperSettings) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(&settings.user_agent)
            .build()
            .map_err(ServiceError::http)?;
        Ok(Self {
            client,
            max_chars: settings.max_chars,
        })
    }

    async fn download(&self, url: &str) -> Result<String, ServiceError> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(ServiceError::http)?
            .error_for_status()
            .map_err(ServiceError::http)?
            .text()
            .await
            .map_err(ServiceError::http)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Option<ScrapedPage> {
        info!("Scraping URL: {}", url);
        let html = match self.download(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Scraping failed for {}: {}", url, e);
                return None;
            }
        };

        let page = extract_page(&html, url, self.max_chars);
        if page.is_none() {
            warn!("No readable text at {}", url);
        }
        page
    }
}

/// Strips markup and boilerplate elements, keeping one trimmed phrase per line.
pub fn extract_page(html: &str, url: &str, max_chars: usize) -> Option<ScrapedPage> {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string());

    let mut pieces = Vec::new();
    collect_text(document.root_element(), &mut pieces);
    let raw = pieces.join("\n");

    let text = clean_text(&raw);
    if text.is_empty() {
        return None;
    }
    let text = if text.chars().count() > max_chars {
        debug!("Truncating {} to {} characters", url, max_chars);
        text.chars().take(max_chars).collect()
    } else {
        text
    };

    Some(ScrapedPage {
        text,
        metadata: PageMetadata {
            source: url.to_string(),
            title,
        },
    })
}

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if SKIPPED_ELEMENTS.contains(&child_el.value().name()) {
                continue;
            }
            collect_text(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            out.push(text.to_string());
        }
    }
}

/// Trims every line, splits on double spaces and drops empty phrases.
fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|phrase| !phrase.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
