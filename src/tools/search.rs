//! Web search providers.
//!
//! DuckDuckGo's HTML endpoint needs no key and is the default. Google
//! Custom Search, Brave and Bing are used when selected and keyed; when a
//! keyed engine is unconfigured, fails or finds nothing, the search falls
//! back to DuckDuckGo. Search never fails the pipeline: the worst case is
//! an empty result list.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::core::config::settings::SearchSettings;
use crate::core::errors::ServiceError;
use crate::pipeline::types::SearchResult;

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// At most `max_results` hits, engine order. Failure yields an empty list.
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult>;
}

/// Base URLs of each engine.
#[derive(Debug, Clone)]
pub struct SearchEndpoints {
    pub duckduckgo: String,
    pub google: String,
    pub brave: String,
    pub bing: String,
}

impl Default for SearchEndpoints {
    fn default() -> Self {
        Self {
            duckduckgo: "https://html.duckduckgo.com/html/".to_string(),
            google: "https://www.googleapis.com/customsearch/v1".to_string(),
            brave: "https://api.search.brave.com/res/v1/web/search".to_string(),
            bing: "https://api.bing.microsoft.com/v7.0/search".to_string(),
        }
    }
}

pub struct WebSearch {
    client: Client,
    settings: SearchSettings,
    endpoints: SearchEndpoints,
}

impl WebSearch {
    pub fn new(settings: &SearchSettings, user_agent: &str) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(ServiceError::http)?;
        Ok(Self {
            client,
            settings: settings.clone(),
            endpoints: SearchEndpoints::default(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: SearchEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// The selected keyed engine, or `None` when DuckDuckGo is selected or keys are missing.
    async fn keyed_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Option<Result<Vec<SearchResult>, ServiceError>> {
        let s = &self.settings;
        match s.provider.as_str() {
            "google" if !s.google_api_key.is_empty() && !s.google_engine_id.is_empty() => {
                Some(self.google(query, max_results).await)
            }
            "brave" if !s.brave_api_key.is_empty() => Some(self.brave(query, max_results).await),
            "bing" if !s.bing_api_key.is_empty() => Some(self.bing(query, max_results).await),
            "duckduckgo" => None,
            other => {
                warn!("Search provider '{}' has no API key, using DuckDuckGo", other);
                None
            }
        }
    }

    async fn get_json(&self, request: reqwest::RequestBuilder, engine: &str) -> Result<Value, ServiceError> {
        let response = request.send().await.map_err(ServiceError::http)?;
        if !response.status().is_success() {
            return Err(ServiceError::Http(format!(
                "{} search failed: {}",
                engine,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))
    }

    async fn google(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, ServiceError> {
        // Custom Search serves at most 10 results per page.
        let num = max_results.clamp(1, 10).to_string();
        let request = self.client.get(&self.endpoints.google).query(&[
            ("key", self.settings.google_api_key.as_str()),
            ("cx", self.settings.google_engine_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
        ]);
        let payload = self.get_json(request, "Google").await?;
        Ok(json_results(&payload["items"], "title", "link", "snippet"))
    }

    async fn brave(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, ServiceError> {
        let count = max_results.clamp(1, 20).to_string();
        let request = self
            .client
            .get(&self.endpoints.brave)
            .query(&[("q", query), ("count", count.as_str())])
            .header("X-Subscription-Token", &self.settings.brave_api_key)
            .header("Accept", "application/json");
        let payload = self.get_json(request, "Brave").await?;
        Ok(json_results(&payload["web"]["results"], "title", "url", "description"))
    }

    async fn bing(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, ServiceError> {
        let count = max_results.max(1).to_string();
        let request = self
            .client
            .get(&self.endpoints.bing)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Ocp-Apim-Subscription-Key", &self.settings.bing_api_key);
        let payload = self.get_json(request, "Bing").await?;
        Ok(json_results(&payload["webPages"]["value"], "name", "url", "snippet"))
    }

    async fn duckduckgo(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, ServiceError> {
        let html = self
            .client
            .post(&self.endpoints.duckduckgo)
            .form(&[("q", query)])
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(ServiceError::http)?
            .error_for_status()
            .map_err(ServiceError::http)?
            .text()
            .await
            .map_err(ServiceError::http)?;

        parse_duckduckgo_html(&html, max_results)
    }
}

#[async_trait]
impl SearchProvider for WebSearch {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        info!("Searching web for: {}", query);

        if let Some(outcome) = self.keyed_search(query, max_results).await {
            match outcome {
                Ok(results) if !results.is_empty() => {
                    return truncate(results, max_results);
                }
                Ok(_) => info!(
                    "{} returned no results, falling back to DuckDuckGo",
                    self.settings.provider
                ),
                Err(e) => warn!(
                    "{} search failed, falling back to DuckDuckGo: {}",
                    self.settings.provider, e
                ),
            }
        }

        match self.duckduckgo(query, max_results).await {
            Ok(results) => truncate(results, max_results),
            Err(e) => {
                warn!("Search failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn truncate(mut results: Vec<SearchResult>, max_results: usize) -> Vec<SearchResult> {
    results.truncate(max_results);
    results
}

fn json_results(items: &Value, title_key: &str, link_key: &str, snippet_key: &str) -> Vec<SearchResult> {
    let text = |item: &Value, key: &str| {
        item.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    items
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| SearchResult {
                    title: text(item, title_key),
                    link: text(item, link_key),
                    snippet: text(item, snippet_key),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Unwraps `//duckduckgo.com/l/?uddg=<encoded>&rut=...` redirect links.
fn extract_ddg_url(href: &str) -> Option<String> {
    let full_href = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&full_href).ok()?;
    if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
    } else {
        Some(full_href)
    }
}

pub(crate) fn parse_duckduckgo_html(
    html: &str,
    max_results: usize,
) -> Result<Vec<SearchResult>, ServiceError> {
    let document = Html::parse_document(html);
    let selector = |css: &str| {
        Selector::parse(css).map_err(|e| ServiceError::Parse(format!("invalid selector {}: {:?}", css, e)))
    };
    let result_sel = selector(".result:not(.result--ad), .web-result:not(.result--ad)")?;
    let title_sel = selector(".result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut results = Vec::new();
    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_string();
        let Some(link) = title_el.value().attr("href").and_then(extract_ddg_url) else {
            continue;
        };
        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());

        if results.iter().any(|r: &SearchResult| r.link.as_deref() == Some(link.as_str())) {
            continue;
        }

        results.push(SearchResult {
            title: (!title.is_empty()).then_some(title),
            link: Some(link),
            snippet,
        });
        if results.len() >= max_results {
            break;
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DDG_HTML: &str = r#"<html><body>
<div class="result results_links results_links_deep web-result">
  <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rbi.org.in%2Frepo&amp;rut=abc">RBI repo rate</a>
  <a class="result__snippet">The RBI kept the repo rate unchanged.</a>
</div>
<div class="result result--ad">
  <a class="result__a" href="https://ads.example/">Sponsored</a>
</div>
<div class="result results_links web-result">
  <a class="result__a" href="https://www.sebi.gov.in/">SEBI</a>
</div>
</body></html>"#;

    fn settings(provider: &str) -> SearchSettings {
        SearchSettings {
            provider: provider.to_string(),
            ..SearchSettings::default()
        }
    }

    fn endpoints(server: &MockServer) -> SearchEndpoints {
        SearchEndpoints {
            duckduckgo: format!("{}/html/", server.uri()),
            google: format!("{}/customsearch/v1", server.uri()),
            brave: format!("{}/brave", server.uri()),
            bing: format!("{}/bing", server.uri()),
        }
    }

    #[test]
    fn parses_duckduckgo_results_and_skips_ads() {
        let results = parse_duckduckgo_html(DDG_HTML, 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title.as_deref(), Some("RBI repo rate"));
        assert_eq!(results[0].link.as_deref(), Some("https://www.rbi.org.in/repo"));
        assert_eq!(
            results[0].snippet.as_deref(),
            Some("The RBI kept the repo rate unchanged.")
        );
        assert_eq!(results[1].link.as_deref(), Some("https://www.sebi.gov.in/"));
        assert_eq!(results[1].snippet, None);

        assert_eq!(parse_duckduckgo_html(DDG_HTML, 1).unwrap().len(), 1);
    }

    #[test]
    fn unwraps_redirect_links() {
        assert_eq!(
            extract_ddg_url("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa&rut=x"),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(
            extract_ddg_url("https://example.com/direct"),
            Some("https://example.com/direct".to_string())
        );
        assert_eq!(extract_ddg_url("not a url"), None);
    }

    #[tokio::test]
    async fn duckduckgo_is_the_default_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DDG_HTML))
            .mount(&server)
            .await;

        let search = WebSearch::new(&settings("duckduckgo"), "test-agent")
            .unwrap()
            .with_endpoints(endpoints(&server));
        let results = search.search("repo rate", 10).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn keyed_provider_results_are_used() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brave"))
            .and(header("X-Subscription-Token", "brave-key"))
            .and(query_param("q", "nifty 50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "web": { "results": [
                    { "title": "Nifty 50", "url": "https://nse.example/nifty", "description": "Index" },
                    { "title": "No link" }
                ] }
            })))
            .mount(&server)
            .await;

        let mut cfg = settings("brave");
        cfg.brave_api_key = "brave-key".to_string();
        let search = WebSearch::new(&cfg, "test-agent")
            .unwrap()
            .with_endpoints(endpoints(&server));

        let results = search.search("nifty 50", 10).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].link.as_deref(), Some("https://nse.example/nifty"));
        assert_eq!(results[1].link, None);
    }

    #[tokio::test]
    async fn failing_keyed_provider_falls_back_to_duckduckgo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DDG_HTML))
            .mount(&server)
            .await;

        let mut cfg = settings("google");
        cfg.google_api_key = "k".to_string();
        cfg.google_engine_id = "cx".to_string();
        let search = WebSearch::new(&cfg, "test-agent")
            .unwrap()
            .with_endpoints(endpoints(&server));

        let results = search.search("repo rate", 10).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].title.as_deref(), Some("SEBI"));
    }

    #[tokio::test]
    async fn total_failure_yields_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let search = WebSearch::new(&settings("duckduckgo"), "test-agent")
            .unwrap()
            .with_endpoints(endpoints(&server));
        assert!(search.search("anything", 10).await.is_empty());
    }
}
