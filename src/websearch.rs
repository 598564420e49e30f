//! External web search for the fallback controller.
//!
//! Pluggable providers: Tavily and Brave Search (API keys from
//! `TAVILY_API_KEY` / `BRAVE_API_KEY`) and the keyless DuckDuckGo instant
//! answer API. Configured providers become tiers of a [`TierChain`] and are
//! tried in order until one returns results.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use docshelf_core::chain::{Tier, TierChain};
use docshelf_core::Error;

use crate::config::FallbackConfig;

/// One web search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Chain of providers queried by the fallback controller.
pub type WebSearchChain = TierChain<str, Vec<WebResult>>;

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Failures are [`Error::ExternalSearch`].
    async fn search(&self, query: &str, max_results: u32) -> docshelf_core::Result<Vec<WebResult>>;
}

fn external(provider: &str, msg: impl std::fmt::Display) -> Error {
    Error::ExternalSearch(format!("{}: {}", provider, msg))
}

fn str_field(item: &serde_json::Value, key: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Tavily search provider (requires API key)
pub struct TavilyProvider {
    client: reqwest::Client,
    api_key: String,
}

#[async_trait]
impl WebSearchProvider for TavilyProvider {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: u32) -> docshelf_core::Result<Vec<WebResult>> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "include_answer": false,
        });

        let response = self
            .client
            .post("https://api.tavily.com/search")
            .json(&body)
            .send()
            .await
            .map_err(|e| external(self.name(), format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let err_body = response.text().await.unwrap_or_default();
            return Err(external(self.name(), format!("API error ({}): {}", status.as_u16(), err_body)));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| external(self.name(), format!("bad response: {}", e)))?;

        Ok(parse_tavily(&data))
    }
}

fn parse_tavily(data: &serde_json::Value) -> Vec<WebResult> {
    data.get("results")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .map(|item| WebResult {
                    title: str_field(item, "title"),
                    url: str_field(item, "url"),
                    snippet: str_field(item, "content"),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Brave Search provider (requires API key)
pub struct BraveSearchProvider {
    client: reqwest::Client,
    api_key: String,
}

#[async_trait]
impl WebSearchProvider for BraveSearchProvider {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, max_results: u32) -> docshelf_core::Result<Vec<WebResult>> {
        let response = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &max_results.to_string())])
            .send()
            .await
            .map_err(|e| external(self.name(), format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let err_body = response.text().await.unwrap_or_default();
            return Err(external(self.name(), format!("API error ({}): {}", status.as_u16(), err_body)));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| external(self.name(), format!("bad response: {}", e)))?;

        Ok(parse_brave(&data))
    }
}

fn parse_brave(data: &serde_json::Value) -> Vec<WebResult> {
    data.get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .map(|item| WebResult {
                    title: str_field(item, "title"),
                    url: str_field(item, "url"),
                    snippet: str_field(item, "description"),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// DuckDuckGo instant answer provider (no API key required, limited results)
pub struct DuckDuckGoProvider {
    client: reqwest::Client,
}

#[async_trait]
impl WebSearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: u32) -> docshelf_core::Result<Vec<WebResult>> {
        let response = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| external(self.name(), format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(external(self.name(), format!("HTTP {}", status.as_u16())));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| external(self.name(), format!("bad response: {}", e)))?;

        Ok(parse_duckduckgo(&data, max_results as usize))
    }
}

fn parse_duckduckgo(data: &serde_json::Value, max_results: usize) -> Vec<WebResult> {
    let mut results = Vec::new();

    // Abstract (main result)
    let abstract_text = str_field(data, "AbstractText");
    if !abstract_text.is_empty() {
        let heading = str_field(data, "Heading");
        results.push(WebResult {
            title: if heading.is_empty() {
                "Result".to_string()
            } else {
                heading
            },
            url: str_field(data, "AbstractURL"),
            snippet: abstract_text,
        });
    }

    // Related topics
    if let Some(topics) = data.get("RelatedTopics").and_then(|r| r.as_array()) {
        for topic in topics {
            if results.len() >= max_results {
                break;
            }
            let text = str_field(topic, "Text");
            if !text.is_empty() {
                results.push(WebResult {
                    title: text.chars().take(80).collect(),
                    url: str_field(topic, "FirstURL"),
                    snippet: text,
                });
            }
        }
    }

    results
}

/// Create a provider by name. Keyed providers read their key from the
/// environment and fail when it is missing.
pub fn create_provider(name: &str, client: reqwest::Client) -> Result<Arc<dyn WebSearchProvider>> {
    let key = |var: &str| -> Result<String> {
        std::env::var(var)
            .ok()
            .filter(|k| !k.is_empty())
            .with_context(|| format!("{} requires the {} environment variable", name, var))
    };

    let provider: Arc<dyn WebSearchProvider> = match name {
        "tavily" => Arc::new(TavilyProvider {
            client,
            api_key: key("TAVILY_API_KEY")?,
        }),
        "brave" => Arc::new(BraveSearchProvider {
            client,
            api_key: key("BRAVE_API_KEY")?,
        }),
        "duckduckgo" => Arc::new(DuckDuckGoProvider { client }),
        other => bail!(
            "Unknown search provider: '{}'. Supported: tavily, brave, duckduckgo",
            other
        ),
    };
    Ok(provider)
}

/// Adapts a provider into a chain tier.
pub struct ProviderTier {
    provider: Arc<dyn WebSearchProvider>,
    max_results: u32,
}

impl ProviderTier {
    pub fn new(provider: Arc<dyn WebSearchProvider>, max_results: u32) -> Self {
        Self {
            provider,
            max_results,
        }
    }
}

#[async_trait]
impl Tier<str, Vec<WebResult>> for ProviderTier {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn attempt(&self, query: &str) -> anyhow::Result<Option<Vec<WebResult>>> {
        let query = sanitize_query(query);
        if query.trim().is_empty() {
            return Ok(None);
        }
        let mut results = self.provider.search(&query, self.max_results).await?;
        results.retain(|r| !r.snippet.trim().is_empty());
        results.truncate(self.max_results as usize);
        Ok(Some(results))
    }
}

/// Strip control characters so they never reach a provider URL.
pub fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Build the provider chain from `[fallback]`. Providers whose API key is
/// missing are skipped with a warning.
pub fn build_chain(config: &FallbackConfig) -> Result<WebSearchChain> {
    let client = crate::http::client(config.timeout_secs)?;
    let mut chain = WebSearchChain::new();
    for name in &config.providers {
        match create_provider(name, client.clone()) {
            Ok(provider) => {
                chain = chain.push(Box::new(ProviderTier::new(provider, config.max_results)));
            }
            Err(e) => warn!(provider = %name, error = %e, "skipping search provider"),
        }
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tavily() {
        let data = serde_json::json!({
            "results": [{"title": "T", "url": "https://t.example", "content": "body"}]
        });
        assert_eq!(
            parse_tavily(&data),
            vec![WebResult {
                title: "T".to_string(),
                url: "https://t.example".to_string(),
                snippet: "body".to_string(),
            }]
        );
        assert!(parse_tavily(&serde_json::json!({})).is_empty());
    }

    #[test]
    fn test_parse_brave() {
        let data = serde_json::json!({
            "web": {"results": [{"title": "B", "url": "https://b.example", "description": "desc"}]}
        });
        let results = parse_brave(&data);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "desc");
    }

    #[test]
    fn test_parse_duckduckgo_abstract_and_topics() {
        let data = serde_json::json!({
            "Heading": "Rust",
            "AbstractText": "Rust is a language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "RelatedTopics": [
                {"Text": "Cargo - package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                {"Text": "Crates.io", "FirstURL": "https://duckduckgo.com/Crates"},
                {"Name": "group without text"}
            ]
        });
        let results = parse_duckduckgo(&data, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Rust");
        assert_eq!(results[1].url, "https://duckduckgo.com/Cargo");
    }

    #[test]
    fn test_sanitize_query() {
        assert_eq!(sanitize_query("a\nb\tc"), "a b c");
    }

    #[test]
    fn test_unknown_provider() {
        assert!(create_provider("bing", reqwest::Client::new()).is_err());
        assert!(create_provider("duckduckgo", reqwest::Client::new()).is_ok());
    }

    struct Canned(Vec<WebResult>);

    #[async_trait]
    impl WebSearchProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn search(&self, _query: &str, _max: u32) -> docshelf_core::Result<Vec<WebResult>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_tier_truncates_and_drops_empty_snippets() {
        let result = |s: &str| WebResult {
            title: s.to_string(),
            url: String::new(),
            snippet: s.to_string(),
        };
        let provider = Arc::new(Canned(vec![result("a"), result(" "), result("b"), result("c")]));
        let tier = ProviderTier::new(provider, 2);
        let got = tier.attempt("query").await.unwrap().unwrap();
        let titles: Vec<&str> = got.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }
}
