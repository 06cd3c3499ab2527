//! Web search tool
//!
//! Provides web search via configurable providers (Tavily, Brave, Serper)

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ArgSchema, FieldKind, Tool, ToolArgs};
use crate::config::{SearchBackend, SearchConfig};
use crate::{Error, Result};

const DEFAULT_MAX_RESULTS: usize = 5;

/// Web search tool
pub struct WebSearchTool {
    backend: SearchBackend,
    api_key: SecretString,
    base_url: Option<String>,
    client: reqwest::Client,
    schema: ArgSchema,
}

/// Search result from web search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title
    pub title: String,
    /// Result URL
    pub url: String,
    /// Result snippet/description
    pub snippet: String,
}

/// Tavily API request body
#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

/// Tavily API response
#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    content: String,
}

/// Brave Search API response
#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    description: String,
}

/// Serper API response
#[derive(Debug, Deserialize)]
struct SerperSearchResponse {
    organic: Option<Vec<SerperResult>>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    title: String,
    link: String,
    snippet: String,
}

/// Serper API request body
#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

impl WebSearchTool {
    /// Create a search tool from configuration
    #[must_use]
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            backend: config.backend,
            api_key: config.api_key.clone(),
            base_url: None,
            client: reqwest::Client::new(),
            schema: ArgSchema::new()
                .required("query", FieldKind::String, "What to search the web for")
                .optional(
                    "max_results",
                    FieldKind::Integer {
                        min: Some(1),
                        max: Some(20),
                    },
                    "How many results to return",
                ),
        }
    }

    /// Point the provider at a different host (tests, proxies)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn endpoint(&self, default_base: &str, path: &str) -> String {
        format!("{}{path}", self.base_url.as_deref().unwrap_or(default_base))
    }

    /// Perform a web search
    ///
    /// # Errors
    ///
    /// Returns error if the search request fails or response parsing fails
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        match self.backend {
            SearchBackend::Tavily => self.search_tavily(query, limit).await,
            SearchBackend::Brave => self.search_brave(query, limit).await,
            SearchBackend::Serper => self.search_serper(query, limit).await,
        }
    }

    /// Search using the Tavily API
    async fn search_tavily(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let request_body = TavilyRequest {
            api_key: self.api_key.expose_secret(),
            query,
            max_results: limit,
        };

        let response = self
            .client
            .post(self.endpoint("https://api.tavily.com", "/search"))
            .json(&request_body)
            .send()
            .await?;

        let response = response.error_for_status().map_err(Error::Http)?;
        let tavily_response: TavilySearchResponse = response.json().await?;

        Ok(tavily_response
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }

    /// Search using Brave Search API
    async fn search_brave(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(self.endpoint("https://api.search.brave.com", "/res/v1/web/search"))
            .header("X-Subscription-Token", self.api_key.expose_secret())
            .query(&[("q", query), ("count", &limit.to_string())])
            .send()
            .await?;

        let response = response.error_for_status().map_err(Error::Http)?;

        let brave_response: BraveSearchResponse = response.json().await?;

        let results = brave_response
            .web
            .map(|web| {
                web.results
                    .into_iter()
                    .map(|r| SearchResult {
                        title: r.title,
                        url: r.url,
                        snippet: r.description,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(results)
    }

    /// Search using Serper API
    async fn search_serper(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let request_body = SerperRequest { q: query, num: limit };

        let response = self
            .client
            .post(self.endpoint("https://google.serper.dev", "/search"))
            .header("X-API-KEY", self.api_key.expose_secret())
            .json(&request_body)
            .send()
            .await?;

        let response = response.error_for_status().map_err(Error::Http)?;

        let serper_response: SerperSearchResponse = response.json().await?;

        let results = serper_response
            .organic
            .map(|organic| {
                organic
                    .into_iter()
                    .map(|r| SearchResult {
                        title: r.title,
                        url: r.link,
                        snippet: r.snippet,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(results)
    }
}

/// Render results as a numbered list for the model
#[must_use]
pub fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information and return the top results."
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    async fn call(&self, args: ToolArgs) -> Result<String> {
        let query = args.str("query")?;
        let limit = args
            .opt_i64("max_results")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_RESULTS);

        tracing::debug!(query, limit, backend = ?self.backend, "web search");
        let results = self.search(query, limit).await?;
        Ok(format_results(&results))
    }
}
