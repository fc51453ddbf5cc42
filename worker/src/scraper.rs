use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;

/// Title and extracted body text for one successfully fetched URL.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("timed out fetching the page")]
    Timeout,
}

/// The external scraper, treated as a black box by the rest of the worker:
/// nothing in the retry/backoff/counter logic depends on how a `Scraper`
/// gets its answer, only on the `Result` it returns.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, ScrapeError>;
}

/// Production `Scraper`: fetches over HTTP and extracts `<title>` plus the
/// concatenated text of `<body>` using CSS selectors.
pub struct HttpScraper {
    client: reqwest::Client,
}

impl HttpScraper {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("scrape-worker/0.1")
            .build()
            .expect("reqwest client config is valid");

        Self { client }
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, ScrapeError> {
        let response = self.client.get(url).send().await.map_err(|error| {
            if error.is_timeout() {
                ScrapeError::Timeout
            } else {
                ScrapeError::Request(error)
            }
        })?;

        if !response.status().is_success() {
            return Err(ScrapeError::Status(response.status()));
        }

        let body = response.text().await?;
        Ok(extract(&body))
    }
}

fn extract(body: &str) -> ScrapedPage {
    let document = Html::parse_document(body);

    let title_selector = Selector::parse("title").expect("static selector is valid");
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default()
        .trim()
        .to_string();

    let body_selector = Selector::parse("body").expect("static selector is valid");
    let content = document
        .select(&body_selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let content = content.split_whitespace().collect::<Vec<_>>().join(" ");

    ScrapedPage { title, content }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_body_text() {
        let page = extract("<html><head><title>Hello</title></head><body><p>World  news</p></body></html>");
        assert_eq!(page.title, "Hello");
        assert_eq!(page.content, "World news");
    }

    #[test]
    fn missing_title_and_body_yield_empty_strings() {
        let page = extract("<html></html>");
        assert_eq!(page.title, "");
        assert_eq!(page.content, "");
    }
}
