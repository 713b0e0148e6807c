pub mod cleaner;
pub mod http_client;
pub mod parsers;

use async_trait::async_trait;

use self::http_client::{FetchError, HttpClient};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Anything that can hand back the HTML of a listing page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl PageSource for HttpClient {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.get_text(url).await
    }
}
