pub mod html;

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::RwLock;
use sitesearch_core::IndexStore;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// One fetched HTTP response: status code plus raw body bytes.
pub struct FetchedPage {
    pub status: u16,
    pub body: Vec<u8>,
}

/// The crawler's view of HTTP: `GET url -> (status, bytes)`. Network errors
/// come back as `Err` and are soft failures to the crawl loop, same as a
/// non-success status.
pub trait PageFetcher {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchedPage>> + Send;
}

/// Production fetcher backed by a reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(FetchedPage { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    Done,
    MaxPagesReached,
}

/// Terminal state of a crawl run; both are normal, non-error outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// The frontier emptied.
    Done,
    /// The configured page cap was hit mid-frontier.
    MaxPagesReached,
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Seed URL; also the origin the crawl is restricted to and the base for
    /// resolving relative links.
    pub site: Url,
    /// Minimum delay between successive fetches.
    pub politeness_window: Duration,
    /// Cap on successfully fetched pages per crawl run.
    pub max_pages: usize,
}

impl CrawlConfig {
    pub fn new(site: Url) -> Self {
        Self {
            site,
            politeness_window: Duration::from_secs(6),
            max_pages: usize::MAX,
        }
    }
}

/// Single-site crawler feeding an [`IndexStore`]. Traversal is an explicit
/// frontier queue with a seen set reserved at enqueue time, so cyclic or deep
/// link graphs cannot recurse and a URL discovered from several pages enters
/// the frontier once.
pub struct Crawler<F> {
    fetcher: F,
    store: Arc<RwLock<IndexStore>>,
    config: CrawlConfig,
    state: CrawlState,
    seen: HashSet<String>,
    requested_urls: Vec<String>,
    fetched_pages: usize,
    last_fetch: Option<Instant>,
}

impl<F: PageFetcher> Crawler<F> {
    pub fn new(fetcher: F, store: Arc<RwLock<IndexStore>>, config: CrawlConfig) -> Self {
        Self {
            fetcher,
            store,
            config,
            state: CrawlState::Idle,
            seen: HashSet::new(),
            requested_urls: Vec::new(),
            fetched_pages: 0,
            last_fetch: None,
        }
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    /// Pages fetched with a success status in the current run.
    pub fn fetched_pages(&self) -> usize {
        self.fetched_pages
    }

    /// Every URL a fetch was attempted for, in order, including failures.
    pub fn requested_urls(&self) -> &[String] {
        &self.requested_urls
    }

    /// Return to `Idle`, forgetting everything the previous run saw.
    pub fn reset(&mut self) {
        self.state = CrawlState::Idle;
        self.seen.clear();
        self.requested_urls.clear();
        self.fetched_pages = 0;
        self.last_fetch = None;
    }

    /// Wait out the remainder of the politeness window, measured from the
    /// last successful fetch so failed round trips do not inflate the delay.
    async fn be_polite(&self) {
        if let Some(last) = self.last_fetch {
            let elapsed = last.elapsed();
            if elapsed < self.config.politeness_window {
                sleep(self.config.politeness_window - elapsed).await;
            }
        }
    }

    /// Crawl breadth-first from the configured site URL, indexing the visible
    /// text of every fetched page. Fetch failures and non-2xx responses are
    /// logged and skipped; a page with no visible text counts as fetched but
    /// is not indexed.
    pub async fn crawl(&mut self) -> Result<CrawlOutcome> {
        self.state = CrawlState::Running;
        let mut frontier: VecDeque<Url> = VecDeque::new();
        let seed = self.config.site.clone();
        self.seen.insert(url_key(&seed));
        frontier.push_back(seed);

        let outcome = loop {
            if self.fetched_pages >= self.config.max_pages {
                info!(fetched = self.fetched_pages, frontier = frontier.len(), "page cap reached");
                break CrawlOutcome::MaxPagesReached;
            }
            let Some(url) = frontier.pop_front() else {
                break CrawlOutcome::Done;
            };

            self.be_polite().await;
            self.requested_urls.push(url.to_string());
            let page = match self.fetcher.fetch(&url).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(%url, error = %err, "fetch failed");
                    continue;
                }
            };
            if !(200..300).contains(&page.status) {
                warn!(%url, status = page.status, "skipping non-success response");
                continue;
            }
            self.fetched_pages += 1;
            self.last_fetch = Some(Instant::now());

            let body = String::from_utf8_lossy(&page.body);
            let text = html::extract_text(&body);
            if text.is_empty() {
                debug!(%url, "page has no visible text, nothing to index");
            } else {
                self.store.write().index_page(url.as_str(), &text);
            }

            let mut enqueued = 0usize;
            for link in html::extract_links(&body, &self.config.site) {
                if link.origin() != self.config.site.origin() {
                    continue;
                }
                // Reserving the link in the seen set here, not at fetch time,
                // keeps duplicate discoveries out of the frontier entirely.
                if self.seen.insert(url_key(&link)) {
                    frontier.push_back(link);
                    enqueued += 1;
                }
            }
            debug!(%url, enqueued, frontier = frontier.len(), "page crawled");
            if self.fetched_pages % 25 == 0 {
                info!(
                    fetched = self.fetched_pages,
                    frontier = frontier.len(),
                    seen = self.seen.len(),
                    "crawl progress"
                );
            }
        };

        self.state = match outcome {
            CrawlOutcome::Done => CrawlState::Done,
            CrawlOutcome::MaxPagesReached => CrawlState::MaxPagesReached,
        };
        info!(
            fetched = self.fetched_pages,
            pages = self.store.read().page_count(),
            state = ?self.state,
            "crawl finished"
        );
        Ok(outcome)
    }
}

/// Frontier/seen key: the URL without its fragment.
fn url_key(url: &Url) -> String {
    let mut stripped = url.clone();
    stripped.set_fragment(None);
    stripped.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StubFetcher {
        pages: HashMap<&'static str, (u16, &'static str)>,
    }

    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
            match self.pages.get(url.as_str()) {
                Some(&(status, body)) => Ok(FetchedPage {
                    status,
                    body: body.as_bytes().to_vec(),
                }),
                None => Ok(FetchedPage {
                    status: 404,
                    body: Vec::new(),
                }),
            }
        }
    }

    fn crawler(
        pages: HashMap<&'static str, (u16, &'static str)>,
        max_pages: usize,
    ) -> Crawler<StubFetcher> {
        let store = Arc::new(RwLock::new(IndexStore::new("never-written.json")));
        let mut config = CrawlConfig::new(Url::parse("https://site.test/").unwrap());
        config.politeness_window = Duration::ZERO;
        config.max_pages = max_pages;
        Crawler::new(StubFetcher { pages }, store, config)
    }

    #[tokio::test]
    async fn cyclic_links_terminate_with_each_page_once() {
        let pages = HashMap::from([
            (
                "https://site.test/",
                (200, r#"<body>page a <a href="/b">b</a></body>"#),
            ),
            (
                "https://site.test/b",
                (200, r#"<body>page b <a href="/">a</a></body>"#),
            ),
        ]);
        let mut crawler = crawler(pages, usize::MAX);
        assert_eq!(crawler.state(), CrawlState::Idle);
        let outcome = crawler.crawl().await.unwrap();
        assert_eq!(outcome, CrawlOutcome::Done);
        assert_eq!(crawler.state(), CrawlState::Done);
        assert_eq!(crawler.fetched_pages(), 2);

        let store = crawler.store.read();
        assert_eq!(store.page_count(), 2);
        assert!(store.is_consistent());
        assert!(store.page_id("https://site.test/").is_some());
        assert!(store.page_id("https://site.test/b").is_some());
    }

    #[tokio::test]
    async fn page_cap_stops_fetching_but_leaves_a_consistent_index() {
        let pages = HashMap::from([
            (
                "https://site.test/",
                (
                    200,
                    r#"<body>root <a href="/b">b</a> <a href="/c">c</a></body>"#,
                ),
            ),
            ("https://site.test/b", (200, "<body>page b</body>")),
            ("https://site.test/c", (200, "<body>page c</body>")),
        ]);
        let mut crawler = crawler(pages, 2);
        let outcome = crawler.crawl().await.unwrap();
        assert_eq!(outcome, CrawlOutcome::MaxPagesReached);
        assert_eq!(crawler.state(), CrawlState::MaxPagesReached);
        assert_eq!(crawler.fetched_pages(), 2);

        let store = crawler.store.read();
        assert_eq!(store.page_count(), 2);
        assert!(store.is_consistent());
    }

    #[tokio::test]
    async fn failed_fetches_are_skipped_and_the_crawl_continues() {
        let pages = HashMap::from([
            (
                "https://site.test/",
                (
                    200,
                    r#"<body>root <a href="/missing">gone</a> <a href="/ok">ok</a></body>"#,
                ),
            ),
            ("https://site.test/ok", (200, "<body>still here</body>")),
        ]);
        let mut crawler = crawler(pages, usize::MAX);
        let outcome = crawler.crawl().await.unwrap();
        assert_eq!(outcome, CrawlOutcome::Done);
        assert_eq!(crawler.fetched_pages(), 2);
        assert_eq!(crawler.requested_urls().len(), 3);

        let store = crawler.store.read();
        assert_eq!(store.page_count(), 2);
        assert!(store.page_id("https://site.test/missing").is_none());
    }

    #[tokio::test]
    async fn cross_origin_and_fragment_duplicate_links_are_discarded() {
        let pages = HashMap::from([
            (
                "https://site.test/",
                (
                    200,
                    r#"<body>root
                        <a href="https://other.test/away">away</a>
                        <a href="/b">b</a>
                        <a href="/b#section">b again</a>
                    </body>"#,
                ),
            ),
            ("https://site.test/b", (200, "<body>page b</body>")),
        ]);
        let mut crawler = crawler(pages, usize::MAX);
        crawler.crawl().await.unwrap();
        assert_eq!(crawler.fetched_pages(), 2);
        assert!(crawler
            .requested_urls()
            .iter()
            .all(|url| url.starts_with("https://site.test/")));
    }

    #[tokio::test]
    async fn empty_pages_count_as_fetched_but_are_not_indexed() {
        let pages = HashMap::from([
            (
                "https://site.test/",
                (200, r#"<body> <a href="/blank">blank</a></body>"#),
            ),
            ("https://site.test/blank", (200, "<body>   </body>")),
        ]);
        let mut crawler = crawler(pages, usize::MAX);
        crawler.crawl().await.unwrap();
        assert_eq!(crawler.fetched_pages(), 2);
        let store = crawler.store.read();
        assert!(store.page_id("https://site.test/blank").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn politeness_window_spaces_out_fetches() {
        let pages = HashMap::from([
            (
                "https://site.test/",
                (200, r#"<body>a <a href="/b">b</a> <a href="/c">c</a></body>"#),
            ),
            ("https://site.test/b", (200, "<body>b</body>")),
            ("https://site.test/c", (200, "<body>c</body>")),
        ]);
        let store = Arc::new(RwLock::new(IndexStore::new("never-written.json")));
        let mut config = CrawlConfig::new(Url::parse("https://site.test/").unwrap());
        config.politeness_window = Duration::from_secs(5);
        let mut crawler = Crawler::new(StubFetcher { pages }, store, config);

        let start = Instant::now();
        crawler.crawl().await.unwrap();
        // Three fetches, so the window applies twice.
        assert!(start.elapsed() >= Duration::from_secs(10));
    }
}
