//! Site scrapers turning a fetched front page into candidate articles.
//!
//! Every scraper follows the same pattern:
//!
//! 1. **Select**: walk the article containers of the site's front page
//! 2. **Extract**: pull headline text and link, resolving relative links
//!    against the site's base URL
//! 3. **Filter**: keep only headlines matching the configured keywords and
//!    attach their `#hashtag` highlights
//!
//! Candidates are returned in document order; the pipeline preserves it.
//!
//! # Supported Sources
//!
//! | Source | Module | Containers |
//! |--------|--------|------------|
//! | crypto.news | [`crypto_news`] | `div.post-loop` |
//! | Cointelegraph | [`cointelegraph`] | `article` |
//! | Bitcoin Magazine | [`bitcoin_magazine`] | `div[class*=td_module_flex]` |

pub mod bitcoin_magazine;
pub mod cointelegraph;
pub mod crypto_news;
pub mod keywords;

use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::error::ScrapeError;
use crate::models::{ArticleCandidate, SourceId};
use keywords::KeywordMatcher;

/// Extracts candidate articles from one site's parsed front page.
pub trait Scraper: Send + Sync {
    fn scrape(&self, document: &Html) -> Result<Vec<ArticleCandidate>, ScrapeError>;
}

/// Scraper registered for `id`.
pub fn for_source(id: SourceId, keywords: Arc<KeywordMatcher>) -> Box<dyn Scraper> {
    match id {
        SourceId::CryptoNews => Box::new(crypto_news::CryptoNewsScraper::new(keywords)),
        SourceId::Cointelegraph => Box::new(cointelegraph::CointelegraphScraper::new(keywords)),
        SourceId::BitcoinMagazine => {
            Box::new(bitcoin_magazine::BitcoinMagazineScraper::new(keywords))
        }
    }
}

/// Parse `body` and run the scraper registered for `id` over it.
///
/// The parsed document never outlives this call, so callers can use it from
/// async tasks without holding the (non-`Send`) DOM across an await.
pub fn scrape_page(
    id: SourceId,
    body: &str,
    keywords: Arc<KeywordMatcher>,
) -> Result<Vec<ArticleCandidate>, ScrapeError> {
    if body.trim().is_empty() {
        return Err(ScrapeError::EmptyDocument);
    }
    let document = Html::parse_document(body);
    let candidates = for_source(id, keywords).scrape(&document)?;
    debug!(source = %id, count = candidates.len(), "Scraped candidates");
    Ok(candidates)
}

pub(crate) fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

/// Text of an element with whitespace collapsed.
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Absolute form of `href` relative to `base`; `None` for unusable links.
///
/// Absolute http(s) links are returned as written, since the link is the
/// article's identity in the store. Only relative links go through
/// [`Url::join`].
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    match Url::parse(href) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(href.to_string()),
        _ => base.join(href).ok().map(|u| u.to_string()),
    }
}

/// Shared tail of every scraper: keyword filter and highlights.
pub(crate) fn candidate(
    keywords: &KeywordMatcher,
    headline: String,
    link: String,
) -> Option<ArticleCandidate> {
    if headline.is_empty() || !keywords.matches(&headline) {
        return None;
    }
    let highlights = keywords.highlights(&headline);
    Some(ArticleCandidate {
        headline,
        link,
        highlights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Arc<KeywordMatcher> {
        Arc::new(KeywordMatcher::new(&["Bitcoin"]).unwrap())
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let err = scrape_page(SourceId::CryptoNews, "  \n ", keywords()).unwrap_err();
        assert!(matches!(err, ScrapeError::EmptyDocument));
    }

    #[test]
    fn test_page_without_articles_yields_nothing() {
        for id in SourceId::ALL {
            let out = scrape_page(id, "<html><body><p>maintenance</p></body></html>", keywords());
            assert!(out.unwrap().is_empty(), "{id}");
        }
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://cointelegraph.com").unwrap();
        assert_eq!(
            resolve_link(&base, "/news/a").as_deref(),
            Some("https://cointelegraph.com/news/a")
        );
        assert_eq!(
            resolve_link(&base, " https://other.org/x ").as_deref(),
            Some("https://other.org/x")
        );
        assert_eq!(resolve_link(&base, "#top"), None);
        assert_eq!(resolve_link(&base, ""), None);
    }

    #[test]
    fn test_absolute_links_are_kept_as_written() {
        let base = Url::parse("https://crypto.news/").unwrap();
        for href in [
            "https://Crypto.News/news/bitcoin-etf/",
            "https://crypto.news:443/news/a",
            "http://bitcoinmagazine.com/markets/../news/b",
        ] {
            assert_eq!(resolve_link(&base, href).as_deref(), Some(href));
        }
        // relative links are still resolved against the page
        assert_eq!(
            resolve_link(&base, "news/../markets/c/").as_deref(),
            Some("https://crypto.news/markets/c/")
        );
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let err = selector("div[").unwrap_err();
        assert!(matches!(err, ScrapeError::Selector { .. }));
    }
}
