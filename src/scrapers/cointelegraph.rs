//! Cointelegraph front page scraper.
//!
//! Each story is an `<article>`; the title sits in `span.post-card__title`
//! (older layouts use `h2.post-card__title`) and the first `a[href]` is the
//! story link, usually relative to `https://cointelegraph.com`.

use scraper::Html;
use std::sync::Arc;
use url::Url;

use super::keywords::KeywordMatcher;
use super::{candidate, element_text, resolve_link, selector, Scraper};
use crate::error::ScrapeError;
use crate::models::ArticleCandidate;

const BASE_URL: &str = "https://cointelegraph.com";

pub struct CointelegraphScraper {
    keywords: Arc<KeywordMatcher>,
}

impl CointelegraphScraper {
    pub fn new(keywords: Arc<KeywordMatcher>) -> Self {
        Self { keywords }
    }
}

impl Scraper for CointelegraphScraper {
    fn scrape(&self, document: &Html) -> Result<Vec<ArticleCandidate>, ScrapeError> {
        let base = Url::parse(BASE_URL)?;
        let article = selector("article")?;
        let span_title = selector("span.post-card__title")?;
        let h2_title = selector("h2.post-card__title")?;
        let anchor = selector("a[href]")?;

        let mut articles = Vec::new();
        for story in document.select(&article) {
            let Some(title_el) = story
                .select(&span_title)
                .next()
                .or_else(|| story.select(&h2_title).next())
            else {
                continue;
            };
            let Some(href) = story
                .select(&anchor)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|h| resolve_link(&base, h))
            else {
                continue;
            };
            if let Some(c) = candidate(&self.keywords, element_text(&title_el), href) {
                articles.push(c);
            }
        }
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrapes_both_title_layouts() {
        let page = r#"
            <main>
              <article class="post-card">
                <a href="/news/bitcoin-hits-new-high">
                  <span class="post-card__title">Bitcoin hits new high</span>
                </a>
              </article>
              <article class="post-card">
                <a href="https://cointelegraph.com/news/fed-decision">
                  <h2 class="post-card__title">Federal Reserve decision moves Bitcoin.</h2>
                </a>
              </article>
              <article class="post-card">
                <span class="post-card__title">Bitcoin story with no link</span>
              </article>
              <article class="promo"><a href="/promo">Subscribe</a></article>
            </main>
        "#;
        let keywords = Arc::new(KeywordMatcher::new(&["Bitcoin", "Federal Reserve"]).unwrap());
        let out = CointelegraphScraper::new(keywords)
            .scrape(&Html::parse_document(page))
            .unwrap();

        let links: Vec<_> = out.iter().map(|c| c.link.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "https://cointelegraph.com/news/bitcoin-hits-new-high",
                "https://cointelegraph.com/news/fed-decision",
            ]
        );
        assert_eq!(out[1].headline, "Federal Reserve decision moves Bitcoin.");
        assert_eq!(out[1].highlights, "#Bitcoin #FederalReserve");
    }

    #[test]
    fn test_non_matching_headlines_are_dropped() {
        let page = r#"<article><a href="/news/x"><span class="post-card__title">Solana news</span></a></article>"#;
        let keywords = Arc::new(KeywordMatcher::new(&["Bitcoin"]).unwrap());
        let out = CointelegraphScraper::new(keywords)
            .scrape(&Html::parse_document(page))
            .unwrap();
        assert!(out.is_empty());
    }
}
