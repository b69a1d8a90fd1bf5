//! crypto.news front page scraper.
//!
//! Articles are `div.post-loop` cards holding the title in
//! `p.post-loop__title` and the link in `a.post-loop__link`.

use scraper::Html;
use std::sync::Arc;
use url::Url;

use super::keywords::KeywordMatcher;
use super::{candidate, element_text, resolve_link, selector, Scraper};
use crate::error::ScrapeError;
use crate::models::ArticleCandidate;

const BASE_URL: &str = "https://crypto.news/";

pub struct CryptoNewsScraper {
    keywords: Arc<KeywordMatcher>,
}

impl CryptoNewsScraper {
    pub fn new(keywords: Arc<KeywordMatcher>) -> Self {
        Self { keywords }
    }
}

impl Scraper for CryptoNewsScraper {
    fn scrape(&self, document: &Html) -> Result<Vec<ArticleCandidate>, ScrapeError> {
        let base = Url::parse(BASE_URL)?;
        let card = selector("div.post-loop")?;
        let title = selector("p.post-loop__title")?;
        let link = selector("a.post-loop__link[href]")?;

        let mut articles = Vec::new();
        for post in document.select(&card) {
            let (Some(title_el), Some(link_el)) =
                (post.select(&title).next(), post.select(&link).next())
            else {
                continue;
            };
            let Some(href) = link_el
                .value()
                .attr("href")
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
