//! Bitcoin Magazine articles page scraper.
//!
//! The page uses the `td_module_flex` card family; the headline and link are
//! the anchor inside `h3.entry-title.td-module-title`.

use scraper::Html;
use std::sync::Arc;
use url::Url;

use super::keywords::KeywordMatcher;
use super::{candidate, element_text, resolve_link, selector, Scraper};
use crate::error::ScrapeError;
use crate::models::ArticleCandidate;

const BASE_URL: &str = "https://bitcoinmagazine.com";

pub struct BitcoinMagazineScraper {
    keywords: Arc<KeywordMatcher>,
}

impl BitcoinMagazineScraper {
    pub fn new(keywords: Arc<KeywordMatcher>) -> Self {
        Self { keywords }
    }
}

impl Scraper for BitcoinMagazineScraper {
    fn scrape(&self, document: &Html) -> Result<Vec<ArticleCandidate>, ScrapeError> {
        let base = Url::parse(BASE_URL)?;
        let module = selector(r#"div[class*="td_module_flex"]"#)?;
        let title_link = selector("h3.entry-title.td-module-title a[href]")?;

        let mut articles = Vec::new();
        for post in document.select(&module) {
            let Some(a) = post.select(&title_link).next() else {
                continue;
            };
            let Some(href) = a.value().attr("href").and_then(|h| resolve_link(&base, h)) else {
                continue;
            };
            if let Some(c) = candidate(&self.keywords, element_text(&a), href) {
                articles.push(c);
            }
        }
        Ok(articles)
    }
}
