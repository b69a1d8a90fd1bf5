//! Keyword filtering and hashtag highlights shared by every site scraper.

use itertools::Itertools;
use regex::Regex;

use crate::utils::hashtag;

/// Tag used when no configured keyword occurs in the headline.
pub const GENERAL_NEWS_TAG: &str = "#GeneralNews";

/// Compiled keyword list.
///
/// A headline *matches* when any keyword occurs as a whole word or phrase,
/// case-insensitively. Highlights are looser: every keyword contained in the
/// headline contributes a `#Keyword` tag.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<(String, Regex)>,
}

impl KeywordMatcher {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self, regex::Error> {
        let keywords = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .unique_by(|k| k.to_lowercase())
            .map(|k| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(&k.to_lowercase()));
                Regex::new(&pattern).map(|re| (k.to_string(), re))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keywords })
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn matches(&self, headline: &str) -> bool {
        self.keywords.iter().any(|(_, re)| re.is_match(headline))
    }

    pub fn highlights(&self, headline: &str) -> String {
        let lower = headline.to_lowercase();
        let tags = self
            .keywords
            .iter()
            .filter(|(k, _)| lower.contains(&k.to_lowercase()))
            .map(|(k, _)| hashtag(k))
            .join(" ");
        if tags.is_empty() {
            GENERAL_NEWS_TAG.to_string()
        } else {
            tags
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(keywords: &[&str]) -> KeywordMatcher {
        KeywordMatcher::new(keywords).unwrap()
    }

    #[test]
    fn test_matches_whole_words_only() {
        let m = matcher(&["ETH", "Bitcoin"]);
        assert!(m.matches("ETH breaks $4k"));
        assert!(m.matches("Why bitcoin, not gold?"));
        assert!(m.matches("Is this the top for Bitcoin!"));
        assert!(!m.matches("Ethereum upgrade ships"));
        assert!(!m.matches("Solana rallies"));
    }

    #[test]
    fn test_matches_phrases() {
        let m = matcher(&["Federal Reserve"]);
        assert!(m.matches("federal reserve holds rates."));
        assert!(!m.matches("Federal budget"));
    }

    #[test]
    fn test_highlights() {
        let m = matcher(&["Bitcoin", "Spot ETF", "ETH"]);
        assert_eq!(m.highlights("Bitcoin spot ETF inflows hit record"), "#Bitcoin #SpotETF");
        // containment, not word match, like the tag column always used
        assert_eq!(m.highlights("Ethereum staking grows"), "#ETH");
        assert_eq!(m.highlights("Solana outage"), GENERAL_NEWS_TAG);
    }

    #[test]
    fn test_keywords_are_trimmed_and_deduplicated() {
        let m = matcher(&[" Bitcoin ", "", "bitcoin", "   "]);
        assert_eq!(m.highlights("Bitcoin up"), "#Bitcoin");
        assert!(!m.is_empty());
        assert!(matcher(&[]).is_empty());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let m = matcher(&["S&P 500", "C++"]);
        assert!(m.matches("S&P 500 futures slip"));
        assert!(!m.matches("SxP 500 futures slip"));
    }
}
