//! Settings snapshot, re-read at the start of every polling cycle.
//!
//! The settings file is YAML. The keyword list can be inlined under
//! `keywords`, kept in a separate JSON array referenced by `keywords_file`
//! (resolved relative to the settings file), or both.
//!
//! ```yaml
//! telegram:
//!   api_token: "123:abc"              # or TELEGRAM_API_TOKEN
//!   full_details_chat_ids: [1001]
//!   partial_chat_ids: [2002, 2003]
//! summaries:
//!   enabled: true
//!   api_key: "sk-..."                 # or OPENAI_API_KEY
//!   model: gpt-4o-mini
//! keywords_file: keywords.json
//! sources:
//!   - name: cointelegraph
//!     tier: important
//! fetch:
//!   max_retries: 5
//!   timeout_secs: 10
//! ```
//!
//! A [`Settings`] value is never mutated once loaded; the pipeline receives
//! it behind an `Arc` for the duration of one run.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::ConfigError;
use crate::fetcher::FetchPolicy;
use crate::models::{Source, SourceId, Tier};
use crate::scrapers::keywords::KeywordMatcher;
use crate::summarizer::SUMMARY_MAX_TOKENS;

pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_API_TOKEN";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";

/// Telegram delivery settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub api_token: Option<String>,
    pub api_base: String,
    /// Chats receiving every message.
    pub full_details_chat_ids: Vec<i64>,
    /// Chats receiving standard-tier messages only.
    pub partial_chat_ids: Vec<i64>,
    /// `HTML`, `Markdown`, or unset for plain text.
    pub parse_mode: Option<String>,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_token: None,
            api_base: "https://api.telegram.org".to_string(),
            full_details_chat_ids: Vec::new(),
            partial_chat_ids: Vec::new(),
            parse_mode: None,
        }
    }
}

impl TelegramSettings {
    /// Destination chats for a message of the given tier, without repeats.
    pub fn chats_for(&self, tier: Tier) -> Vec<i64> {
        let partial: &[i64] = match tier {
            Tier::Standard => &self.partial_chat_ids,
            Tier::Important => &[],
        };
        let mut seen = HashSet::new();
        partial
            .iter()
            .chain(self.full_details_chat_ids.iter())
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// Summarization backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    /// Token budget of one article summary.
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: SUMMARY_MAX_TOKENS,
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub backoff_unit_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let policy = FetchPolicy::default();
        Self {
            max_retries: policy.max_retries,
            timeout_secs: policy.timeout.as_secs(),
            backoff_unit_ms: policy.backoff_unit.as_millis() as u64,
        }
    }
}

/// One configured source; `url` defaults to the site's front page.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    pub name: SourceId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tier: Tier,
}

/// Everything a polling cycle needs to know.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub telegram: TelegramSettings,
    pub summaries: SummarySettings,
    pub keywords: Vec<String>,
    pub keywords_file: Option<PathBuf>,
    /// Empty means every supported site at its default URL.
    pub sources: Vec<SourceSettings>,
    pub fetch: FetchSettings,
    /// Announce runs that found nothing new.
    pub notify_when_empty: bool,
}

impl Settings {
    /// Load the settings file at `path`, its keyword file, and the
    /// credential overrides from the process environment.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = Self::load_with_env(path, |key| std::env::var(key).ok())?;
        info!(
            sources = settings.sources().len(),
            keywords = settings.keywords.len(),
            summaries = settings.summaries.enabled,
            "Loaded settings"
        );
        Ok(settings)
    }

    fn load_with_env(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let label = path.display().to_string();
        if !path.exists() {
            return Err(ConfigError::NotFound(label));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: label.clone(),
            source,
        })?;
        let mut settings = Self::from_yaml_str(&raw, &label)?;

        if let Some(file) = settings.keywords_file.clone() {
            let file = match path.parent() {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file,
            };
            let mut from_file = load_keyword_file(&file)?;
            settings.keywords.append(&mut from_file);
        }
        settings.keywords = clean_keywords(std::mem::take(&mut settings.keywords));

        settings.apply_env(env);
        settings.validate()?;
        Ok(settings)
    }

    fn from_yaml_str(raw: &str, label: &str) -> Result<Self, ConfigError> {
        // An empty file deserializes as YAML null; treat it as all defaults.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: label.to_string(),
            message: e.to_string(),
        })
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(token) = env(ENV_TELEGRAM_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.telegram.api_token = Some(token);
        }
        if let Some(key) = env(ENV_OPENAI_KEY).filter(|v| !v.trim().is_empty()) {
            self.summaries.api_key = Some(key);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for s in &self.sources {
            if !seen.insert(s.name) {
                return Err(ConfigError::Invalid(format!(
                    "source `{}` is configured more than once",
                    s.name
                )));
            }
        }
        if self.summaries.enabled && self.summaries.api_key.is_none() {
            warn!("Summaries enabled without an API key; summaries will fail");
        }
        if self.keywords.is_empty() {
            warn!("Keyword list is empty; no article will match");
        }
        Ok(())
    }

    /// Sources to poll, in configuration order.
    pub fn sources(&self) -> Vec<Source> {
        if self.sources.is_empty() {
            return SourceId::ALL.into_iter().map(Source::default_for).collect();
        }
        self.sources
            .iter()
            .map(|s| {
                let url = s.url.clone().unwrap_or_else(|| s.name.default_url().to_string());
                Source::new(s.name, url, s.tier)
            })
            .collect()
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_retries: self.fetch.max_retries,
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            backoff_unit: Duration::from_millis(self.fetch.backoff_unit_ms),
        }
    }

    pub fn keyword_matcher(&self) -> Result<KeywordMatcher, ConfigError> {
        KeywordMatcher::new(&self.keywords)
            .map_err(|e| ConfigError::Invalid(format!("keyword list: {e}")))
    }
}

/// Read a JSON array of keywords.
fn load_keyword_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let label = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: label.clone(),
        source,
    })?;
    serde_json::from_str::<Vec<String>>(&raw).map_err(|e| ConfigError::Parse {
        path: label,
        message: e.to_string(),
    })
}

/// Trim, drop blanks, remove case-insensitive duplicates keeping the first
/// spelling.
fn clean_keywords(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, content).unwrap();
        p
    }

    #[test]
    fn test_defaults_for_minimal_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "news.yaml", "keywords: [Bitcoin]\n");

        let s = Settings::load_with_env(&path, no_env).unwrap();
        assert!(!s.summaries.enabled);
        assert!(!s.notify_when_empty);
        assert_eq!(s.fetch_policy(), FetchPolicy::default());
        let names: Vec<_> = s.sources().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["crypto.news", "cointelegraph", "bitcoinmagazine"]);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "news.yaml", "");
        let s = Settings::load_with_env(&path, no_env).unwrap();
        assert!(s.keywords.is_empty());
        assert_eq!(s.sources().len(), 3);
    }

    #[test]
    fn test_full_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keywords.json", r#"[" ETF ", "bitcoin", ""]"#);
        let path = write(
            dir.path(),
            "news.yaml",
            r#"
telegram:
  api_token: "123:abc"
  full_details_chat_ids: [1001]
  partial_chat_ids: [2002, 1001]
summaries:
  enabled: true
  api_key: sk-test
  model: gpt-4o
keywords: [Bitcoin, Ethereum]
keywords_file: keywords.json
sources:
  - name: cointelegraph
    tier: important
  - name: crypto.news
    url: https://crypto.news/markets/
fetch:
  max_retries: 3
  timeout_secs: 4
  backoff_unit_ms: 250
notify_when_empty: true
"#,
        );

        let s = Settings::load_with_env(&path, no_env).unwrap();
        assert_eq!(s.keywords, vec!["Bitcoin", "Ethereum", "ETF"]);
        assert_eq!(s.summaries.model, "gpt-4o");
        assert!(s.notify_when_empty);
        assert_eq!(
            s.fetch_policy(),
            FetchPolicy {
                max_retries: 3,
                timeout: Duration::from_secs(4),
                backoff_unit: Duration::from_millis(250),
            }
        );

        let sources = s.sources();
        assert_eq!(
            sources,
            vec![
                Source::new(SourceId::Cointelegraph, "https://cointelegraph.com/", Tier::Important),
                Source::new(SourceId::CryptoNews, "https://crypto.news/markets/", Tier::Standard),
            ]
        );

        assert_eq!(s.telegram.chats_for(Tier::Standard), vec![2002, 1001]);
        assert_eq!(s.telegram.chats_for(Tier::Important), vec![1001]);
    }

    #[test]
    fn test_env_overrides_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "news.yaml",
            "telegram:\n  api_token: from-file\nsummaries:\n  enabled: true\n",
        );
        let env = |key: &str| match key {
            ENV_TELEGRAM_TOKEN => Some("from-env".to_string()),
            ENV_OPENAI_KEY => Some("sk-env".to_string()),
            _ => None,
        };

        let s = Settings::load_with_env(&path, env).unwrap();
        assert_eq!(s.telegram.api_token.as_deref(), Some("from-env"));
        assert_eq!(s.summaries.api_key.as_deref(), Some("sk-env"));
    }

    #[test]
    fn test_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = Settings::load_with_env(&dir.path().join("nope.yaml"), no_env);
        assert!(matches!(missing, Err(ConfigError::NotFound(_))));

        let bad_yaml = write(dir.path(), "bad.yaml", "telegram: [unclosed\n");
        assert!(matches!(
            Settings::load_with_env(&bad_yaml, no_env),
            Err(ConfigError::Parse { .. })
        ));

        let unknown_source = write(dir.path(), "src.yaml", "sources:\n  - name: decrypt\n");
        assert!(matches!(
            Settings::load_with_env(&unknown_source, no_env),
            Err(ConfigError::Parse { .. })
        ));

        let dup = write(
            dir.path(),
            "dup.yaml",
            "sources:\n  - name: cointelegraph\n  - name: cointelegraph\n",
        );
        assert!(matches!(
            Settings::load_with_env(&dup, no_env),
            Err(ConfigError::Invalid(_))
        ));

        write(dir.path(), "kw.json", r#"{"not": "a list"}"#);
        let bad_keywords = write(dir.path(), "kw.yaml", "keywords_file: kw.json\n");
        assert!(matches!(
            Settings::load_with_env(&bad_keywords, no_env),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_clean_keywords() {
        let out = clean_keywords(vec![
            " BTC ".into(),
            "".into(),
            "btc".into(),
            "Spot ETF".into(),
        ]);
        assert_eq!(out, vec!["BTC", "Spot ETF"]);
    }
}
