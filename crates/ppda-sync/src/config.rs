use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ppda_adapters::{FetcherConfig, AIRECOO_URL, SNIFA_URL};
use ppda_core::IndicatorSource;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    pub attachments_dir: PathBuf,
    pub scheduler_enabled: bool,
    pub snifa_cron: String,
    pub airecoo_cron: String,
    pub snifa_url: String,
    pub airecoo_url: String,
    pub snifa_token: Option<String>,
    pub user_agent: String,
    pub workspace_root: PathBuf,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        Self {
            database_url: non_empty("DATABASE_URL"),
            attachments_dir: non_empty("ATTACHMENTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./media")),
            scheduler_enabled: var("PPDA_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            snifa_cron: non_empty("SNIFA_CRON").unwrap_or_else(|| "0 0 * * * *".to_string()),
            airecoo_cron: non_empty("AIRECOO_CRON").unwrap_or_else(|| "0 15 * * * *".to_string()),
            snifa_url: non_empty("SNIFA_URL").unwrap_or_else(|| SNIFA_URL.to_string()),
            airecoo_url: non_empty("AIRECOO_URL").unwrap_or_else(|| AIRECOO_URL.to_string()),
            snifa_token: non_empty("SNIFA_TOKEN"),
            user_agent: non_empty("PPDA_USER_AGENT")
                .unwrap_or_else(|| format!("ppda-reportes/{}", env!("CARGO_PKG_VERSION"))),
            workspace_root: non_empty("PPDA_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Per-source settings after applying the optional `sources.yaml` overrides.
    pub fn source_settings(&self) -> Result<Vec<SourceSettings>> {
        let registry = SourceRegistry::load(&self.workspace_root.join("sources.yaml"))?;
        let mut overrides = HashMap::new();
        for entry in registry.sources {
            let source = IndicatorSource::from_slug(&entry.source)
                .with_context(|| format!("unknown source `{}` in sources.yaml", entry.source))?;
            if overrides.insert(source, entry).is_some() {
                bail!("source `{}` listed twice in sources.yaml", source.slug());
            }
        }

        Ok(IndicatorSource::ALL
            .iter()
            .map(|&source| {
                let (default_url, default_cron, token) = match source {
                    IndicatorSource::Snifa => {
                        (&self.snifa_url, &self.snifa_cron, self.snifa_token.clone())
                    }
                    IndicatorSource::Airecoo => (&self.airecoo_url, &self.airecoo_cron, None),
                };
                let entry = overrides.remove(&source);
                let fetcher = FetcherConfig {
                    source,
                    url: entry
                        .as_ref()
                        .and_then(|e| e.url.clone())
                        .unwrap_or_else(|| default_url.clone()),
                    bearer_token: token,
                    user_agent: Some(self.user_agent.clone()),
                };
                SourceSettings {
                    source,
                    enabled: entry.as_ref().is_none_or(|e| e.enabled),
                    cron: entry
                        .and_then(|e| e.cron)
                        .unwrap_or_else(|| default_cron.clone()),
                    fetcher,
                }
            })
            .collect())
    }
}

/// Resolved configuration of one upstream source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub source: IndicatorSource,
    pub enabled: bool,
    pub cron: String,
    pub fetcher: FetcherConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    /// Source slug, `snifa` or `airecoo`.
    pub source: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cron: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceRegistry {
    /// A missing file means "no overrides".
    pub fn load(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}
