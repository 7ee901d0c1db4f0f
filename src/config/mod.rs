use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::catalog::FileCatalog;
use crate::tail::TailOptions;

/// Environment variable that overrides `credentials.token`.
pub const TOKEN_ENV: &str = "CHATTAIL_TOKEN";

/// Top-level configuration loaded from the YAML config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Messaging account credentials.
    pub credentials: Credentials,
    /// Allow-listed contact ids, in order.
    pub contacts: Vec<String>,
    /// Tailable files: alias → absolute path, in order.
    #[serde(deserialize_with = "ordered_map")]
    pub files: Vec<(String, PathBuf)>,
    /// Streaming settings.
    #[serde(default)]
    pub tail: TailConfig,
}

/// Messaging account credentials.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    /// Bot token: a literal value or a `$VAR` environment reference.
    #[serde(default)]
    pub token: Option<String>,
}

/// Optional `tail:` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TailConfig {
    /// Backoff in milliseconds when a file has nothing new.  Default: 1000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Existing lines sent when a tail starts.  Default: 0.
    #[serde(default)]
    pub backlog_lines: usize,
    /// Lines longer than this are truncated.  Default: 1900.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            backlog_lines: 0,
            max_line_len: default_max_line_len(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_line_len() -> usize {
    1900
}

impl Config {
    /// Read and parse a YAML configuration file.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&contents)
            .with_context(|| format!("invalid config file: {}", path.display()))?;

        tracing::debug!(
            contacts = config.contacts.len(),
            files = config.files.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(contents: &str) -> anyhow::Result<Config> {
        let config: Config =
            serde_yaml::from_str(contents).context("failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    fn validate(&self) -> anyhow::Result<()> {
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        for contact in &self.contacts {
            if contact.trim().is_empty() {
                anyhow::bail!("config: empty contact id");
            }
            if !seen.insert(contact.as_str()) {
                anyhow::bail!("config: duplicate contact: {contact}");
            }
        }

        let mut aliases = HashSet::new();
        for (alias, path) in &self.files {
            if alias.is_empty() || alias.contains(' ') {
                anyhow::bail!("config: file alias '{alias}' must be a non-empty single word");
            }
            if !aliases.insert(alias.as_str()) {
                anyhow::bail!("config: duplicate file alias: {alias}");
            }
            if !path.is_absolute() {
                anyhow::bail!(
                    "config: file '{alias}' path must be absolute: {}",
                    path.display()
                );
            }
        }

        if self.tail.poll_interval_ms == 0 {
            anyhow::bail!("config: tail.poll_interval_ms=0 (would create busy loop)");
        }
        if self.tail.max_line_len == 0 {
            anyhow::bail!("config: tail.max_line_len must be positive");
        }

        Ok(())
    }

    /// The file catalog described by `files`.
    pub fn catalog(&self) -> FileCatalog {
        FileCatalog::new(self.files.iter().cloned())
    }

    pub fn tail_options(&self) -> TailOptions {
        TailOptions {
            poll_interval: Duration::from_millis(self.tail.poll_interval_ms),
            backlog_lines: self.tail.backlog_lines,
            max_line_len: self.tail.max_line_len,
        }
    }

    /// Resolve the bot token.
    ///
    /// Order: the `CHATTAIL_TOKEN` environment variable, then
    /// `credentials.token` (`$VAR` reads that variable, anything else is
    /// taken literally).
    pub fn resolve_token(&self) -> anyhow::Result<String> {
        if let Ok(tok) = std::env::var(TOKEN_ENV) {
            if !tok.is_empty() {
                return Ok(tok);
            }
        }
        let raw = self
            .credentials
            .token
            .as_deref()
            .filter(|s| !s.is_empty())
            .with_context(|| format!("no token configured (set {TOKEN_ENV} or credentials.token)"))?;
        match raw.strip_prefix('$') {
            Some(var) if !var.is_empty() => std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .with_context(|| format!("credentials.token references unset variable ${var}")),
            _ => Ok(raw.to_string()),
        }
    }
}

/// Deserialize a YAML mapping into a `Vec` of pairs, keeping document order.
fn ordered_map<'de, D>(deserializer: D) -> Result<Vec<(String, PathBuf)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedMap(PhantomData<fn() -> Vec<(String, PathBuf)>>);

    impl<'de> Visitor<'de> for OrderedMap {
        type Value = Vec<(String, PathBuf)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of file alias to path")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((alias, path)) = map.next_entry::<String, PathBuf>()? {
                out.push((alias, path));
            }
            Ok(out)
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_map(OrderedMap(PhantomData))
}
