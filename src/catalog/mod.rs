//! File catalog: user-facing aliases mapped to the files they tail.
//!
//! The mapping is fixed at startup.  Whether the backing file exists is only
//! checked when a tail starts, since log files come and go.

use std::path::{Path, PathBuf};

use crate::command::CommandError;

/// Ordered alias → path mapping.
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    entries: Vec<(String, PathBuf)>,
}

impl FileCatalog {
    /// Build a catalog, keeping the given order.  Aliases are expected to be
    /// unique; the config loader rejects duplicates.
    pub fn new(entries: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Aliases in insertion order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|(a, _)| a.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Backing path of `alias`.
    pub fn resolve(&self, alias: &str) -> Result<&Path, CommandError> {
        self.entries
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, p)| p.as_path())
            .ok_or_else(|| CommandError::UnknownAlias(alias.to_string()))
    }

    /// Resolve `alias` and require the backing file to exist right now.
    pub async fn resolve_existing(&self, alias: &str) -> Result<PathBuf, CommandError> {
        let path = self.resolve(alias)?;
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(path.to_path_buf()),
            _ => Err(CommandError::FileMissing {
                alias: alias.to_string(),
                path: path.to_path_buf(),
            }),
        }
    }

    /// Reply body for `ls`.
    pub fn listing(&self) -> String {
        if self.entries.is_empty() {
            return "No tailable files configured".to_string();
        }
        let mut lines = vec!["List of files:".to_string()];
        lines.extend(self.entries.iter().map(|(a, _)| format!("- {a}")));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> FileCatalog {
        FileCatalog::new([
            ("access".to_string(), PathBuf::from("/var/log/access.log")),
            ("auth".to_string(), PathBuf::from("/var/log/auth.log")),
        ])
    }

    #[test]
    fn list_keeps_insertion_order() {
        let c = FileCatalog::new([
            ("zeta".to_string(), PathBuf::from("/z")),
            ("alpha".to_string(), PathBuf::from("/a")),
        ]);
        assert_eq!(c.list(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn listing_matches_ls_reply() {
        assert_eq!(catalog().listing(), "List of files:\n- access\n- auth");
        assert_eq!(
            FileCatalog::default().listing(),
            "No tailable files configured"
        );
    }

    #[test]
    fn resolve_unknown_alias() {
        assert!(matches!(
            catalog().resolve("bogus"),
            Err(CommandError::UnknownAlias(a)) if a == "bogus"
        ));
        assert_eq!(
            catalog().resolve("auth").unwrap(),
            Path::new("/var/log/auth.log")
        );
    }

    #[tokio::test]
    async fn resolve_existing_checks_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.log");
        std::fs::write(&present, "x\n").unwrap();
        let c = FileCatalog::new([
            ("present".to_string(), present.clone()),
            ("gone".to_string(), dir.path().join("gone.log")),
            ("dir".to_string(), dir.path().to_path_buf()),
        ]);

        assert_eq!(c.resolve_existing("present").await.unwrap(), present);
        assert!(matches!(
            c.resolve_existing("gone").await,
            Err(CommandError::FileMissing { .. })
        ));
        assert!(matches!(
            c.resolve_existing("dir").await,
            Err(CommandError::FileMissing { .. })
        ));
    }
}
