//! Effect library
//!
//! Resolves operator-supplied effect names to files in the effects
//! directory. Matching is a case-insensitive substring test against file
//! names, so `applause` finds `Applause-Long.mp3`. Entries are scanned in
//! file-name order and the first match wins; hidden files are ignored.

use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct EffectLibrary {
    dir: PathBuf,
}

impl EffectLibrary {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Find the effect file whose name contains `name`
    pub async fn resolve(&self, name: &str) -> Result<PathBuf> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Err(Error::EffectNotFound(name.to_string()));
        }

        let found = self
            .entries()
            .await?
            .into_iter()
            .find(|(file_name, _)| file_name.to_lowercase().contains(&needle));

        match found {
            Some((file_name, path)) => {
                debug!("Effect {:?} resolved to {}", name, file_name);
                Ok(path)
            }
            None => Err(Error::EffectNotFound(name.to_string())),
        }
    }

    /// Names of all available effects, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|(file_name, _)| file_name)
            .collect())
    }

    /// Regular files in the effects directory, sorted by name
    async fn entries(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }
            entries.push((file_name, entry.path()));
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library_with(files: &[&str]) -> (TempDir, EffectLibrary) {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), b"fx").unwrap();
        }
        std::fs::create_dir(dir.path().join("applause-archive")).unwrap();
        std::fs::write(dir.path().join(".gitkeep"), b"").unwrap();
        let library = EffectLibrary::new(dir.path().to_path_buf());
        (dir, library)
    }

    #[tokio::test]
    async fn test_resolve_is_case_insensitive_substring() {
        let (_dir, library) = library_with(&["Applause-Long.mp3", "boo.mp3"]);

        let path = library.resolve("applause").await.unwrap();
        assert!(path.ends_with("Applause-Long.mp3"));

        let path = library.resolve("BOO").await.unwrap();
        assert!(path.ends_with("boo.mp3"));
    }

    #[tokio::test]
    async fn test_resolve_picks_first_in_name_order() {
        let (_dir, library) = library_with(&["laugh-2.mp3", "laugh-1.mp3"]);

        let path = library.resolve("laugh").await.unwrap();
        assert!(path.ends_with("laugh-1.mp3"));
    }

    #[tokio::test]
    async fn test_unknown_effect_is_not_found() {
        let (_dir, library) = library_with(&["boo.mp3"]);

        assert!(matches!(
            library.resolve("airhorn").await,
            Err(Error::EffectNotFound(name)) if name == "airhorn"
        ));
        assert!(matches!(library.resolve("  ").await, Err(Error::EffectNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_skips_directories_and_hidden_files() {
        let (_dir, library) = library_with(&["boo.mp3", "airhorn.mp3"]);

        assert_eq!(library.list().await.unwrap(), vec!["airhorn.mp3", "boo.mp3"]);
    }
}
