//! Post-patch syntax checks.

use std::path::Path;

use async_trait::async_trait;

/// Checks a file still parses after an edit.
#[async_trait]
pub trait SyntaxValidator: Send + Sync {
    /// `Some(message)` when the file is broken. Unsupported or missing files pass.
    async fn check(&self, path: &Path) -> Option<String>;
}

/// Parses `.json` and `.toml` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSyntaxValidator;

#[async_trait]
impl SyntaxValidator for DefaultSyntaxValidator {
    async fn check(&self, path: &Path) -> Option<String> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if !matches!(extension.as_str(), "json" | "toml") {
            return None;
        }
        let content = tokio::fs::read_to_string(path).await.ok()?;
        match extension.as_str() {
            "json" => serde_json::from_str::<serde_json::Value>(&content)
                .err()
                .map(|err| err.to_string()),
            _ => toml::from_str::<toml::Table>(&content)
                .err()
                .map(|err| err.message().to_string()),
        }
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSyntaxValidator;

#[async_trait]
impl SyntaxValidator for NoopSyntaxValidator {
    async fn check(&self, _path: &Path) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broken_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        std::fs::write(&path, "{\"a\": ").unwrap();
        assert!(DefaultSyntaxValidator.check(&path).await.is_some());
    }

    #[tokio::test]
    async fn valid_toml_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        std::fs::write(&path, "[package]\nname = \"x\"\n").unwrap();
        assert!(DefaultSyntaxValidator.check(&path).await.is_none());
    }

    #[tokio::test]
    async fn broken_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "key = = 1").unwrap();
        assert!(DefaultSyntaxValidator.check(&path).await.is_some());
    }

    #[tokio::test]
    async fn unsupported_and_missing_files_pass() {
        let dir = tempfile::tempdir().unwrap();
        let rust = dir.path().join("main.rs");
        std::fs::write(&rust, "fn main( {").unwrap();
        assert!(DefaultSyntaxValidator.check(&rust).await.is_none());
        assert!(DefaultSyntaxValidator.check(&dir.path().join("gone.json")).await.is_none());
    }
}
