use crate::engine::SearchSettings;
use crate::ranking::Bm25Params;
use crate::tokenizer::AnalyzerConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Runtime configuration. Every field is optional in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index_path: PathBuf,
    /// Used only when a new index is created
    pub analyzer: AnalyzerConfig,
    pub scoring: Bm25Params,
    /// Snippet budget in characters
    pub snippet_length: usize,
    pub default_limit: usize,
    pub listen: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("index.docsift"),
            analyzer: AnalyzerConfig::default(),
            scoring: Bm25Params::default(),
            snippet_length: 150,
            default_limit: 10,
            listen: SocketAddr::from(([127, 0, 0, 1], 3030)),
        }
    }
}

impl Config {
    /// Load a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Err(message) = self.scoring.validate() {
            bail!("Invalid scoring settings: {message}");
        }
        if self.snippet_length == 0 {
            bail!("snippet_length must be positive");
        }
        Ok(())
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            scoring: self.scoring,
            snippet_length: self.snippet_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{ "index_path": "/tmp/idx", "scoring": {{ "k1": 2.0 }}, "analyzer": {{ "stopwords": true }} }}"#
        )?;

        let config = Config::from_file(file.path())?;
        assert_eq!(config.index_path, PathBuf::from("/tmp/idx"));
        assert_eq!(config.scoring.k1, 2.0);
        assert_eq!(config.scoring.b, 0.75);
        assert!(config.analyzer.stopwords);
        assert!(!config.analyzer.stemming);
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.listen.port(), 3030);

        Ok(())
    }

    #[test]
    fn test_invalid_scoring_rejected() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{ "scoring": {{ "b": 2.0 }} }}"#)?;

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("b must lie in"));

        Ok(())
    }
}
