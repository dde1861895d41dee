//! Hugging Face Hub integration.
//!
//! Downloads checkpoint files (`config.json`,
//! `diffusion_pytorch_model.safetensors`) of a repository into the local
//! Hub cache so that [`crate::pretrained::PretrainedModel::from_pretrained`]
//! can read them like a local directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use aprender_vae::hf_hub::HfHubClient;
//!
//! // Initialize client (uses HF_TOKEN env var)
//! let client = HfHubClient::new()?;
//!
//! let dir = client.pull_files("fusing/autoencoder-kl-dummy", &["config.json"])?;
//! assert!(dir.join("config.json").exists());
//! ```
//!
//! # Authentication
//!
//! Public repositories need no token. For gated or private ones set the
//! `HF_TOKEN` environment variable:
//! ```bash
//! export HF_TOKEN=hf_xxxxxxxxxxxxxxxxxxxxx
//! ```
//!
//! # Cache location
//!
//! `HF_HUB_CACHE`, else `$HF_HOME/hub`, else the platform cache directory
//! (`~/.cache/huggingface/hub` on Linux).

use std::path::{Path, PathBuf};

use tracing::debug;

/// Error type for HF Hub operations
#[derive(Debug)]
pub enum HfHubError {
    /// Network or API error
    NetworkError(String),
    /// File not found in repository
    FileNotFound(String),
    /// Invalid repository ID format
    InvalidRepoId(String),
    /// IO error
    IoError(std::io::Error),
}

impl std::fmt::Display for HfHubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkError(e) => write!(f, "Network error: {e}"),
            Self::FileNotFound(file) => write!(f, "File not found: {file}"),
            Self::InvalidRepoId(id) => write!(f, "Invalid repo ID (expected 'org/name'): {id}"),
            Self::IoError(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for HfHubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HfHubError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e)
    }
}

/// Result type for HF Hub operations
pub type Result<T> = std::result::Result<T, HfHubError>;

/// Hugging Face Hub client for downloading model files
#[derive(Debug, Clone)]
pub struct HfHubClient {
    /// HF API token
    token: Option<String>,
    /// Cache directory for downloaded files
    cache_dir: PathBuf,
}

impl HfHubClient {
    /// Create a new HF Hub client
    ///
    /// Reads the token from `HF_TOKEN` and the cache location from
    /// `HF_HUB_CACHE` / `HF_HOME`.
    ///
    /// # Errors
    ///
    /// Does not error on missing token (allows anonymous pulls).
    pub fn new() -> Result<Self> {
        Ok(Self {
            token: std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
            cache_dir: Self::default_cache_dir(),
        })
    }

    /// Create client with explicit token
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            cache_dir: Self::default_cache_dir(),
        }
    }

    /// Set custom cache directory
    #[must_use]
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    /// Cache directory files are downloaded into.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Check if client has authentication token
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Default cache directory from the environment.
    pub(crate) fn default_cache_dir() -> PathBuf {
        resolve_cache_dir(
            std::env::var_os("HF_HUB_CACHE").map(PathBuf::from),
            std::env::var_os("HF_HOME").map(PathBuf::from),
        )
    }

    /// Parse repository ID (org/name format)
    pub(crate) fn parse_repo_id(repo_id: &str) -> Result<(&str, &str)> {
        match repo_id.split_once('/') {
            Some((org, name)) if !org.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((org, name))
            }
            _ => Err(HfHubError::InvalidRepoId(repo_id.to_string())),
        }
    }

    /// Download `files` of a model repository.
    ///
    /// # Returns
    ///
    /// The snapshot directory that holds the downloaded files.
    ///
    /// # Errors
    ///
    /// Returns an error if the repo id is malformed, the API client cannot
    /// be built, or any file cannot be fetched.
    #[cfg(feature = "hf-hub-integration")]
    pub fn pull_files(&self, repo_id: &str, files: &[&str]) -> Result<PathBuf> {
        use hf_hub::api::sync::ApiBuilder;

        let (org, name) = Self::parse_repo_id(repo_id)?;

        let api = ApiBuilder::new()
            .with_token(self.token.clone())
            .with_cache_dir(self.cache_dir.clone())
            .with_progress(false)
            .build()
            .map_err(|e| HfHubError::NetworkError(e.to_string()))?;
        let repo = api.model(format!("{org}/{name}"));

        let mut snapshot_dir = None;
        for file in files {
            let path = repo
                .get(file)
                .map_err(|e| HfHubError::FileNotFound(format!("{repo_id}/{file}: {e}")))?;
            debug!(repo = repo_id, file = %path.display(), "resolved hub file");
            if snapshot_dir.is_none() {
                snapshot_dir = path.parent().map(Path::to_path_buf);
            }
        }

        snapshot_dir.ok_or_else(|| HfHubError::FileNotFound(format!("{repo_id}: no files requested")))
    }

    /// Download files (stub when feature disabled)
    #[cfg(not(feature = "hf-hub-integration"))]
    pub fn pull_files(&self, repo_id: &str, _files: &[&str]) -> Result<PathBuf> {
        Self::parse_repo_id(repo_id)?;
        debug!(repo = repo_id, "hub download requested without hf-hub-integration");
        Err(HfHubError::NetworkError(
            "hf-hub-integration feature not enabled".to_string(),
        ))
    }
}

fn resolve_cache_dir(hf_hub_cache: Option<PathBuf>, hf_home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = hf_hub_cache {
        return dir;
    }
    if let Some(home) = hf_home {
        return home.join("hub");
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("huggingface")
        .join("hub")
}
