use roster_history::{PlayerTag, TagError};
use std::path::PathBuf;

/// Where the host finds its collaborators and which clan it syncs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one local-shape JSON file per cached player
    pub cache_dir: PathBuf,
    /// JSON file acting as the remote store
    pub remote_path: PathBuf,
    /// Clan whose records are synced, normalized to `#BODY`
    pub clan_tag: String,
}

/// Values given on the command line; anything missing falls back to the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub cache_dir: Option<PathBuf>,
    pub remote_path: Option<PathBuf>,
    pub clan_tag: Option<String>,
}

impl Config {
    /// Resolve configuration from command-line overrides and environment variables.
    ///
    /// Environment variables:
    /// - `ROSTER_CACHE_DIR`: cache directory (default `.roster/cache`)
    /// - `ROSTER_REMOTE_PATH`: remote store file (default `.roster/remote.json`)
    /// - `ROSTER_CLAN_TAG`: clan tag (required unless passed with `--clan`)
    pub fn resolve(overrides: Overrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    fn resolve_with(
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let cache_dir = overrides
            .cache_dir
            .or_else(|| env("ROSTER_CACHE_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(".roster/cache"));
        let remote_path = overrides
            .remote_path
            .or_else(|| env("ROSTER_REMOTE_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(".roster/remote.json"));
        let raw_clan = overrides
            .clan_tag
            .or_else(|| env("ROSTER_CLAN_TAG"))
            .filter(|tag| !tag.trim().is_empty())
            .ok_or(ConfigError::MissingClanTag)?;
        // Clan tags share the player tag alphabet and spelling rules
        let clan_tag = raw_clan
            .parse::<PlayerTag>()
            .map_err(|source| ConfigError::InvalidClanTag {
                value: raw_clan.clone(),
                source,
            })?
            .to_string();

        Ok(Self {
            cache_dir,
            remote_path,
            clan_tag,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No clan tag: pass --clan or set ROSTER_CLAN_TAG")]
    MissingClanTag,

    #[error("Invalid clan tag {value:?}: {source}")]
    InvalidClanTag { value: String, source: TagError },
}
