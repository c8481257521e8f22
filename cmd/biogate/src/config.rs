//! Configuration for the biogate CLI.
//!
//! Stored as YAML in ~/.biogate/config.yaml. Every field is optional; a
//! missing file means all defaults.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use biogate_engine::CosineVerifier;
use biogate_vecstore::IndexConfig;
use serde::{Deserialize, Serialize};

/// Default base directory name under the home directory.
pub const DEFAULT_BASE_DIR: &str = ".biogate";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Default data directory name under the base directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Face embedding dimension (Facenet512).
pub const FACE_DIM: usize = 512;
/// Voice embedding dimension (ECAPA-TDNN).
pub const VOICE_DIM: usize = 192;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct Config {
    /// Where indexes, snapshots and identity records live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    pub face: ModalityConfig,

    pub voice: ModalityConfig,
}

/// Config as written in the file; missing sections take the defaults of
/// their modality.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default)]
    face: RawModality,
    #[serde(default)]
    voice: RawModality,
}

#[derive(Default, Deserialize)]
struct RawModality {
    #[serde(default)]
    index: Option<IndexConfig>,
    #[serde(default)]
    verifier: Option<CosineVerifier>,
}

impl RawModality {
    fn or(self, defaults: ModalityConfig) -> ModalityConfig {
        let mut index = self.index.unwrap_or(defaults.index);
        index.set_defaults();
        ModalityConfig {
            index,
            verifier: self.verifier.unwrap_or(defaults.verifier),
        }
    }
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Self {
            data_dir: raw.data_dir,
            face: raw.face.or(ModalityConfig::face()),
            voice: raw.voice.or(ModalityConfig::voice()),
        }
    }
}

/// Index shape and verification threshold of one modality.
#[derive(Debug, Clone, Serialize)]
pub struct ModalityConfig {
    pub index: IndexConfig,
    pub verifier: CosineVerifier,
}

impl ModalityConfig {
    pub fn face() -> Self {
        Self {
            index: IndexConfig::with_dim(FACE_DIM),
            verifier: CosineVerifier::face_default(),
        }
    }

    pub fn voice() -> Self {
        Self {
            index: IndexConfig::with_dim(VOICE_DIM),
            verifier: CosineVerifier::voice_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            face: ModalityConfig::face(),
            voice: ModalityConfig::voice(),
        }
    }
}

impl Config {
    /// Gets the default base directory.
    pub fn default_base_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR))
    }

    /// Gets the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_base_dir().map(|dir| dir.join(DEFAULT_CONFIG_FILE))
    }

    /// Resolves the data directory: the override if given, then the config
    /// file, then ~/.biogate/data.
    pub fn resolve_data_dir(&self, overridden: Option<&Path>) -> anyhow::Result<PathBuf> {
        if let Some(dir) = overridden {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        Self::default_base_dir()
            .map(|dir| dir.join(DEFAULT_DATA_DIR))
            .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))
    }
}

/// Loads the configuration from `custom_path`, or the default path.
pub fn load_config(custom_path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = match custom_path {
        Some(p) => p.to_path_buf(),
        None => match Config::default_config_path() {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };

    if !config_path.exists() {
        if custom_path.is_some() {
            anyhow::bail!("config file '{}' not found", config_path.display());
        }
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("read {}", config_path.display()))?;
    let cfg: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("parse {}", config_path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use biogate_engine::Threshold;
    use biogate_vecstore::Metric;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.face.index.dim, FACE_DIM);
        assert_eq!(cfg.voice.index.dim, VOICE_DIM);
        assert_eq!(cfg.face.index.num_trees, 10);
        assert_eq!(cfg.face.index.metric, Metric::Angular);
        assert_eq!(cfg.face.verifier.threshold, Threshold::MaxDistance(0.25));
        assert_eq!(cfg.voice.verifier.threshold, Threshold::MinSimilarity(0.25));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
data_dir: /var/lib/biogate
voice:
  index:
    dim: 256
    metric: euclidean
  verifier:
    threshold: !min_similarity 0.4
"#,
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.data_dir.as_deref(), Some(Path::new("/var/lib/biogate")));
        assert_eq!(cfg.face.index.dim, FACE_DIM);
        assert_eq!(cfg.voice.index.dim, 256);
        assert_eq!(cfg.voice.index.metric, Metric::Euclidean);
        assert_eq!(cfg.voice.index.num_trees, 10);
        assert_eq!(cfg.voice.index.seed, 42);
        assert_eq!(cfg.voice.verifier.threshold, Threshold::MinSimilarity(0.4));
    }

    #[test]
    fn test_modality_sections_are_optional() {
        let cfg: Config = serde_yaml::from_str(
            r#"
face:
  index:
    dim: 128
voice:
  verifier:
    threshold: !min_similarity 0.5
"#,
        )
        .unwrap();
        assert_eq!(cfg.face.index.dim, 128);
        assert_eq!(cfg.face.index.leaf_size, 16);
        assert_eq!(cfg.face.verifier, CosineVerifier::face_default());
        assert_eq!(cfg.voice.index, IndexConfig::with_dim(VOICE_DIM));
        assert_eq!(cfg.voice.verifier.threshold, Threshold::MinSimilarity(0.5));

        let empty: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(empty.face.index, IndexConfig::with_dim(FACE_DIM));
        assert_eq!(empty.voice.verifier, CosineVerifier::voice_default());
    }

    #[test]
    fn test_missing_custom_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.yaml"))).is_err());
    }

    #[test]
    fn test_resolve_data_dir() {
        let mut cfg = Config::default();
        cfg.data_dir = Some(PathBuf::from("/from/config"));
        assert_eq!(
            cfg.resolve_data_dir(Some(Path::new("/from/flag"))).unwrap(),
            PathBuf::from("/from/flag")
        );
        assert_eq!(
            cfg.resolve_data_dir(None).unwrap(),
            PathBuf::from("/from/config")
        );
    }
}
