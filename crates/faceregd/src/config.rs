use facereg_core::ModelFamily;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_BIND: &str = "127.0.0.1:8000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid bind address {0:?}")]
    Bind(String),
    #[error(transparent)]
    Model(#[from] facereg_core::distance::UnknownModel),
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the identity store text file.
    pub db_path: PathBuf,
    /// Recognition model family, selects the default thresholds.
    pub model: ModelFamily,
    /// Detector model file name (relative to `model_dir`) or absolute path.
    pub detector_model: String,
    /// Recognizer model file name (relative to `model_dir`) or absolute path.
    pub recognizer_model: String,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
}

/// Optional TOML file layer. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind: Option<String>,
    model_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    model: Option<String>,
    detector_model: Option<String>,
    recognizer_model: Option<String>,
    max_upload_bytes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            model_dir: facereg_core::default_model_dir(),
            db_path: facereg_core::default_db_path(),
            model: ModelFamily::default(),
            detector_model: facereg_core::DETECTOR_MODEL_FILE.to_string(),
            recognizer_model: facereg_core::RECOGNIZER_MODEL_FILE.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file named by `FACEREG_CONFIG` (if set), then
    /// `FACEREG_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file = match lookup("FACEREG_CONFIG") {
            Some(path) => read_file(Path::new(&path))?,
            None => FileConfig::default(),
        };

        let defaults = Config::default();

        let bind_str = lookup("FACEREG_BIND")
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_str.parse().map_err(|_| ConfigError::Bind(bind_str.clone()))?;

        let model = match lookup("FACEREG_MODEL").or(file.model) {
            Some(name) => name.parse()?,
            None => defaults.model,
        };

        Ok(Self {
            bind,
            model_dir: lookup("FACEREG_MODEL_DIR")
                .map(PathBuf::from)
                .or(file.model_dir)
                .unwrap_or(defaults.model_dir),
            db_path: lookup("FACEREG_DB_PATH")
                .map(PathBuf::from)
                .or(file.db_path)
                .unwrap_or(defaults.db_path),
            model,
            detector_model: lookup("FACEREG_DETECTOR_MODEL")
                .or(file.detector_model)
                .unwrap_or(defaults.detector_model),
            recognizer_model: lookup("FACEREG_RECOGNIZER_MODEL")
                .or(file.recognizer_model)
                .unwrap_or(defaults.recognizer_model),
            max_upload_bytes: lookup("FACEREG_MAX_UPLOAD_BYTES")
                .and_then(|v| v.parse().ok())
                .or(file.max_upload_bytes)
                .unwrap_or(defaults.max_upload_bytes),
        })
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(&self.detector_model)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(&self.recognizer_model)
            .to_string_lossy()
            .into_owned()
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse { path: display, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.db_path, PathBuf::from("face_db.txt"));
        assert_eq!(config.model, ModelFamily::ArcFace);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(config.detector_model_path().ends_with("det_10g.onnx"));
        assert!(config.recognizer_model_path().ends_with("w600k_r50.onnx"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("FACEREG_BIND", "0.0.0.0:9000"),
            ("FACEREG_DB_PATH", "/var/lib/facereg/db.txt"),
            ("FACEREG_MODEL_DIR", "/opt/models"),
            ("FACEREG_MODEL", "vgg-face"),
            ("FACEREG_MAX_UPLOAD_BYTES", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/facereg/db.txt"));
        assert_eq!(config.detector_model_path(), "/opt/models/det_10g.onnx");
        assert_eq!(config.model, ModelFamily::VggFace);
        assert_eq!(config.max_upload_bytes, 1024);
    }

    #[test]
    fn test_absolute_model_name_overrides_dir() {
        let config = Config::from_lookup(lookup_from(&[
            ("FACEREG_MODEL_DIR", "/opt/models"),
            ("FACEREG_RECOGNIZER_MODEL", "/srv/arcface.onnx"),
        ]))
        .unwrap();
        assert_eq!(config.recognizer_model_path(), "/srv/arcface.onnx");
    }

    #[test]
    fn test_bad_numeric_env_falls_back() {
        let lookup = lookup_from(&[("FACEREG_MAX_UPLOAD_BYTES", "lots")]);
        let config = Config::from_lookup(lookup).unwrap();
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_bad_bind_and_model_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FACEREG_BIND", "not-an-addr")])),
            Err(ConfigError::Bind(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FACEREG_MODEL", "resnet")])),
            Err(ConfigError::Model(_))
        ));
    }

    #[test]
    fn test_file_layer_and_env_precedence() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "bind = \"127.0.0.1:7000\"\ndb_path = \"/data/faces.txt\"\nmodel = \"Facenet512\"\n",
        )
        .unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = Config::from_lookup(lookup_from(&[
            ("FACEREG_CONFIG", path.as_str()),
            ("FACEREG_BIND", "127.0.0.1:7001"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 7001);
        assert_eq!(config.db_path, PathBuf::from("/data/faces.txt"));
        assert_eq!(config.model, ModelFamily::Facenet512);
    }

    #[test]
    fn test_file_unknown_key_rejected() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "colour = \"blue\"\n").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FACEREG_CONFIG", path.as_str())])),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("FACEREG_CONFIG", "/nonexistent/facereg.toml")])),
            Err(ConfigError::Read { .. })
        ));
    }
}
