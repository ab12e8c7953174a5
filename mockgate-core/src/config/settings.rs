//! Resolved runtime settings.
//!
//! [`Settings`] is built once at startup and passed by reference (or cloned)
//! into every component constructor. Precedence, highest first:
//!
//! 1. CLI flags / environment variables ([`Overrides`])
//! 2. Config file ([`FileConfig`])
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::ConfigError;
use super::loader::{ConfigSource, load_config};
use super::schema::FileConfig;
use crate::fixture::LayerKind;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DEV_HOST: &str = "127.0.0.1";
pub const DEFAULT_MOCK_PATH: &str = "mock";
pub const DEFAULT_CAPTURE_DIR: &str = "_captures";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024; // 10 MB

/// Operating mode, derived from `listen`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Serve fixtures only.
    Mock,
    /// Forward to the upstream and capture its responses.
    Listen { upstream: String },
}

/// Values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub mock_path: Option<String>,
    pub listen: Option<String>,
    pub use_temp_mock: Option<bool>,
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl Overrides {
    /// Read `configPath`, `port`, `mockPath`, `listen` and `useTempMock` from
    /// the process environment. Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let port = var("port").and_then(|raw| match raw.parse() {
            Ok(port) => Some(port),
            Err(_) => {
                warn!(value = %raw, "Ignoring invalid port environment variable");
                None
            }
        });
        let use_temp_mock = var("useTempMock").and_then(|raw| {
            let parsed = parse_bool(&raw);
            if parsed.is_none() {
                warn!(value = %raw, "Ignoring invalid useTempMock environment variable");
            }
            parsed
        });

        Self {
            config_path: var("configPath").map(PathBuf::from),
            port,
            mock_path: var("mockPath"),
            listen: var("listen"),
            use_temp_mock,
        }
    }
}

/// Immutable runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: u16,
    pub dev_host: String,
    /// Primary fixture directory.
    pub mock_path: PathBuf,
    /// Upstream base URL; `Some` means proxy mode.
    pub listen: Option<String>,
    /// Extra headers for forwarded requests, in name order.
    pub headers: BTreeMap<String, String>,
    pub use_temp_mock: bool,
    /// Fallback (capture) directory, relative to `mock_path` unless absolute.
    pub capture_dir: PathBuf,
    pub upstream_timeout: Duration,
    pub max_body_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            dev_host: DEFAULT_DEV_HOST.to_string(),
            mock_path: PathBuf::from(DEFAULT_MOCK_PATH),
            listen: None,
            headers: BTreeMap::new(),
            use_temp_mock: false,
            capture_dir: PathBuf::from(DEFAULT_CAPTURE_DIR),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Accept absolute `http`/`https` URLs only.
pub fn validate_listen_url(raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidListenUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(ConfigError::InvalidListenUrl {
            url: raw.to_string(),
            message: format!("unsupported scheme '{other}'"),
        }),
    }
}

impl Settings {
    /// Load the config file (if any) and apply overrides.
    ///
    /// Never fails. A missing default file is skipped silently; a missing
    /// explicit file or an unreadable file logs a warning and uses defaults.
    pub fn load(overrides: &Overrides) -> Self {
        let source = ConfigSource::from_override(overrides.config_path.as_deref());
        let path = source.path().display().to_string();

        let file = match load_config(source.path()) {
            Ok(file) => {
                info!(path = %path, "Loaded config file");
                file
            }
            Err(ConfigError::ConfigFileNotFound { .. })
                if matches!(source, ConfigSource::Default(_)) =>
            {
                debug!(path = %path, "No config file, using defaults");
                FileConfig::default()
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to load config file, using defaults");
                FileConfig::default()
            }
        };

        Self::resolve(file, overrides)
    }

    /// Merge file values and overrides over the defaults.
    pub fn resolve(file: FileConfig, overrides: &Overrides) -> Self {
        let defaults = Self::default();

        let listen = overrides
            .listen
            .clone()
            .or(file.listen)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| match validate_listen_url(&raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(error = %e, "Ignoring listen URL, running in mock mode");
                    None
                }
            });

        Self {
            port: overrides.port.or(file.port).unwrap_or(defaults.port),
            dev_host: file.dev_host.unwrap_or(defaults.dev_host),
            mock_path: overrides
                .mock_path
                .clone()
                .or(file.mock_path)
                .map(PathBuf::from)
                .unwrap_or(defaults.mock_path),
            listen,
            headers: file.headers,
            use_temp_mock: overrides
                .use_temp_mock
                .or(file.use_temp_mock)
                .unwrap_or(defaults.use_temp_mock),
            capture_dir: file
                .capture_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.capture_dir),
            upstream_timeout: file
                .upstream_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            max_body_size: file.max_body_size.unwrap_or(defaults.max_body_size),
        }
    }

    pub fn mode(&self) -> Mode {
        match &self.listen {
            Some(upstream) => Mode::Listen {
                upstream: upstream.clone(),
            },
            None => Mode::Mock,
        }
    }

    pub fn is_proxy(&self) -> bool {
        self.listen.is_some()
    }

    pub fn primary_dir(&self) -> &Path {
        &self.mock_path
    }

    pub fn fallback_dir(&self) -> PathBuf {
        self.mock_path.join(&self.capture_dir)
    }

    /// `host:port` to bind the listener to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.dev_host, self.port)
    }

    /// Layers consulted in mock mode: primary, then fallback when
    /// `use_temp_mock` is set.
    pub fn resolution_order(&self) -> Vec<LayerKind> {
        if self.use_temp_mock {
            vec![LayerKind::Primary, LayerKind::Fallback]
        } else {
            vec![LayerKind::Primary]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_NAMES: [&str; 5] = ["configPath", "port", "mockPath", "listen", "useTempMock"];

    struct EnvVarGuard {
        vars: Vec<(&'static str, Option<String>)>,
    }

    impl EnvVarGuard {
        fn new(var_names: &[&'static str]) -> Self {
            let vars = var_names
                .iter()
                .map(|&name| (name, std::env::var(name).ok()))
                .collect();
            for name in var_names {
                // SAFETY: We're in a single-threaded test context (enforced by #[serial])
                unsafe { std::env::remove_var(name) };
            }
            Self { vars }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            for (name, original) in &self.vars {
                // SAFETY: We're in a single-threaded test context (enforced by #[serial])
                unsafe {
                    match original {
                        Some(val) => std::env::set_var(name, val),
                        None => std::env::remove_var(name),
                    }
                }
            }
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(FileConfig::default(), &Overrides::default());
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.bind_addr(), "127.0.0.1:3000");
        assert_eq!(settings.mode(), Mode::Mock);
        assert_eq!(settings.fallback_dir(), PathBuf::from("mock/_captures"));
        assert_eq!(settings.resolution_order(), vec![LayerKind::Primary]);
    }

    #[test]
    fn test_overrides_beat_file() {
        let file = FileConfig {
            port: Some(4000),
            mock_path: Some("file-mocks".into()),
            listen: Some("http://file:1".into()),
            use_temp_mock: Some(false),
            dev_host: Some("0.0.0.0".into()),
            ..Default::default()
        };
        let overrides = Overrides {
            port: Some(5000),
            listen: Some("http://cli:2".into()),
            use_temp_mock: Some(true),
            ..Default::default()
        };

        let settings = Settings::resolve(file, &overrides);

        assert_eq!(settings.port, 5000);
        assert_eq!(settings.mock_path, PathBuf::from("file-mocks"));
        assert_eq!(settings.dev_host, "0.0.0.0");
        assert_eq!(
            settings.mode(),
            Mode::Listen {
                upstream: "http://cli:2".into()
            }
        );
        assert_eq!(
            settings.resolution_order(),
            vec![LayerKind::Primary, LayerKind::Fallback]
        );
    }

    #[test]
    fn test_invalid_listen_falls_back_to_mock_mode() {
        for raw in ["not a url", "ftp://host/", "   "] {
            let overrides = Overrides {
                listen: Some(raw.into()),
                ..Default::default()
            };
            let settings = Settings::resolve(FileConfig::default(), &overrides);
            assert_eq!(settings.mode(), Mode::Mock, "{raw}");
        }
    }

    #[test]
    fn test_absolute_capture_dir() {
        let file = FileConfig {
            capture_dir: Some("/tmp/captures".into()),
            ..Default::default()
        };
        let settings = Settings::resolve(file, &Overrides::default());
        assert_eq!(settings.fallback_dir(), PathBuf::from("/tmp/captures"));
    }

    #[test]
    #[serial]
    fn test_overrides_from_env() {
        let _guard = EnvVarGuard::new(&ENV_NAMES);
        // SAFETY: serialized by #[serial]
        unsafe {
            std::env::set_var("port", "8081");
            std::env::set_var("mockPath", "/srv/mocks");
            std::env::set_var("listen", "https://api.example.com");
            std::env::set_var("useTempMock", "true");
        }

        let overrides = Overrides::from_env();
        assert_eq!(overrides.port, Some(8081));
        assert_eq!(overrides.mock_path.as_deref(), Some("/srv/mocks"));
        assert_eq!(overrides.listen.as_deref(), Some("https://api.example.com"));
        assert_eq!(overrides.use_temp_mock, Some(true));
        assert_eq!(overrides.config_path, None);
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_ignored() {
        let _guard = EnvVarGuard::new(&ENV_NAMES);
        // SAFETY: serialized by #[serial]
        unsafe {
            std::env::set_var("port", "eighty");
            std::env::set_var("useTempMock", "maybe");
        }
        let overrides = Overrides::from_env();
        assert_eq!(overrides.port, None);
        assert_eq!(overrides.use_temp_mock, None);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: 7000\nmockPath: fx\nuseTempMock: true").unwrap();
        let overrides = Overrides {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let settings = Settings::load(&overrides);
        assert_eq!(settings.port, 7000);
        assert_eq!(settings.mock_path, PathBuf::from("fx"));
        assert!(settings.use_temp_mock);
    }

    #[test]
    fn test_load_missing_or_broken_file_uses_defaults() {
        let missing = Overrides {
            config_path: Some(PathBuf::from("/no/such/mock-server.yaml")),
            ..Default::default()
        };
        assert_eq!(Settings::load(&missing), Settings::default());

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        writeln!(broken, "port: [1, 2").unwrap();
        let overrides = Overrides {
            config_path: Some(broken.path().to_path_buf()),
            port: Some(9999),
            ..Default::default()
        };
        let settings = Settings::load(&overrides);
        assert_eq!(settings.port, 9999);
        assert_eq!(settings.mock_path, PathBuf::from(DEFAULT_MOCK_PATH));
    }
}
