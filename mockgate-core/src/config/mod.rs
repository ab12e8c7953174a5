//! Configuration: file schema, loading and resolved settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod settings;

pub use error::ConfigError;
pub use loader::{ConfigSource, DEFAULT_CONFIG_PATH, load_config, substitute_env_vars};
pub use schema::FileConfig;
pub use settings::{Mode, Overrides, Settings};
