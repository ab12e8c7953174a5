//! Command line flags.
//!
//! Every flag mirrors an environment variable of the same (camelCase) name.
//! A flag given on the command line wins over the environment, which wins
//! over the config file.

use std::path::PathBuf;

use clap::Parser;
use clap::builder::BoolishValueParser;
use mockgate_core::config::Overrides;

#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "mockgate", author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ./.mock-server.yaml)
    #[arg(long, alias = "configPath")]
    pub config_path: Option<PathBuf>,

    /// Port to listen on (default: 3000)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Primary fixture directory (default: ./mock)
    #[arg(long, alias = "mockPath")]
    pub mock_path: Option<String>,

    /// Upstream base URL; switches to proxy mode
    #[arg(long)]
    pub listen: Option<String>,

    /// Also serve captured fixtures (mock mode) or replay them when the
    /// upstream is down (proxy mode)
    #[arg(
        long,
        alias = "useTempMock",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub use_temp_mock: Option<bool>,
}

impl Cli {
    /// Layer the flags over the given environment overrides.
    pub fn merge(self, env: Overrides) -> Overrides {
        Overrides {
            config_path: self.config_path.or(env.config_path),
            port: self.port.or(env.port),
            mock_path: self.mock_path.or(env.mock_path),
            listen: self.listen.or(env.listen),
            use_temp_mock: self.use_temp_mock.or(env.use_temp_mock),
        }
    }

    /// Flags merged over `Overrides::from_env()`.
    pub fn into_overrides(self) -> Overrides {
        self.merge(Overrides::from_env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_flags() {
        let cli = Cli::try_parse_from([
            "mockgate",
            "--config-path",
            "cfg.yaml",
            "--port",
            "4000",
            "--mock-path",
            "fixtures",
            "--listen",
            "http://localhost:8080",
            "--use-temp-mock",
        ])
        .unwrap();

        assert_eq!(cli.config_path, Some(PathBuf::from("cfg.yaml")));
        assert_eq!(cli.port, Some(4000));
        assert_eq!(cli.mock_path.as_deref(), Some("fixtures"));
        assert_eq!(cli.listen.as_deref(), Some("http://localhost:8080"));
        assert_eq!(cli.use_temp_mock, Some(true));
    }

    #[test]
    fn test_camel_case_aliases_and_boolish_values() {
        let cli = Cli::try_parse_from([
            "mockgate",
            "--mockPath",
            "m",
            "--useTempMock",
            "no",
        ])
        .unwrap();
        assert_eq!(cli.mock_path.as_deref(), Some("m"));
        assert_eq!(cli.use_temp_mock, Some(false));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Cli::try_parse_from(["mockgate", "--port", "http"]).is_err());
    }

    #[test]
    fn test_flags_win_over_environment() {
        let env = Overrides {
            port: Some(1111),
            mock_path: Some("from-env".into()),
            use_temp_mock: Some(true),
            ..Default::default()
        };
        let cli = Cli {
            port: Some(2222),
            ..Default::default()
        };

        let merged = cli.merge(env);
        assert_eq!(merged.port, Some(2222));
        assert_eq!(merged.mock_path.as_deref(), Some("from-env"));
        assert_eq!(merged.use_temp_mock, Some(true));
        assert_eq!(merged.listen, None);
    }
}
