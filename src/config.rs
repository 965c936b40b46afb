//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "point-timer")]
#[command(about = "A local-first work timer that logs sessions as point entries")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory holding the persisted timer and point entries
    #[arg(short, long, default_value = ".point-timer")]
    pub data_dir: PathBuf,

    /// Sessions are stopped automatically after this many hours (1 to 8760)
    #[arg(short, long, default_value = "12", value_parser = clap::value_parser!(u64).range(1..=8760))]
    pub max_hours: u64,

    /// Known project ID (repeatable)
    #[arg(long = "project")]
    pub projects: Vec<String>,

    /// How often to check the data directory for changes made by other processes
    #[arg(long, default_value = "1000")]
    pub watch_interval_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_hours * 60 * 60)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::Config;

    #[test]
    fn defaults_match_a_twelve_hour_ceiling() {
        let config = Config::try_parse_from(["point-timer"]).unwrap();
        assert_eq!(config.max_duration(), Duration::from_secs(12 * 3600));
        assert_eq!(config.address(), "127.0.0.1:20554");
        assert_eq!(config.log_level(), "info");
        assert!(config.projects.is_empty());
    }

    #[test]
    fn projects_can_be_repeated() {
        let config = Config::try_parse_from([
            "point-timer",
            "--project",
            "acme",
            "--project",
            "okr-q3",
            "-v",
            "--max-hours",
            "8",
        ])
        .unwrap();
        assert_eq!(config.projects, vec!["acme", "okr-q3"]);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.max_duration(), Duration::from_secs(8 * 3600));
    }

    #[test]
    fn max_hours_outside_one_to_a_year_is_rejected() {
        for hours in ["0", "8761", "18446744073709551615"] {
            assert!(
                Config::try_parse_from(["point-timer", "--max-hours", hours]).is_err(),
                "accepted {} hours",
                hours
            );
        }
        let config = Config::try_parse_from(["point-timer", "--max-hours", "8760"]).unwrap();
        assert_eq!(config.max_duration(), Duration::from_secs(8760 * 3600));
    }
}
