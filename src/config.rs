use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::client::DEFAULT_API_PORT;

/// Process-level settings for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub agent_id: String,
    pub experiment_id: Uuid,
    pub api_port: u16,
    pub layout_path: Option<PathBuf>,
    /// Directory for file-backed state documents. State is kept in memory when unset.
    pub state_dir: Option<PathBuf>,
    pub fail_fast: bool,
    pub log_to_file: bool,
    pub seed: Option<u64>,
    pub exit_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            experiment_id: Uuid::new_v4(),
            api_port: DEFAULT_API_PORT,
            layout_path: None,
            state_dir: None,
            fail_fast: false,
            log_to_file: false,
            seed: None,
            exit_wait: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(agent_id) = var("TANDEM_AGENT_ID") {
            config.agent_id = agent_id;
        }
        if let Some(id) = var("TANDEM_EXPERIMENT_ID") {
            config.experiment_id = parse("TANDEM_EXPERIMENT_ID", &id)?;
        }
        if let Some(port) = var("TANDEM_API_PORT") {
            config.api_port = parse("TANDEM_API_PORT", &port)?;
        }
        config.layout_path = var("TANDEM_LAYOUT").map(PathBuf::from);
        config.state_dir = var("TANDEM_STATE_DIR").map(PathBuf::from);
        if let Some(flag) = var("TANDEM_FAIL_FAST") {
            config.fail_fast = parse("TANDEM_FAIL_FAST", &flag.to_lowercase())?;
        }
        if let Some(flag) = var("TANDEM_LOG_TO_FILE") {
            config.log_to_file = parse("TANDEM_LOG_TO_FILE", &flag.to_lowercase())?;
        }
        if let Some(seed) = var("TANDEM_SEED") {
            config.seed = Some(parse("TANDEM_SEED", &seed)?);
        }
        if let Some(secs) = var("TANDEM_EXIT_WAIT_SECS") {
            config.exit_wait = Duration::from_secs(parse("TANDEM_EXIT_WAIT_SECS", &secs)?);
        }

        Ok(config)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid value '{}' for {}", value, key))
}

fn default_agent_id() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_port, 4500);
        assert!(!config.fail_fast);
        assert!(!config.log_to_file);
        assert_eq!(config.seed, None);
        assert_eq!(config.layout_path, None);
        assert_eq!(config.exit_wait, Duration::from_secs(30));
        assert!(!config.agent_id.is_empty());
    }

    #[test]
    fn test_values_from_environment() {
        let experiment = Uuid::new_v4();
        let config = Config::from_lookup(lookup(&[
            ("TANDEM_AGENT_ID", "client-01"),
            ("TANDEM_EXPERIMENT_ID", experiment.to_string().as_str()),
            ("TANDEM_API_PORT", "4501"),
            ("TANDEM_LAYOUT", "/etc/tandem/layout.json"),
            ("TANDEM_FAIL_FAST", "True"),
            ("TANDEM_SEED", "42"),
            ("TANDEM_EXIT_WAIT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.agent_id, "client-01");
        assert_eq!(config.experiment_id, experiment);
        assert_eq!(config.api_port, 4501);
        assert_eq!(config.layout_path, Some(PathBuf::from("/etc/tandem/layout.json")));
        assert!(config.fail_fast);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.exit_wait, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = Config::from_lookup(lookup(&[("TANDEM_API_PORT", "  ")])).unwrap();
        assert_eq!(config.api_port, 4500);
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = Config::from_lookup(lookup(&[("TANDEM_API_PORT", "not-a-port")])).unwrap_err();
        assert!(err.to_string().contains("TANDEM_API_PORT"));
    }
}
