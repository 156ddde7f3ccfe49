use std::{env, path::PathBuf};

use log::info;

use crate::error::ConfigError;

const STORE_PATH: &str = "GREETING_STORE_PATH";
const DIALOGUE_DB: &str = "GREETING_DIALOGUE_DB";
const QUESTIONS_PATH: &str = "GREETING_QUESTIONS_PATH";
const ALLOW_RESET: &str = "GREETING_ALLOW_RESET";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `None` keeps everything in memory.
    pub store_path: Option<PathBuf>,
    pub dialogue_db: String,
    /// `None` uses the built-in birthday questions.
    pub questions_path: Option<PathBuf>,
    pub allow_reset: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let load = |key: &str, default: &str| {
            lookup(key).unwrap_or_else(|| {
                info!("{key} not set, using default: {default:?}");
                default.to_string()
            })
        };

        let store_path = load(STORE_PATH, "greeting_store.json");
        let questions_path = load(QUESTIONS_PATH, "");

        Ok(Self {
            store_path: non_empty(store_path).map(PathBuf::from),
            dialogue_db: load(DIALOGUE_DB, "db.sqlite"),
            questions_path: non_empty(questions_path).map(PathBuf::from),
            allow_reset: parse_bool(ALLOW_RESET, &load(ALLOW_RESET, "false"))?,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.store_path, Some(PathBuf::from("greeting_store.json")));
        assert_eq!(config.dialogue_db, "db.sqlite");
        assert_eq!(config.questions_path, None);
        assert!(!config.allow_reset);
    }

    #[test]
    fn empty_store_path_means_memory_only() {
        let config = config(&[(STORE_PATH, " "), (QUESTIONS_PATH, "bank.json")]).unwrap();
        assert_eq!(config.store_path, None);
        assert_eq!(config.questions_path, Some(PathBuf::from("bank.json")));
    }

    #[test]
    fn reset_flag_must_be_a_boolean() {
        assert!(config(&[(ALLOW_RESET, "TRUE")]).unwrap().allow_reset);
        assert!(matches!(
            config(&[(ALLOW_RESET, "sometimes")]),
            Err(ConfigError::Invalid { key: ALLOW_RESET, .. })
        ));
    }
}
