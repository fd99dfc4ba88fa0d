//! Engine configuration: welcome content and contract strictness.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::EngineError;
use crate::state::{CustomPrompt, WelcomeContent};

pub const CONFIG_PATH_ENV_VAR: &str = "CONVERSATION_ENGINE_CONFIG_PATH";
pub const DEFAULT_INTRO: &str =
    "Ask a question about your project. Answers stream in as they are produced.";

/// Runtime configuration for a conversation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Introductory data shown in `Welcome`, regenerated on every clear.
    pub welcome: WelcomeContent,
    /// Panic on caller contract violations instead of logging and ignoring them.
    pub strict_contracts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            welcome: WelcomeContent {
                intro: DEFAULT_INTRO.to_string(),
                custom_prompts: Vec::new(),
            },
            strict_contracts: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineConfigFile {
    #[serde(default)]
    intro: Option<String>,
    #[serde(default)]
    custom_prompts: Vec<CustomPrompt>,
    #[serde(default)]
    strict_contracts: Option<bool>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intro(mut self, intro: impl Into<String>) -> Self {
        self.welcome.intro = sanitize_intro(Some(intro.into()));
        self
    }

    pub fn with_custom_prompts(mut self, prompts: Vec<CustomPrompt>) -> Self {
        self.welcome.custom_prompts = sanitize_custom_prompts(prompts);
        self
    }

    pub fn with_strict_contracts(mut self, strict: bool) -> Self {
        self.strict_contracts = strict;
        self
    }

    /// Loads the file named by `CONVERSATION_ENGINE_CONFIG_PATH`, or defaults when unset.
    pub fn from_env() -> Result<Self, EngineError> {
        let Some(raw) = std::env::var_os(CONFIG_PATH_ENV_VAR) else {
            return Ok(Self::default());
        };

        let path = PathBuf::from(raw);
        if path.as_os_str().is_empty() {
            return Err(EngineError::EmptyConfigPath {
                var: CONFIG_PATH_ENV_VAR,
            });
        }

        Self::from_file(&path)
    }

    /// Reads a UTF-8 JSON config file; unknown fields are rejected.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| EngineError::io("reading engine config", path, source))?;
        let file: EngineConfigFile = serde_json::from_str(&contents)
            .map_err(|source| EngineError::config_parse(path, source))?;

        let mut config = Self::default().with_custom_prompts(file.custom_prompts);
        config.welcome.intro = sanitize_intro(file.intro);
        if let Some(strict) = file.strict_contracts {
            config.strict_contracts = strict;
        }

        Ok(config)
    }
}

fn sanitize_intro(raw: Option<String>) -> String {
    let Some(value) = raw else {
        return DEFAULT_INTRO.to_string();
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        DEFAULT_INTRO.to_string()
    } else {
        trimmed.to_string()
    }
}

fn sanitize_custom_prompts(prompts: Vec<CustomPrompt>) -> Vec<CustomPrompt> {
    prompts
        .into_iter()
        .map(|prompt| CustomPrompt {
            name: prompt.name.trim().to_string(),
            prompt: prompt.prompt.trim().to_string(),
        })
        .filter(|prompt| !prompt.name.is_empty() && !prompt.prompt.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;

    struct EnvVarGuard {
        previous: Option<std::ffi::OsString>,
    }

    impl EnvVarGuard {
        fn set(value: Option<&str>) -> Self {
            let previous = std::env::var_os(CONFIG_PATH_ENV_VAR);
            match value {
                Some(value) => std::env::set_var(CONFIG_PATH_ENV_VAR, value),
                None => std::env::remove_var(CONFIG_PATH_ENV_VAR),
            }

            Self { previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => std::env::set_var(CONFIG_PATH_ENV_VAR, value),
                None => std::env::remove_var(CONFIG_PATH_ENV_VAR),
            }
        }
    }

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn config_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file should be created");
        file.write_all(contents.as_bytes())
            .expect("config should be written");
        file
    }

    #[test]
    fn from_env_defaults_when_unset() {
        let _env_serialization = lock_unpoisoned(env_lock());
        let _guard = EnvVarGuard::set(None);

        let config = EngineConfig::from_env().expect("unset path should fall back to defaults");

        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.welcome.intro, DEFAULT_INTRO);
    }

    #[test]
    fn from_env_rejects_empty_path() {
        let _env_serialization = lock_unpoisoned(env_lock());
        let _guard = EnvVarGuard::set(Some(""));

        assert_matches!(
            EngineConfig::from_env(),
            Err(EngineError::EmptyConfigPath { .. })
        );
    }

    #[test]
    fn from_env_reads_file_and_sanitizes_prompts() {
        let file = config_file(
            r#"{
                "intro": "  Hello  ",
                "custom_prompts": [
                    { "name": " explain ", "prompt": "Explain this code" },
                    { "name": "", "prompt": "dropped" },
                    { "name": "blank", "prompt": "   " }
                ],
                "strict_contracts": false
            }"#,
        );
        let path = file.path().to_string_lossy().to_string();
        let _env_serialization = lock_unpoisoned(env_lock());
        let _guard = EnvVarGuard::set(Some(&path));

        let config = EngineConfig::from_env().expect("config file should load");

        assert_eq!(config.welcome.intro, "Hello");
        assert_eq!(
            config.welcome.custom_prompts,
            vec![CustomPrompt {
                name: "explain".to_string(),
                prompt: "Explain this code".to_string(),
            }]
        );
        assert!(!config.strict_contracts);
    }

    #[test]
    fn from_file_rejects_unknown_fields() {
        let file = config_file(r#"{ "intro": "hi", "theme": "dark" }"#);

        let error = EngineConfig::from_file(file.path()).expect_err("unknown field must fail");

        assert_matches!(&error, EngineError::ConfigParse { .. });
        assert!(error.to_string().contains("failed to parse engine config JSON"));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let missing = dir.path().join("absent.json");

        assert_matches!(
            EngineConfig::from_file(&missing),
            Err(EngineError::Io { operation: "reading engine config", .. })
        );
    }

    #[test]
    fn blank_intro_falls_back_to_default() {
        let config = EngineConfig::new().with_intro("   ");

        assert_eq!(config.welcome.intro, DEFAULT_INTRO);
    }
}
