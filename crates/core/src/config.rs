//! Layered runtime configuration: defaults, then an optional TOML file, then environment
//! variables, then explicit overrides. The merged result is validated once at the end.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_ACTIVE_LEADS_PER_EXECUTIVE: u32 = 120;
pub const DEFAULT_HIERARCHY_MAX_DEPTH: u32 = 16;
pub const DEFAULT_ANCESTOR_MAX_HOPS: u32 = 16;

/// File names probed, in order, when no explicit path is given.
pub const CONFIG_FILE_CANDIDATES: &[&str] = &["leadflow.toml", "config/leadflow.toml"];

/// Environment variables read for each setting. The first non-blank variable wins.
pub const ENV_KEYS: &[(&str, &[&str])] = &[
    ("database.url", &["LEADFLOW_DATABASE_URL"]),
    ("database.max_connections", &["LEADFLOW_DATABASE_MAX_CONNECTIONS"]),
    ("database.timeout_secs", &["LEADFLOW_DATABASE_TIMEOUT_SECS"]),
    (
        "assignment.max_active_leads_per_executive",
        // The bare name is what existing deployments export.
        &["LEADFLOW_ASSIGNMENT_MAX_ACTIVE_LEADS", "MAX_ACTIVE_LEADS_PER_EXECUTIVE"],
    ),
    ("assignment.hierarchy_max_depth", &["LEADFLOW_ASSIGNMENT_HIERARCHY_MAX_DEPTH"]),
    ("assignment.ancestor_max_hops", &["LEADFLOW_ASSIGNMENT_ANCESTOR_MAX_HOPS"]),
    ("logging.level", &["LEADFLOW_LOGGING_LEVEL", "LEADFLOW_LOG_LEVEL"]),
    ("logging.format", &["LEADFLOW_LOGGING_FORMAT", "LEADFLOW_LOG_FORMAT"]),
];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub assignment: AssignmentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Tunables injected into the assignment engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssignmentConfig {
    pub max_active_leads_per_executive: u32,
    pub hierarchy_max_depth: u32,
    pub ancestor_max_hops: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub max_active_leads_per_executive: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_active_leads_per_executive: DEFAULT_MAX_ACTIVE_LEADS_PER_EXECUTIVE,
            hierarchy_max_depth: DEFAULT_HIERARCHY_MAX_DEPTH,
            ancestor_max_hops: DEFAULT_ANCESTOR_MAX_HOPS,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://leadflow.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            assignment: AssignmentConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.merge_file(read_patch(&path)?),
            None if options.require_file => {
                let expected = options
                    .config_path
                    .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        for (setting, keys) in ENV_KEYS {
            if let Some((key, value)) = first_env(keys) {
                config.set_from_env(setting, key, &value)?;
            }
        }

        config.merge_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            self.database.merge(database);
        }
        if let Some(assignment) = patch.assignment {
            self.assignment.merge(assignment);
        }
        if let Some(logging) = patch.logging {
            self.logging.merge(logging);
        }
    }

    fn set_from_env(&mut self, setting: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        match setting {
            "database.url" => self.database.url = value.to_string(),
            "database.max_connections" => self.database.max_connections = parse_env(key, value)?,
            "database.timeout_secs" => self.database.timeout_secs = parse_env(key, value)?,
            "assignment.max_active_leads_per_executive" => {
                self.assignment.max_active_leads_per_executive = parse_env(key, value)?
            }
            "assignment.hierarchy_max_depth" => {
                self.assignment.hierarchy_max_depth = parse_env(key, value)?
            }
            "assignment.ancestor_max_hops" => {
                self.assignment.ancestor_max_hops = parse_env(key, value)?
            }
            "logging.level" => self.logging.level = value.to_string(),
            "logging.format" => self.logging.format = value.parse()?,
            _ => {}
        }
        Ok(())
    }

    fn merge_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(max_active) = overrides.max_active_leads_per_executive {
            self.assignment.max_active_leads_per_executive = max_active;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.assignment.validate()?;
        self.logging.validate()
    }
}

impl DatabaseConfig {
    fn merge(&mut self, patch: DatabasePatch) {
        if let Some(url) = patch.url {
            self.url = url;
        }
        if let Some(max_connections) = patch.max_connections {
            self.max_connections = max_connections;
        }
        if let Some(timeout_secs) = patch.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        if !(url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:") {
            return Err(invalid(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
            ));
        }
        if self.max_connections == 0 {
            return Err(invalid("database.max_connections must be greater than zero"));
        }
        if !(1..=300).contains(&self.timeout_secs) {
            return Err(invalid("database.timeout_secs must be in range 1..=300"));
        }
        Ok(())
    }
}

impl AssignmentConfig {
    fn merge(&mut self, patch: AssignmentPatch) {
        if let Some(max_active) = patch.max_active_leads_per_executive {
            self.max_active_leads_per_executive = max_active;
        }
        if let Some(depth) = patch.hierarchy_max_depth {
            self.hierarchy_max_depth = depth;
        }
        if let Some(hops) = patch.ancestor_max_hops {
            self.ancestor_max_hops = hops;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_active_leads_per_executive == 0 {
            return Err(invalid(
                "assignment.max_active_leads_per_executive must be greater than zero",
            ));
        }
        if !(1..=64).contains(&self.hierarchy_max_depth) {
            return Err(invalid("assignment.hierarchy_max_depth must be in range 1..=64"));
        }
        if !(1..=64).contains(&self.ancestor_max_hops) {
            return Err(invalid("assignment.ancestor_max_hops must be in range 1..=64"));
        }
        Ok(())
    }
}

impl LoggingConfig {
    fn merge(&mut self, patch: LoggingPatch) {
        if let Some(level) = patch.level {
            self.level = level;
        }
        if let Some(format) = patch.format {
            self.format = format;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(invalid("logging.level must be one of trace|debug|info|warn|error")),
        }
    }
}

/// The explicit path if it exists, otherwise the first existing default candidate.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

/// First variable among `keys` holding a non-blank value.
pub fn first_env<'k>(keys: &[&'k str]) -> Option<(&'k str, String)> {
    keys.iter().find_map(|key| {
        env::var(key).ok().filter(|value| !value.trim().is_empty()).map(|value| (*key, value))
    })
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${VAR}` with the variable's value.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after_open[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after_open[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Validation(message.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    assignment: Option<AssignmentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AssignmentPatch {
    max_active_leads_per_executive: Option<u32>,
    hierarchy_max_depth: Option<u32>,
    ancestor_max_hops: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    use tempfile::TempDir;

    use super::{
        interpolate_env_vars, AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat,
        ENV_KEYS,
    };

    /// Holds the process-wide env lock and clears every managed variable on entry and exit.
    struct EnvScope {
        _guard: MutexGuard<'static, ()>,
    }

    impl EnvScope {
        fn new(vars: &[(&str, &str)]) -> Self {
            static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
            let guard = ENV_LOCK
                .get_or_init(|| Mutex::new(()))
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            clear_managed();
            for (key, value) in vars {
                env::set_var(key, value);
            }
            Self { _guard: guard }
        }
    }

    impl Drop for EnvScope {
        fn drop(&mut self) {
            clear_managed();
        }
    }

    fn clear_managed() {
        for (_, keys) in ENV_KEYS {
            for key in *keys {
                env::remove_var(key);
            }
        }
        env::remove_var("TEST_LEADFLOW_DB");
    }

    fn write_file(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("leadflow.toml");
        fs::write(&path, body).expect("write config file");
        path
    }

    fn load_from(path: PathBuf) -> Result<AppConfig, ConfigError> {
        AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
    }

    #[test]
    fn defaults_match_documented_capacity() {
        let _env = EnvScope::new(&[]);

        let config = AppConfig::load(LoadOptions::default()).expect("defaults load");

        assert_eq!(config.assignment.max_active_leads_per_executive, 120);
        assert_eq!(config.assignment.hierarchy_max_depth, 16);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn file_values_support_env_interpolation() {
        let _env = EnvScope::new(&[("TEST_LEADFLOW_DB", "sqlite://interpolated.db")]);
        let dir = TempDir::new().expect("temp dir");
        let path = write_file(
            &dir,
            "[database]\nurl = \"${TEST_LEADFLOW_DB}\"\n\n[assignment]\nmax_active_leads_per_executive = 40\n",
        );

        let config = load_from(path).expect("file load");

        assert_eq!(config.database.url, "sqlite://interpolated.db");
        assert_eq!(config.assignment.max_active_leads_per_executive, 40);
    }

    #[test]
    fn legacy_capacity_variable_is_honoured() {
        let _env = EnvScope::new(&[("MAX_ACTIVE_LEADS_PER_EXECUTIVE", "75")]);

        let config = AppConfig::load(LoadOptions::default()).expect("load");

        assert_eq!(config.assignment.max_active_leads_per_executive, 75);
    }

    #[test]
    fn prefixed_capacity_variable_beats_legacy_alias() {
        let _env = EnvScope::new(&[
            ("LEADFLOW_ASSIGNMENT_MAX_ACTIVE_LEADS", "60"),
            ("MAX_ACTIVE_LEADS_PER_EXECUTIVE", "75"),
        ]);

        let config = AppConfig::load(LoadOptions::default()).expect("load");

        assert_eq!(config.assignment.max_active_leads_per_executive, 60);
    }

    #[test]
    fn precedence_is_defaults_file_env_overrides() {
        let _env = EnvScope::new(&[
            ("LEADFLOW_DATABASE_URL", "sqlite://from-env.db"),
            ("LEADFLOW_ASSIGNMENT_MAX_ACTIVE_LEADS", "90"),
        ]);
        let dir = TempDir::new().expect("temp dir");
        let path = write_file(
            &dir,
            "[database]\nurl = \"sqlite://from-file.db\"\n\n[assignment]\nmax_active_leads_per_executive = 30\nancestor_max_hops = 8\n\n[logging]\nlevel = \"warn\"\n",
        );

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            overrides: ConfigOverrides {
                database_url: Some("sqlite://from-override.db".to_string()),
                log_level: Some("debug".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("layered load");

        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.assignment.max_active_leads_per_executive, 90);
        assert_eq!(config.assignment.ancestor_max_hops, 8);
    }

    #[test]
    fn required_file_must_exist() {
        let _env = EnvScope::new(&[]);
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("absent.toml");

        let error = AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("missing file");

        assert!(matches!(error, ConfigError::MissingConfigFile(path) if path == missing));
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let _env = EnvScope::new(&[]);

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                max_active_leads_per_executive: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect_err("zero capacity");

        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("max_active_leads_per_executive")
        ));
    }

    #[test]
    fn malformed_capacity_env_is_rejected() {
        let _env = EnvScope::new(&[("LEADFLOW_ASSIGNMENT_MAX_ACTIVE_LEADS", "lots")]);

        let error = AppConfig::load(LoadOptions::default()).expect_err("bad override");

        assert!(matches!(
            error,
            ConfigError::InvalidEnvOverride { ref key, .. } if key == "LEADFLOW_ASSIGNMENT_MAX_ACTIVE_LEADS"
        ));
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!(" JSON ".parse::<LogFormat>().expect("json"), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn interpolation_reports_unterminated_expression() {
        assert!(matches!(
            interpolate_env_vars("url = \"${NEVER_CLOSED\""),
            Err(ConfigError::UnterminatedInterpolation)
        ));
        assert_eq!(interpolate_env_vars("plain $ text").expect("no vars"), "plain $ text");
    }
}
