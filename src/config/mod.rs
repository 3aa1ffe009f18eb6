pub mod generate;
pub mod parse;
pub mod types;

use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use parse::{load_config, parse_config, ConfigError};
pub use types::{Config, DispatcherConfig, OrdererConfig, SequenceConfig};

/// Per-user config location, relative to the home directory.
pub const USER_CONFIG_PATH: &str = ".config/txorder/config.yml";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/txorder/config.yml";

/// `$env{NAME}` references; group 1 is the variable name.
fn env_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern is valid")
    })
}

/// Substitute `$env{NAME}` with the variable's value. References to unset
/// variables stay in place so `unset_env_vars` can report them.
pub fn expand_env_vars(text: &str) -> String {
    env_reference()
        .replace_all(text, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_owned())
        })
        .into_owned()
}

/// Names of the `$env{}` references left in `text`, sorted and deduplicated.
pub fn unset_env_vars(text: &str) -> Vec<String> {
    let mut names: Vec<String> = env_reference()
        .captures_iter(text)
        .map(|caps| caps[1].to_owned())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Replace a leading `~` component with the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let (Ok(rest), Some(home)) = (path.strip_prefix("~"), dirs::home_dir()) else {
        return path.to_path_buf();
    };
    if rest.as_os_str().is_empty() {
        home
    } else {
        home.join(rest)
    }
}

/// Config locations searched when `--config` is absent, in priority order.
pub fn default_config_paths() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(USER_CONFIG_PATH))
        .into_iter()
        .chain([PathBuf::from(SYSTEM_CONFIG_PATH)])
        .collect()
}

/// An explicit path wins (with `~` expanded); otherwise the first default
/// location that exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(expand_tilde(path)),
        None => default_config_paths().into_iter().find(|path| path.exists()),
    }
}
