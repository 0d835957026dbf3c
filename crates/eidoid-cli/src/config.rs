//! Configuration Vault – reads/writes `~/.eidoid/config.toml`.

use eidoid_memory::EngineConfig;
use eidoid_memory::engine::DEFAULT_CONTEXT_CHARS;
use eidoid_memory::ranker::DEFAULT_TOP_K;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted operator configuration stored in `~/.eidoid/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the `personas/` partition files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Character budget of the `/context` preview.
    #[serde(default = "default_context_chars")]
    pub context_max_chars: usize,

    /// Result count of `/recall` when none is given.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Per-persona limits handed to the memory engine.
    #[serde(default)]
    pub memory: EngineConfig,
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn default_data_dir() -> PathBuf {
    data_dir_for_home(&home_dir())
}
fn default_context_chars() -> usize {
    DEFAULT_CONTEXT_CHARS
}
fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            context_max_chars: default_context_chars(),
            default_top_k: default_top_k(),
            memory: EngineConfig::default(),
        }
    }
}

/// Return the path to `~/.eidoid/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".eidoid").join("config.toml")
}

pub(crate) fn data_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".eidoid").join("data")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `EIDOID_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `EIDOID_DATA_DIR` | `data_dir` |
/// | `EIDOID_MAX_ITEMS` | `memory.max_items_per_persona` |
/// | `EIDOID_MAX_TOKENS` | `memory.max_tokens_per_persona` |
/// | `EIDOID_CONTEXT_CHARS` | `context_max_chars` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("EIDOID_DATA_DIR")
        && !v.trim().is_empty()
    {
        cfg.data_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("EIDOID_MAX_ITEMS")
        && let Ok(n) = v.trim().parse::<u64>()
    {
        cfg.memory.max_items_per_persona = n;
    }
    if let Ok(v) = std::env::var("EIDOID_MAX_TOKENS")
        && let Ok(n) = v.trim().parse::<u64>()
    {
        cfg.memory.max_tokens_per_persona = n;
    }
    if let Ok(v) = std::env::var("EIDOID_CONTEXT_CHARS")
        && let Ok(n) = v.trim().parse::<usize>()
    {
        cfg.context_max_chars = n;
    }
}

/// Save the config to disk, creating `~/.eidoid/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Memories are personal data: owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests that read or write `EIDOID_*` variables hold this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_custom_config() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.data_dir = dir.path().join("memories");
        cfg.memory.max_items_per_persona = 50;
        cfg.default_top_k = 3;
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.data_dir, cfg.data_dir);
        assert_eq!(loaded.memory.max_items_per_persona, 50);
        assert_eq!(loaded.memory.max_tokens_per_persona, 200_000);
        assert_eq!(loaded.default_top_k, 3);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: Config = toml::from_str("context_max_chars = 600\n[memory]\nmax_traits = 4\n")
            .expect("parse");
        assert_eq!(cfg.context_max_chars, 600);
        assert_eq!(cfg.default_top_k, DEFAULT_TOP_K);
        assert_eq!(cfg.memory.max_traits, 4);
        assert_eq!(cfg.memory.max_items_per_persona, 2000);
    }

    #[test]
    fn config_path_points_to_eidoid_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.eidoid/config.toml"));
        assert_eq!(
            data_dir_for_home("/home/testuser"),
            PathBuf::from("/home/testuser/.eidoid/data")
        );
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_top_k = \"many\"").expect("write");
        assert!(load_from(&path).unwrap_err().contains("Failed to parse config"));
    }

    #[test]
    fn apply_env_overrides_changes_data_dir() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("EIDOID_DATA_DIR", "/srv/eidoid") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.data_dir, PathBuf::from("/srv/eidoid"));
        unsafe { std::env::remove_var("EIDOID_DATA_DIR") };
    }

    #[test]
    fn apply_env_overrides_changes_quota() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe {
            std::env::set_var("EIDOID_MAX_ITEMS", "10");
            std::env::set_var("EIDOID_MAX_TOKENS", "500");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.memory.max_items_per_persona, 10);
        assert_eq!(cfg.memory.max_tokens_per_persona, 500);
        unsafe {
            std::env::remove_var("EIDOID_MAX_ITEMS");
            std::env::remove_var("EIDOID_MAX_TOKENS");
        }
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_numbers() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("EIDOID_CONTEXT_CHARS", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.context_max_chars, DEFAULT_CONTEXT_CHARS);
        unsafe { std::env::remove_var("EIDOID_CONTEXT_CHARS") };
    }
}
