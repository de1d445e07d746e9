use crate::dialogue::WeatherKind;
use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) fps_cap: u32,
    pub(crate) enable_color: bool,
    pub(crate) action_cooldown_ms: u64,
    pub(crate) dialogue_timeout_ms: u64,
    /// Defaults to `dialogues.json` in the data directory.
    pub(crate) dialogues_path: Option<PathBuf>,
    /// There is no weather lookup; this is what the dialogue picker sees.
    pub(crate) weather: WeatherKind,
    /// Used when `RUST_LOG` is not set.
    pub(crate) log_filter: String,
    /// 0 seeds from entropy.
    pub(crate) rng_seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fps_cap: 30,
            enable_color: true,
            action_cooldown_ms: 300,
            dialogue_timeout_ms: 2_000,
            dialogues_path: None,
            weather: WeatherKind::Unknown,
            log_filter: "info".to_string(),
            rng_seed: 0,
        }
    }
}

pub(crate) struct Paths {
    pub(crate) data_dir: PathBuf,
    pub(crate) settings_path: PathBuf,
    pub(crate) log_path: PathBuf,
    pub(crate) default_dialogues_path: PathBuf,
}

impl Paths {
    pub(crate) fn in_dir(dir: &Path) -> Self {
        Self {
            data_dir: dir.to_path_buf(),
            settings_path: dir.join("settings.json"),
            log_path: dir.join("xiaoyin-pet.log"),
            default_dialogues_path: dir.join("dialogues.json"),
        }
    }

    pub(crate) fn dialogues_path(&self, settings: &Settings) -> PathBuf {
        settings
            .dialogues_path
            .clone()
            .unwrap_or_else(|| self.default_dialogues_path.clone())
    }
}

pub(crate) fn project_paths() -> Result<Paths> {
    let proj = ProjectDirs::from("com", "xiaoyin", "XiaoyinPet")
        .context("could not resolve project directories")?;
    let dir = proj.data_local_dir().to_path_buf();
    fs::create_dir_all(&dir)
        .with_context(|| format!("could not create data directory {}", dir.display()))?;
    Ok(Paths::in_dir(&dir))
}

/// Used when the per-user data directory is unavailable.
pub(crate) fn fallback_paths() -> Paths {
    let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    Paths::in_dir(&dir)
}

pub(crate) fn load_settings(path: &Path) -> Settings {
    if let Ok(s) = fs::read_to_string(path) {
        if let Ok(v) = serde_json::from_str::<Settings>(&s) {
            return v;
        }
    }
    Settings::default()
}

pub(crate) fn save_settings_atomic(path: &Path, s: &Settings) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(s)?;
    fs::write(&tmp, data)?;
    atomic_rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn atomic_rename(from: &Path, to: &Path) -> std::io::Result<()> {
    // rename-over-existing fails on Windows
    if cfg!(windows) && to.exists() {
        let _ = fs::remove_file(to);
    }
    fs::rename(from, to)
}

/// Logs go to a file; stdout belongs to the full-screen UI.
pub(crate) fn init_logging(paths: &Paths, settings: &Settings) -> Result<()> {
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_path)
        .with_context(|| format!("could not open log file {}", paths.log_path.display()))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow!("could not install logger: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_broken_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(load_settings(&path), Settings::default());
        fs::write(&path, "{{{").unwrap();
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn partial_settings_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "weather": "rain", "action_cooldown_ms": 500 }"#).unwrap();
        let s = load_settings(&path);
        assert_eq!(s.weather, WeatherKind::Rain);
        assert_eq!(s.action_cooldown_ms, 500);
        assert_eq!(s.fps_cap, 30);
    }

    #[test]
    fn fallback_paths_live_in_the_working_directory() {
        let paths = fallback_paths();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(paths.data_dir, cwd);
        assert_eq!(paths.log_path, cwd.join("xiaoyin-pet.log"));
    }

    #[test]
    fn unopenable_log_file_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::in_dir(&dir.path().join("missing").join("deeper"));
        let err = init_logging(&paths, &Settings::default()).unwrap_err();
        assert!(format!("{err:#}").contains("could not open log file"));
    }

    #[test]
    fn settings_round_trip_through_atomic_save() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::in_dir(dir.path());
        let s = Settings {
            rng_seed: 9,
            dialogues_path: Some(dir.path().join("lines.json")),
            ..Settings::default()
        };
        save_settings_atomic(&paths.settings_path, &s).unwrap();
        save_settings_atomic(&paths.settings_path, &s).unwrap();
        assert_eq!(load_settings(&paths.settings_path), s);
        assert_eq!(paths.dialogues_path(&s), dir.path().join("lines.json"));
        assert_eq!(
            paths.dialogues_path(&Settings::default()),
            dir.path().join("dialogues.json")
        );
    }
}
