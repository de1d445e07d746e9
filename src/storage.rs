use crate::clock::format_ts;
use crate::config::atomic_rename;
use crate::error::{PetError, Result};
use crate::model::{PetState, SAVE_KEY};
use crate::normalize::normalize;
use serde_json::Value;
use std::{fs, io, path::PathBuf};
use tracing::{debug, info, warn};

/// Flat string key-value store. Every write replaces the whole value.
pub(crate) trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// One JSON file per key inside a directory.
pub(crate) struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        atomic_rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) struct LoadOutcome {
    pub(crate) state: PetState,
    /// Recoverable problem hit while reading; the state is defaults when set.
    pub(crate) warning: Option<PetError>,
}

/// The pet save record bound to its fixed key.
pub(crate) struct SaveStore<S: KvStore> {
    store: S,
}

impl<S: KvStore> SaveStore<S> {
    pub(crate) fn new(store: S) -> Self {
        Self { store }
    }

    pub(crate) fn load(&self, now_ms: i64, today: &str) -> LoadOutcome {
        let defaults = || PetState::new_default(now_ms, today);
        let raw = match self.store.get(SAVE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!("no save found, starting fresh");
                return LoadOutcome {
                    state: defaults(),
                    warning: None,
                };
            }
            Err(e) => {
                warn!(error = %e, "could not read save, using defaults");
                return LoadOutcome {
                    state: defaults(),
                    warning: Some(e),
                };
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(v) => {
                let state = normalize(&v, now_ms, today);
                debug!(?state, "save loaded");
                LoadOutcome {
                    state,
                    warning: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "save is not valid JSON, using defaults");
                LoadOutcome {
                    state: defaults(),
                    warning: Some(e.into()),
                }
            }
        }
    }

    /// Stamp the annotation and overwrite the record.
    pub(crate) fn save(&mut self, st: &mut PetState, reason: &str, now_ms: i64) -> Result<()> {
        st.last_save_tip = format!("{reason} @ {}", format_ts(now_ms));
        let data = serde_json::to_string(st)?;
        self.store.set(SAVE_KEY, &data)?;
        debug!(reason, "state saved");
        Ok(())
    }

    pub(crate) fn reset(&mut self) -> Result<()> {
        self.store.remove(SAVE_KEY)?;
        info!("save record removed");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn inner_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
