use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    botlink_common::fs::{read_optional, write_atomic},
    dashmap::DashMap,
    serde::{Deserialize, Serialize},
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use botlink_metrics::{counter, labels, switches as switch_metrics};

use crate::{
    SWITCH_FILE,
    error::{Context, Error, Result},
};

/// Which flag of a module a query or toggle addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// One group, keyed by group id.
    Group(&'a str),
    /// The single private-chat flag.
    Private,
}

impl fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(id) => write!(f, "group:{id}"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// Persisted flags of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchState {
    pub group: BTreeMap<String, bool>,
    pub private: bool,
}

impl SwitchState {
    pub fn get(&self, scope: Scope<'_>) -> bool {
        match scope {
            Scope::Group(id) => self.group.get(id).copied().unwrap_or(false),
            Scope::Private => self.private,
        }
    }

    /// Flip one flag; an absent group entry becomes `true`.
    fn flip(&mut self, scope: Scope<'_>) -> bool {
        match scope {
            Scope::Group(id) => {
                let flag = self.group.entry(id.to_string()).or_insert(false);
                *flag = !*flag;
                *flag
            },
            Scope::Private => {
                self.private = !self.private;
                self.private
            },
        }
    }

    fn set(&mut self, scope: Scope<'_>, enabled: bool) {
        match scope {
            Scope::Group(id) => {
                self.group.insert(id.to_string(), enabled);
            },
            Scope::Private => self.private = enabled,
        }
    }

    /// Group ids currently switched on, sorted.
    pub fn enabled_groups(&self) -> Vec<String> {
        self.group
            .iter()
            .filter(|(_, on)| **on)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// File-backed switch store rooted at the data directory.
///
/// Reads need no lock because writes replace the file atomically. Toggles
/// take a per-module async mutex, so different modules never contend.
pub struct SwitchStore {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SwitchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, module: &str) -> Result<PathBuf> {
        validate_module(module)?;
        Ok(self.root.join(module).join(SWITCH_FILE))
    }

    fn lock_for(&self, module: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(module.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load a module's flags. Missing, unreadable or corrupt files read as
    /// all-off.
    pub async fn load(&self, module: &str) -> Result<SwitchState> {
        let path = self.path_for(module)?;
        let raw = match read_optional(&path).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(SwitchState::default()),
            Err(e) => {
                warn!(module, path = %path.display(), error = %e, "switch file unreadable, treating as empty");
                return Ok(SwitchState::default());
            },
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(module, path = %path.display(), error = %e, "switch file corrupt, treating as empty");
                #[cfg(feature = "metrics")]
                counter!(switch_metrics::CORRUPT_FILES_TOTAL, labels::MODULE => module.to_string())
                    .increment(1);
                Ok(SwitchState::default())
            },
        }
    }

    pub async fn is_enabled(&self, module: &str, scope: Scope<'_>) -> Result<bool> {
        Ok(self.load(module).await?.get(scope))
    }

    /// Flip a flag, persist it and return the new value. The first toggle of
    /// an absent flag enables it.
    pub async fn toggle(&self, module: &str, scope: Scope<'_>) -> Result<bool> {
        let enabled = self.update(module, |state| state.flip(scope)).await?;
        info!(module, scope = %scope, enabled, "switch toggled");
        Ok(enabled)
    }

    /// Force a flag to `enabled` and persist it. Returns whether the stored
    /// value changed.
    pub async fn set(&self, module: &str, scope: Scope<'_>, enabled: bool) -> Result<bool> {
        let changed = self
            .update(module, |state| {
                let changed = state.get(scope) != enabled;
                state.set(scope, enabled);
                changed
            })
            .await?;
        if changed {
            info!(module, scope = %scope, enabled, "switch set");
        }
        Ok(changed)
    }

    /// Read-modify-write of one module's file under its lock.
    async fn update<T>(
        &self,
        module: &str,
        apply: impl FnOnce(&mut SwitchState) -> T,
    ) -> Result<T> {
        let path = self.path_for(module)?;
        let lock = self.lock_for(module);
        let _guard = lock.lock().await;

        let mut state = self.load(module).await?;
        let out = apply(&mut state);
        let json = serde_json::to_string_pretty(&state)?;
        write_atomic(&path, json.as_bytes())
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        #[cfg(feature = "metrics")]
        counter!(switch_metrics::TOGGLES_TOTAL, labels::MODULE => module.to_string()).increment(1);

        Ok(out)
    }

    /// Groups for which `module` is switched on, sorted.
    pub async fn enabled_groups(&self, module: &str) -> Result<Vec<String>> {
        Ok(self.load(module).await?.enabled_groups())
    }

    /// Modules switched on for `group_id`, sorted by name.
    ///
    /// Scans the sub-directories of the data root that hold a switch file.
    pub async fn enabled_modules(&self, group_id: &str) -> Result<Vec<String>> {
        let mut modules = Vec::new();
        for module in self.modules().await? {
            if self.is_enabled(&module, Scope::Group(group_id)).await? {
                modules.push(module);
            }
        }
        Ok(modules)
    }

    /// Names of all modules that have a switch file, sorted.
    pub async fn modules(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_module(&name).is_err() {
                continue;
            }
            if tokio::fs::try_exists(entry.path().join(SWITCH_FILE))
                .await
                .unwrap_or(false)
            {
                names.push(name);
            }
        }
        names.sort();
        debug!(count = names.len(), "scanned switch modules");
        Ok(names)
    }
}

/// Module names become directory names, so they must be a single plain path
/// component.
fn validate_module(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_module(name))
    }
}
