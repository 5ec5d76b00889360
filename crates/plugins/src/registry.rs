//! Plugin discovery and loading.
//!
//! Handlers are compiled in and listed in a [`Catalog`]. Core entries always
//! load first, in catalog order. Optional plugins are directories under
//! `plugins.dir`, each with a `plugin.toml` naming the catalog entrypoint that
//! builds it. Any plugin may fail to load; the failure is recorded in the
//! [`LoadReport`] and loading carries on.

use std::{
    fmt,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    botlink_config::BotConfig,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use botlink_metrics::{gauge, plugins as plugin_metrics};

use crate::{
    error::Error,
    handler::Handler,
    manifest::PluginManifest,
};

/// What a factory gets to build its handler.
#[derive(Clone)]
pub struct LoadContext {
    pub config: Arc<BotConfig>,
    pub data_dir: PathBuf,
}

impl LoadContext {
    pub fn new(config: Arc<BotConfig>) -> Self {
        let data_dir = config.storage.data_dir.clone();
        Self { config, data_dir }
    }
}

/// Builds a handler instance.
pub type HandlerFactory =
    Arc<dyn Fn(&LoadContext) -> anyhow::Result<Arc<dyn Handler>> + Send + Sync>;

#[derive(Clone)]
pub struct CatalogEntry {
    pub entrypoint: String,
    /// Core entries are loaded unconditionally, before any optional plugin.
    pub core: bool,
    pub factory: HandlerFactory,
}

/// Entrypoints known at build time.
#[derive(Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entrypoint.
    pub fn register<F>(
        &mut self,
        entrypoint: impl Into<String>,
        core: bool,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(&LoadContext) -> anyhow::Result<Arc<dyn Handler>> + Send + Sync + 'static,
    {
        let entrypoint = entrypoint.into();
        self.entries.retain(|e| e.entrypoint != entrypoint);
        self.entries.push(CatalogEntry {
            entrypoint,
            core,
            factory: Arc::new(factory),
        });
        self
    }

    pub fn get(&self, entrypoint: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.entrypoint == entrypoint)
    }

    /// Core entries in registration order.
    pub fn core_entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| e.core)
    }

    pub fn entrypoints(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.entrypoint.as_str())
    }
}

/// Lifecycle of a plugin between two reloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginState {
    Discovered,
    Loaded,
    Active,
    Disabled,
    FailedToLoad { error: String },
}

/// One plugin as seen by the registry.
#[derive(Clone)]
pub struct PluginHandle {
    pub name: String,
    pub entrypoint: String,
    pub core: bool,
    pub description: String,
    pub state: PluginState,
    pub handler: Option<Arc<dyn Handler>>,
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name)
            .field("entrypoint", &self.entrypoint)
            .field("core", &self.core)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PluginHandle {
    fn discovered(name: &str, entrypoint: &str, core: bool) -> Self {
        Self {
            name: name.to_string(),
            entrypoint: entrypoint.to_string(),
            core,
            description: String::new(),
            state: PluginState::Discovered,
            handler: None,
        }
    }

    fn fail(mut self, error: impl fmt::Display) -> Self {
        self.state = PluginState::FailedToLoad {
            error: error.to_string(),
        };
        self
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, PluginState::Loaded | PluginState::Active)
    }
}

/// Outcome of one load pass, sorted for reproducible output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub disabled: Vec<String>,
}

impl LoadReport {
    pub fn from_handles(handles: &[PluginHandle]) -> Self {
        let mut report = Self::default();
        for handle in handles {
            match &handle.state {
                PluginState::Loaded | PluginState::Active => {
                    report.loaded.push(handle.name.clone());
                },
                PluginState::FailedToLoad { error } => {
                    report.failed.push((handle.name.clone(), error.clone()));
                },
                PluginState::Disabled => report.disabled.push(handle.name.clone()),
                PluginState::Discovered => {},
            }
        }
        report.loaded.sort();
        report.failed.sort();
        report.disabled.sort();
        report
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loaded {} plugin(s)", self.loaded.len())?;
        if !self.loaded.is_empty() {
            write!(f, ": {}", self.loaded.join(", "))?;
        }
        if !self.disabled.is_empty() {
            write!(f, "\nDisabled: {}", self.disabled.join(", "))?;
        }
        if !self.failed.is_empty() {
            write!(f, "\nFailed to load {} plugin(s):", self.failed.len())?;
            for (name, error) in &self.failed {
                write!(f, "\n- {name}: {error}")?;
            }
        }
        Ok(())
    }
}

/// Discovers and loads plugins.
pub struct PluginRegistry {
    catalog: Catalog,
    ctx: LoadContext,
    dir: PathBuf,
    disabled: Vec<String>,
}

impl PluginRegistry {
    pub fn new(catalog: Catalog, ctx: LoadContext) -> Self {
        let dir = ctx.config.plugins.dir.clone();
        let disabled = ctx.config.plugins.disabled.clone();
        Self {
            catalog,
            ctx,
            dir,
            disabled,
        }
    }

    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Optional plugin names, sorted. Directories starting with `_` are
    /// skipped; a missing plugins dir yields nothing.
    pub fn discover(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "no plugin directory");
                return Vec::new();
            },
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('_'))
            .collect();
        names.sort();
        names
    }

    /// Load one optional plugin from its directory.
    pub fn load(&self, name: &str) -> PluginHandle {
        let dir = self.dir.join(name);
        let manifest = match PluginManifest::load(&dir) {
            Ok(m) => m,
            Err(e) => return PluginHandle::discovered(name, "", false).fail(e),
        };
        let mut handle = PluginHandle::discovered(name, &manifest.entrypoint, false);
        handle.description = manifest.description.clone().unwrap_or_default();

        if !manifest.enabled || self.disabled.iter().any(|d| d == name) {
            handle.state = PluginState::Disabled;
            return handle;
        }
        match self.catalog.get(&manifest.entrypoint) {
            Some(entry) => self.instantiate(handle, entry),
            None => handle.fail(Error::unknown_entrypoint(&manifest.entrypoint)),
        }
    }

    /// Load the core handlers in catalog order.
    pub fn load_core(&self) -> Vec<PluginHandle> {
        self.catalog
            .core_entries()
            .map(|entry| {
                let handle = PluginHandle::discovered(&entry.entrypoint, &entry.entrypoint, true);
                if self.disabled.contains(&entry.entrypoint) {
                    warn!(plugin = %entry.entrypoint, "core plugin cannot be disabled, loading anyway");
                }
                self.instantiate(handle, entry)
            })
            .collect()
    }

    /// Core handlers first, then every discovered optional plugin.
    pub fn load_all(&self) -> (Vec<PluginHandle>, LoadReport) {
        let mut handles = self.load_core();
        for name in self.discover() {
            let handle = if handles.iter().any(|h| h.name == name) {
                PluginHandle::discovered(&name, "", false)
                    .fail("name already used by a core plugin")
            } else {
                self.load(&name)
            };
            handles.push(handle);
        }

        let report = LoadReport::from_handles(&handles);
        for (name, error) in &report.failed {
            warn!(plugin = %name, error = %error, "plugin failed to load");
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            disabled = report.disabled.len(),
            "plugins loaded"
        );

        #[cfg(feature = "metrics")]
        {
            gauge!(plugin_metrics::LOADED).set(report.loaded.len() as f64);
            gauge!(plugin_metrics::LOAD_FAILURES).set(report.failed.len() as f64);
        }

        (handles, report)
    }

    /// Run the factory, turning errors and panics into `FailedToLoad`.
    fn instantiate(&self, mut handle: PluginHandle, entry: &CatalogEntry) -> PluginHandle {
        let built = std::panic::catch_unwind(AssertUnwindSafe(|| (entry.factory)(&self.ctx)));
        match built {
            Ok(Ok(handler)) => {
                if handle.description.is_empty() {
                    handle.description = handler.description().to_string();
                }
                handle.handler = Some(handler);
                handle.state = PluginState::Loaded;
                debug!(plugin = %handle.name, entrypoint = %entry.entrypoint, "plugin loaded");
                handle
            },
            Ok(Err(e)) => handle.fail(Error::factory(&entry.entrypoint, format!("{e:#}"))),
            Err(panic) => handle.fail(Error::factory(
                &entry.entrypoint,
                crate::panic_message(panic.as_ref()),
            )),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {async_trait::async_trait, botlink_protocol::Frame, tempfile::TempDir};

    use {super::*, crate::context::HandlerContext};

    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn handle(&self, _ctx: &HandlerContext, _frame: &Frame) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .register("core-b", true, |_| Ok(Arc::new(Named("core-b")) as Arc<dyn Handler>))
            .register("core-a", true, |_| Ok(Arc::new(Named("core-a")) as Arc<dyn Handler>))
            .register("greeter", false, |_| Ok(Arc::new(Named("greeter")) as Arc<dyn Handler>))
            .register("flaky", false, |_| anyhow::bail!("missing api key"))
            .register("exploding", false, |_| panic!("boom at import"));
        catalog
    }

    fn plugin(root: &Path, name: &str, manifest: Option<&str>) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        if let Some(manifest) = manifest {
            std::fs::write(dir.join("plugin.toml"), manifest).unwrap();
        }
    }

    fn registry(tmp: &TempDir) -> PluginRegistry {
        let ctx = LoadContext::new(Arc::new(BotConfig::default()));
        PluginRegistry::new(catalog(), ctx).with_dir(tmp.path())
    }

    #[test]
    fn discover_is_sorted_and_skips_private_dirs() {
        let tmp = TempDir::new().unwrap();
        for name in ["zeta", "_template", "alpha", "mid"] {
            plugin(tmp.path(), name, None);
        }
        std::fs::write(tmp.path().join("README.md"), "not a plugin").unwrap();

        assert_eq!(registry(&tmp).discover(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn missing_dir_discovers_nothing() {
        let ctx = LoadContext::new(Arc::new(BotConfig::default()));
        let registry = PluginRegistry::new(catalog(), ctx).with_dir("/nonexistent/plugins");
        assert!(registry.discover().is_empty());
    }

    #[test]
    fn core_handlers_load_first_in_catalog_order() {
        let tmp = TempDir::new().unwrap();
        plugin(tmp.path(), "greeter", Some("entrypoint = \"greeter\""));

        let (handles, _) = registry(&tmp).load_all();
        let names: Vec<_> = handles.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["core-b", "core-a", "greeter"]);
        assert!(handles.iter().all(PluginHandle::is_loaded));
    }

    #[test]
    fn failures_are_recorded_and_loading_continues() {
        let tmp = TempDir::new().unwrap();
        plugin(tmp.path(), "a-no-manifest", None);
        plugin(tmp.path(), "b-bad-toml", Some("entrypoint = "));
        plugin(tmp.path(), "c-unknown", Some("entrypoint = \"nope\""));
        plugin(tmp.path(), "d-flaky", Some("entrypoint = \"flaky\""));
        plugin(tmp.path(), "e-exploding", Some("entrypoint = \"exploding\""));
        plugin(tmp.path(), "f-greeter", Some("entrypoint = \"greeter\""));

        let (handles, report) = registry(&tmp).load_all();
        assert_eq!(handles.len(), 8);
        assert_eq!(report.loaded, vec!["core-a", "core-b", "f-greeter"]);

        let failed: Vec<_> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, ["a-no-manifest", "b-bad-toml", "c-unknown", "d-flaky", "e-exploding"]);
        assert!(report.failed[0].1.contains("missing plugin.toml"));
        assert!(report.failed[2].1.contains("unknown entrypoint: nope"));
        assert!(report.failed[3].1.contains("missing api key"));
        assert!(report.failed[4].1.contains("boom at import"));
    }

    #[test]
    fn disabled_plugins_are_reported_not_loaded() {
        let tmp = TempDir::new().unwrap();
        plugin(tmp.path(), "off", Some("entrypoint = \"greeter\"\nenabled = false"));
        plugin(tmp.path(), "muted", Some("entrypoint = \"greeter\""));

        let mut config = BotConfig::default();
        config.plugins.disabled = vec!["muted".into()];
        let ctx = LoadContext::new(Arc::new(config));
        let registry = PluginRegistry::new(catalog(), ctx).with_dir(tmp.path());

        let (_, report) = registry.load_all();
        assert_eq!(report.disabled, vec!["muted", "off"]);
        assert!(report.is_clean());
    }

    #[test]
    fn optional_plugin_cannot_shadow_core_name() {
        let tmp = TempDir::new().unwrap();
        plugin(tmp.path(), "core-a", Some("entrypoint = \"greeter\""));

        let (_, report) = registry(&tmp).load_all();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "core-a");
    }

    #[test]
    fn report_renders_failures_with_errors() {
        let report = LoadReport {
            loaded: vec!["a".into(), "b".into()],
            failed: vec![("c".into(), "missing plugin.toml".into())],
            disabled: vec![],
        };
        assert_eq!(
            report.to_string(),
            "Loaded 2 plugin(s): a, b\nFailed to load 1 plugin(s):\n- c: missing plugin.toml"
        );
    }
}
