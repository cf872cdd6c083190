use crate::imports::*;
use crate::macros::analysis::{get_static_errors, script_static_errors};
use crate::script::cache::LruCache;
use crate::services::persist::{Persistence, RegistryWriter};

/// Everything shared between executions: natives, macros, events, parse caches and services.
///
/// Built once by the host and handed around as `Arc<Runtime>`; every `Context` holds one.
pub struct Runtime {
    settings: Settings,
    natives: Registry,
    pipe_macros: MacroRegistry,
    source_macros: MacroRegistry,
    events: EventRegistry,
    scripts: LruCache<PipelineWithOrigin>,
    pipelines: LruCache<Pipeline>,
    services: PipelineServices,
    previous_output: RwLock<HashMap<String, Vec<String>>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("settings", &self.settings)
            .field("natives", &self.natives.len())
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn natives(&self) -> &Registry {
        &self.natives
    }

    pub fn macros(&self, kind: MacroKind) -> &MacroRegistry {
        match kind {
            MacroKind::Pipe => &self.pipe_macros,
            MacroKind::Source => &self.source_macros,
        }
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    /// The parsed script, shared with every other caller that asked for the same text.
    pub fn script(&self, script: &str) -> Arc<PipelineWithOrigin> {
        self.scripts
            .get_or_insert_with(script, || PipelineWithOrigin::parse(script))
    }

    pub fn pipeline(&self, pipeline: &str) -> Arc<Pipeline> {
        self.pipelines
            .get_or_insert_with(pipeline, || Pipeline::parse(pipeline))
    }

    /// The final items of the last direct script run in `channel`.
    pub async fn previous_output(&self, channel: &str) -> Option<Vec<String>> {
        self.previous_output.read().await.get(channel).cloned()
    }

    pub async fn set_previous_output(&self, channel: &str, items: Vec<String>) {
        self.previous_output
            .write()
            .await
            .insert(channel.to_string(), items);
    }

    /// Defines a macro after checking it statically. Terminal findings reject it;
    /// warnings are returned.
    pub async fn define_macro(&self, macro_: Macro) -> Result<ErrorLog> {
        let errors = get_static_errors(self, &macro_).await;
        if errors.is_terminal() {
            anyhow::bail!("{} `{}` has errors:\n{errors}", macro_.kind, macro_.name);
        }
        self.macros(macro_.kind).define(macro_).await?;
        Ok(errors)
    }

    /// Defines an event after checking its script statically.
    pub async fn define_event(&self, event: Event) -> Result<ErrorLog> {
        let errors = script_static_errors(self, &event.script).await;
        if errors.is_terminal() {
            anyhow::bail!("Event `{}` has errors:\n{errors}", event.name);
        }
        self.events.define(event).await?;
        Ok(errors)
    }

    /// Edits a macro after checking the edited version statically. On terminal findings
    /// the registered macro is left as it was.
    pub async fn edit_macro(
        &self,
        kind: MacroKind,
        name: &str,
        edit: impl FnOnce(&mut Macro),
    ) -> Result<ErrorLog> {
        let registry = self.macros(kind);
        let name = name.to_lowercase();
        let mut edited = registry
            .get(&name)
            .await
            .with_context(|| format!("No {kind} named `{name}`"))?;
        edit(&mut edited);
        edited.kind = kind;
        edited.name = name.clone();

        let errors = get_static_errors(self, &edited).await;
        if errors.is_terminal() {
            anyhow::bail!("{kind} `{name}` has errors:\n{errors}");
        }
        registry.edit(&name, move |macro_| *macro_ = edited).await?;
        Ok(errors)
    }

    /// Edits an event after checking its edited script statically.
    pub async fn edit_event(&self, name: &str, edit: impl FnOnce(&mut Event)) -> Result<ErrorLog> {
        let name = name.to_lowercase();
        let mut edited = self
            .events
            .get(&name)
            .await
            .with_context(|| format!("No event named `{name}`"))?;
        edit(&mut edited);

        let errors = script_static_errors(self, &edited.script).await;
        if errors.is_terminal() {
            anyhow::bail!("Event `{name}` has errors:\n{errors}");
        }
        self.events.edit(&name, move |event| *event = edited).await?;
        Ok(errors)
    }

    /// Runs a script typed directly by `author` in `channel`.
    pub async fn execute(self: &Arc<Self>, script: &str, author: &str, channel: &str) -> ExecutionReport {
        let context = Context::new(self.clone(), Origin::direct(author)).with_channel(channel);
        self.script(script)
            .execute(&context, &ItemScope::default())
            .await
    }
}

#[derive(Default)]
pub struct RuntimeBuilder {
    settings: Settings,
    natives: Registry,
    services: Option<PipelineServices>,
    writer: Option<Arc<dyn RegistryWriter>>,
}

impl RuntimeBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn natives(mut self, natives: Registry) -> Self {
        self.natives = natives;
        self
    }

    /// Defaults to `PipelineServices::defaults()`.
    pub fn services(mut self, services: PipelineServices) -> Self {
        self.services = Some(services);
        self
    }

    /// Where macro and event definitions are written after every change.
    pub fn writer(mut self, writer: impl RegistryWriter + 'static) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    pub fn build(self) -> Arc<Runtime> {
        let services = self.services.unwrap_or_else(PipelineServices::defaults);
        let persistence = Persistence::new(self.writer, services.clone());
        let capacity = self.settings.cache_capacity;
        tracing::debug!(natives = self.natives.len(), capacity, "Building runtime");

        Arc::new(Runtime {
            pipe_macros: MacroRegistry::new(MacroKind::Pipe, persistence.clone()),
            source_macros: MacroRegistry::new(MacroKind::Source, persistence.clone()),
            events: EventRegistry::new(persistence),
            scripts: LruCache::new(capacity),
            pipelines: LruCache::new(capacity),
            settings: self.settings,
            natives: self.natives,
            services,
            previous_output: RwLock::new(HashMap::new()),
        })
    }
}
