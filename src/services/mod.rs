/*
    Pipeline services module:
    * A service trait defines some functionality the engine reaches for outside of evaluation.
    * PipelineServices is held by the Runtime and fans every call out to the registered services.

    Two services:
    * ScriptIO - where printed output and rendered error logs go.
    * EventHooks - observers around script execution and registry writes.

    Built-in implementations live in io.rs and event_hooks/; hosts provide their own for real transports.
*/
use crate::imports::*;

pub mod hook_events;
pub mod io;
pub mod persist;

mod event_hooks; // Built-in Implementations of EventHooks

/*
    Hook dispatch helper - collects errors from multiple hook calls and aggregates them into a single Result.
*/
fn collect_errors(kind: &str, errors: Vec<anyhow::Error>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        let msg = errors
            .iter()
            .map(|e| format!("{e:#}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(anyhow::anyhow!("{kind} service errors: {msg}"))
    }
}

macro_rules! hook_dispatch {
    ($method:ident, $event_ty:ty) => {
        pub async fn $method(&self, event: $event_ty) -> Result<()> {
            let mut errors = Vec::new();
            for hook in &self.hooks {
                if let Err(e) = hook.$method(&event).await {
                    errors.push(e);
                }
            }
            collect_errors("Hook", errors)
        }
    };
}

#[derive(Clone, Default)]
pub struct PipelineServices {
    io: Vec<Arc<dyn ScriptIO>>,
    hooks: Vec<Arc<dyn EventHooks>>,
}

impl std::fmt::Debug for PipelineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineServices")
            .field("io_count", &self.io.len())
            .field("hooks_count", &self.hooks.len())
            .finish()
    }
}

impl PipelineServices {
    // Builder methods
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_io<T: ScriptIO + 'static>(&mut self, io: T) {
        self.io.push(Arc::new(io));
    }

    pub fn add_hook<T: EventHooks + 'static>(&mut self, hook: T) {
        self.hooks.push(Arc::new(hook));
    }

    // Output, applies to all registered IO services
    pub async fn deliver(&self, channel: Option<&str>, text: &str) -> Result<()> {
        let mut errors = Vec::new();
        for io in &self.io {
            if let Err(e) = io.deliver(channel, text).await {
                errors.push(e);
            }
        }
        collect_errors("IO", errors)
    }

    pub async fn report(&self, channel: Option<&str>, diagnostic: &Diagnostic) -> Result<()> {
        let mut errors = Vec::new();
        for io in &self.io {
            if let Err(e) = io.report(channel, diagnostic).await {
                errors.push(e);
            }
        }
        collect_errors("IO", errors)
    }

    // Hook methods
    hook_dispatch!(before_execute_script, hook_events::ScriptStarted);
    hook_dispatch!(after_execute_script, hook_events::ScriptFinished);
    hook_dispatch!(after_registry_write, hook_events::RegistryWritten);

    pub fn defaults() -> Self {
        let mut services = Self::new();
        services.add_io(io::StdoutInteraction);
        // Check if we're using the debug build, if so add the debug event hook service
        #[cfg(debug_assertions)]
        {
            services.add_hook(event_hooks::debug::DebugEventHooks);
        }
        services
    }
}

/*
    Service traits:
    * ScriptIO - Delivery of printed output and diagnostics.
    * EventHooks - Observers around execution and persistence.

    Default impls on all methods so that types only need to implement what they care about.
*/
#[async_trait]
pub trait ScriptIO: Send + Sync {
    async fn deliver(&self, _channel: Option<&str>, _text: &str) -> Result<()> {
        Ok(())
    }
    async fn report(&self, _channel: Option<&str>, _diagnostic: &Diagnostic) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait EventHooks: Send + Sync {
    async fn before_execute_script(&self, _event: &hook_events::ScriptStarted) -> Result<()> {
        Ok(())
    }
    async fn after_execute_script(&self, _event: &hook_events::ScriptFinished) -> Result<()> {
        Ok(())
    }
    async fn after_registry_write(&self, _event: &hook_events::RegistryWritten) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    #[async_trait]
    impl EventHooks for Failing {
        async fn after_registry_write(&self, _: &hook_events::RegistryWritten) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[derive(Clone, Default)]
    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHooks for Counting {
        async fn after_registry_write(&self, _: &hook_events::RegistryWritten) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn hook_errors_are_collected_after_every_hook_ran() {
        init_tracing();
        let counting = Counting::default();
        let mut services = PipelineServices::new();
        services.add_hook(Failing);
        services.add_hook(counting.clone());

        let event = hook_events::RegistryWritten {
            registry: "pipe macros".into(),
            entries: 1,
            written_at: Instant::now(),
        };
        let err = services.after_registry_write(event).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);

        // hooks that don't override a method accept its events
        let started = hook_events::ScriptStarted {
            origin: OriginKind::Direct,
            origin_name: "script".into(),
            channel: None,
            script: "x".into(),
        };
        services.before_execute_script(started).await.unwrap();
    }

    #[tokio::test]
    async fn default_io_discards_everything() {
        init_tracing();
        struct Silent;
        impl ScriptIO for Silent {}

        let mut services = PipelineServices::new();
        services.add_io(Silent);
        services.deliver(None, "hello").await.unwrap();
        let diagnostic = Diagnostic {
            title: "Warning log".into(),
            body: "careful".into(),
            terminal: false,
        };
        services.report(None, &diagnostic).await.unwrap();
    }

    #[tokio::test]
    async fn io_fans_out() {
        init_tracing();
        let first = io::BufferedInteraction::new();
        let second = io::BufferedInteraction::new();
        let mut services = PipelineServices::new();
        services.add_io(first.clone());
        services.add_io(second.clone());

        services.deliver(Some("general"), "hello").await.unwrap();
        assert_eq!(first.delivered(), vec![(Some("general".to_string()), "hello".to_string())]);
        assert_eq!(second.delivered().len(), 1);
    }
}
