use crate::imports::*;
use serde::{Deserialize, Serialize};

/*
    Types:
    * OriginKind - What started an execution
    * Origin - Describes the execution root, shared by every nested macro context
    * Context - Per-execution metadata handed to every evaluation function
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OriginKind {
    /// A script typed directly by a user.
    Direct,
    /// A script run through a registered command.
    Command,
    /// A script fired by an event trigger.
    Event,
    /// A script run in response to an interaction callback (button press and the like).
    Callback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub kind: OriginKind,
    /// Display name used in diagnostic titles.
    pub name: String,
    /// Identifier of whoever caused the execution.
    pub activator: String,
    /// Name of the event when `kind` is `Event`.
    pub event: Option<String>,
}

impl Origin {
    pub fn new(kind: OriginKind, name: impl Into<String>, activator: impl Into<String>) -> Self {
        Origin {
            kind,
            name: name.into(),
            activator: activator.into(),
            event: None,
        }
    }

    pub fn direct(activator: impl Into<String>) -> Self {
        Self::new(OriginKind::Direct, "script", activator)
    }

    pub fn event(event: impl Into<String>, activator: impl Into<String>) -> Self {
        let event = event.into();
        Origin {
            kind: OriginKind::Event,
            name: format!("event `{event}`"),
            activator: activator.into(),
            event: Some(event),
        }
    }
}

/// Immutable for the duration of one evaluation; macro calls derive a child via `into_macro`.
#[derive(Clone)]
pub struct Context {
    runtime: Arc<Runtime>,
    origin: Arc<Origin>,
    author: String,
    channel: Option<String>,
    arguments: Arc<HashMap<String, String>>,
    stack: Vec<String>,
    extensions: Extensions,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("origin", &self.origin)
            .field("author", &self.author)
            .field("channel", &self.channel)
            .field("arguments", &self.arguments)
            .field("stack", &self.stack)
            .finish()
    }
}

impl Context {
    pub fn new(runtime: Arc<Runtime>, origin: Origin) -> Self {
        let author = origin.activator.clone();
        Context {
            runtime,
            origin: Arc::new(origin),
            author,
            channel: None,
            arguments: Arc::new(HashMap::new()),
            stack: Vec::new(),
            extensions: Extensions::new(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_arguments(mut self, arguments: HashMap<String, String>) -> Self {
        self.arguments = Arc::new(arguments);
        self
    }

    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn settings(&self) -> &Settings {
        self.runtime.settings()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).map(String::as_str)
    }

    pub fn arguments(&self) -> &HashMap<String, String> {
        &self.arguments
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Names of the macros currently being executed, outermost first.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The context a macro body executes in: the macro's author and bound arguments,
    /// one level deeper in the call stack.
    pub fn into_macro(
        &self,
        macro_: &Macro,
        arguments: HashMap<String, String>,
    ) -> std::result::Result<Context, ErrorLog> {
        let max_depth = self.settings().max_depth;
        if self.depth() >= max_depth {
            return Err(ErrorLog::fatal(format!(
                "Recursion too deep: `{}` exceeds the maximum macro depth of {max_depth} ({})",
                macro_.name,
                self.stack.join(" → ")
            )));
        }
        let mut stack = self.stack.clone();
        stack.push(macro_.name.clone());

        tracing::debug!(macro_name = %macro_.name, depth = stack.len(), "Entering macro");
        Ok(Context {
            runtime: self.runtime.clone(),
            origin: self.origin.clone(),
            author: macro_.author_id.clone(),
            channel: self.channel.clone(),
            arguments: Arc::new(arguments),
            stack,
            extensions: self.extensions.clone(),
        })
    }
}
