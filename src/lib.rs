mod condition;
mod events;
mod extensions;
mod grammar;
mod groupmode;
mod macros;
mod pipeline;
mod registry;
mod runtime;
mod script;
mod services;
mod settings;
mod signature;
mod state;
mod template;

#[cfg(test)]
mod test_utils;

// Library exports
pub mod prelude {
    // Parsed script structures
    pub use crate::condition::{Category, Comparator, Condition};
    pub use crate::groupmode::{Assign, BucketKind, ColumnRange, GroupMode, Modifier, Plan, Route};
    pub use crate::pipeline::{Branch, ParsedCall, Pipeline, Step};
    pub use crate::script::{ExecutionReport, PipelineWithOrigin, render_print_values};
    pub use crate::template::{Amount, CallSegment, InlineScript, ItemRef, Piece, TemplatedString};

    // Callables
    pub use crate::registry::{
        Native, Registry,
        closures::{FnPipe, FnSource, FnSpout},
        traits::{Descriptor, Pipe, Source, Spout, SpoutMode},
    };
    pub use crate::signature::{
        ArgAsExt, ArgMapExt, ArgValue, Args, Param, ParamType, Signature, arguments::RawArgs,
    };

    // Macros & events
    pub use crate::events::{Activation, Event, EventRegistry, MessagePattern, Trigger, TriggerInput};
    pub use crate::macros::{
        Macro, MacroKind, MacroParam, MacroRegistry,
        analysis::{get_static_errors, script_static_errors},
    };

    // State
    pub use crate::extensions::Extensions;
    pub use crate::state::{
        context::{Context, Origin, OriginKind},
        error_log::{Diagnosed, Diagnostic, ErrorLog, LogEntry},
        item_scope::ItemScope,
        spout_state::{SpoutCall, SpoutState},
    };

    // Runtime, services and configuration
    pub use crate::runtime::{Runtime, RuntimeBuilder};
    pub use crate::services::{
        EventHooks, PipelineServices, ScriptIO, hook_events,
        io::{BufferedInteraction, StdoutInteraction},
        persist::{MemoryWriter, RegistryWriter},
    };
    pub use crate::settings::Settings;
}

// Internal imports for use within the crate
#[allow(unused_imports)]
pub(crate) mod imports {
    // Script structures
    pub use crate::condition::Condition;
    pub use crate::groupmode::{GroupMode, Plan, Route};
    pub use crate::pipeline::Pipeline;
    pub use crate::script::{ExecutionReport, PipelineWithOrigin};
    pub use crate::template::{CallSegment, ItemRef, Piece, TemplatedString};

    // Callables and signatures
    pub use crate::registry::{
        Native, Registry,
        traits::{Descriptor, Pipe, Source, Spout, SpoutMode},
    };
    pub use crate::signature::{
        ArgAsExt, ArgMapExt, ArgValue, Args, Param, ParamType, Signature,
        arguments::{BoundArgs, RawArgs},
    };

    // Registries
    pub use crate::events::{Event, EventRegistry};
    pub use crate::macros::{Macro, MacroKind, MacroRegistry};

    // State
    pub use crate::extensions::Extensions;
    pub use crate::state::{
        context::{Context, Origin, OriginKind},
        error_log::{Diagnosed, Diagnostic, ErrorLog},
        item_scope::ItemScope,
        spout_state::{SpoutCall, SpoutState},
    };

    // Runtime, services and configuration
    pub use crate::runtime::Runtime;
    pub use crate::services::{EventHooks, PipelineServices, ScriptIO, hook_events};
    pub use crate::settings::Settings;

    // Result and error handling
    pub type Result<T> = anyhow::Result<T>;
    pub use anyhow::Context as _;

    // Async
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
    pub use tokio::sync::RwLock;
    pub type BoxFuture<'a, T> =
        std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

    // Collections
    pub use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

    // Lazy initialization
    pub use std::sync::LazyLock;

    // Time
    pub use std::time::Instant;

    // Testing
    #[cfg(test)]
    pub use crate::test_utils::init_tracing;
}
