use crate::imports::*;

/*
    Traits for native callables:
    * Descriptor - Name, signature and help text shared by every callable
    * Source - Produces items from nothing
    * Pipe - Turns a list of items into another list of items
    * Spout - Performs a side effect after the script has finished

    Default impls where a callable usually has nothing to say.
*/
pub trait Descriptor: Send + Sync {
    fn name(&self) -> &str;
    fn signature(&self) -> &Signature;
    fn hint(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
pub trait Source: Descriptor {
    /// Whether `{ALL name}` may ask for every item (`n = -1`).
    fn depletable(&self) -> bool {
        false
    }
    async fn generate(&self, context: &Context, args: &Args) -> Result<Vec<String>>;
}

#[async_trait]
pub trait Pipe: Descriptor {
    async fn apply(&self, items: Vec<String>, args: &Args) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpoutMode {
    /// One callback per invocation.
    #[default]
    Simple,
    /// Every invocation in one script is delivered as a single callback.
    Aggregated,
}

#[async_trait]
pub trait Spout: Descriptor {
    fn mode(&self) -> SpoutMode {
        SpoutMode::Simple
    }
    /// Receives one call per invocation, or all of them at once for aggregated spouts.
    async fn run(&self, context: &Context, calls: Vec<SpoutCall>) -> Result<()>;
}
