use crate::imports::*;

/*
    Closure-backed callables, for hosts that don't need a dedicated type per function:
    * FnSource
    * FnPipe
    * FnSpout
*/

type SourceFn = dyn Fn(&Context, &Args) -> Result<Vec<String>> + Send + Sync;
type PipeFn = dyn Fn(Vec<String>, &Args) -> Result<Vec<String>> + Send + Sync;
type SpoutFn = dyn Fn(&Context, Vec<SpoutCall>) -> Result<()> + Send + Sync;

pub struct FnSource {
    name: String,
    signature: Signature,
    hint: Option<String>,
    depletable: bool,
    f: Box<SourceFn>,
}

impl FnSource {
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        f: impl Fn(&Context, &Args) -> Result<Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        FnSource {
            name: name.into(),
            signature,
            hint: None,
            depletable: false,
            f: Box::new(f),
        }
    }

    pub fn depletable(mut self) -> Self {
        self.depletable = true;
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Descriptor for FnSource {
    fn name(&self) -> &str {
        &self.name
    }
    fn signature(&self) -> &Signature {
        &self.signature
    }
    fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}

#[async_trait]
impl Source for FnSource {
    fn depletable(&self) -> bool {
        self.depletable
    }
    async fn generate(&self, context: &Context, args: &Args) -> Result<Vec<String>> {
        (self.f)(context, args)
    }
}

pub struct FnPipe {
    name: String,
    signature: Signature,
    hint: Option<String>,
    f: Box<PipeFn>,
}

impl FnPipe {
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        f: impl Fn(Vec<String>, &Args) -> Result<Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        FnPipe {
            name: name.into(),
            signature,
            hint: None,
            f: Box::new(f),
        }
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Descriptor for FnPipe {
    fn name(&self) -> &str {
        &self.name
    }
    fn signature(&self) -> &Signature {
        &self.signature
    }
    fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}

#[async_trait]
impl Pipe for FnPipe {
    async fn apply(&self, items: Vec<String>, args: &Args) -> Result<Vec<String>> {
        (self.f)(items, args)
    }
}

pub struct FnSpout {
    name: String,
    signature: Signature,
    mode: SpoutMode,
    f: Box<SpoutFn>,
}

impl FnSpout {
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        f: impl Fn(&Context, Vec<SpoutCall>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        FnSpout {
            name: name.into(),
            signature,
            mode: SpoutMode::Simple,
            f: Box::new(f),
        }
    }

    pub fn aggregated(mut self) -> Self {
        self.mode = SpoutMode::Aggregated;
        self
    }
}

impl Descriptor for FnSpout {
    fn name(&self) -> &str {
        &self.name
    }
    fn signature(&self) -> &Signature {
        &self.signature
    }
}

#[async_trait]
impl Spout for FnSpout {
    fn mode(&self) -> SpoutMode {
        self.mode
    }
    async fn run(&self, context: &Context, calls: Vec<SpoutCall>) -> Result<()> {
        (self.f)(context, calls)
    }
}
