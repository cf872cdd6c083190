use crate::imports::*;

pub mod closures;
pub mod traits;

/*
    Types:
    * Native - A registered callable of any capability
    * Registry - Native callables indexed by their lowercase name
*/

#[derive(Clone)]
pub enum Native {
    Source(Arc<dyn Source>),
    Pipe(Arc<dyn Pipe>),
    Spout(Arc<dyn Spout>),
}

impl Native {
    pub fn name(&self) -> &str {
        match self {
            Native::Source(s) => s.name(),
            Native::Pipe(p) => p.name(),
            Native::Spout(s) => s.name(),
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            Native::Source(s) => s.signature(),
            Native::Pipe(p) => p.signature(),
            Native::Spout(s) => s.signature(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Native::Source(_) => "source",
            Native::Pipe(_) => "pipe",
            Native::Spout(_) => "spout",
        }
    }
}

impl std::fmt::Debug for Native {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} `{}`", self.kind(), self.name())
    }
}

/// `[_a-z][_a-z0-9]*`, the shape of every callable and macro name.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('_' | 'a'..='z'))
        && chars.all(|c| matches!(c, '_' | 'a'..='z' | '0'..='9'))
}

/// Names the pipeline treats specially and which can't be registered.
const RESERVED: &[&str] = &["arg", "nop", "print"];

#[derive(Default)]
pub struct Registry {
    sources: HashMap<String, Arc<dyn Source>>,
    pipes: HashMap<String, Arc<dyn Pipe>>,
    spouts: HashMap<String, Arc<dyn Spout>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sources", &self.sources.len())
            .field("pipes", &self.pipes.len())
            .field("spouts", &self.spouts.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_name(&self, name: &str) -> Result<String> {
        let name = name.to_lowercase();
        if !is_valid_name(&name) {
            anyhow::bail!("`{name}` is not a valid name, use lowercase letters, digits and underscores");
        }
        if RESERVED.contains(&name.as_str()) {
            anyhow::bail!("`{name}` is reserved");
        }
        if let Some(existing) = self.resolve(&name) {
            anyhow::bail!("`{name}` is already registered as a {}", existing.kind());
        }
        Ok(name)
    }

    pub fn add_source(&mut self, source: impl Source + 'static) -> Result<()> {
        let name = self.check_name(source.name())?;
        tracing::debug!(callee = %name, "Registered native source");
        self.sources.insert(name, Arc::new(source));
        Ok(())
    }

    pub fn add_pipe(&mut self, pipe: impl Pipe + 'static) -> Result<()> {
        let name = self.check_name(pipe.name())?;
        tracing::debug!(callee = %name, "Registered native pipe");
        self.pipes.insert(name, Arc::new(pipe));
        Ok(())
    }

    pub fn add_spout(&mut self, spout: impl Spout + 'static) -> Result<()> {
        let name = self.check_name(spout.name())?;
        tracing::debug!(callee = %name, "Registered native spout");
        self.spouts.insert(name, Arc::new(spout));
        Ok(())
    }

    /// Registers an already shared spout, for hosts that keep a handle to it.
    pub fn add_shared_spout(&mut self, spout: Arc<dyn Spout>) -> Result<()> {
        let name = self.check_name(spout.name())?;
        self.spouts.insert(name, spout);
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(name)
    }

    pub fn pipe(&self, name: &str) -> Option<&Arc<dyn Pipe>> {
        self.pipes.get(name)
    }

    pub fn spout(&self, name: &str) -> Option<&Arc<dyn Spout>> {
        self.spouts.get(name)
    }

    /// Looks a name up the way a pipeline step does: pipes, then spouts, then sources.
    pub fn resolve(&self, name: &str) -> Option<Native> {
        if let Some(pipe) = self.pipes.get(name) {
            return Some(Native::Pipe(pipe.clone()));
        }
        if let Some(spout) = self.spouts.get(name) {
            return Some(Native::Spout(spout.clone()));
        }
        self.sources.get(name).map(|s| Native::Source(s.clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pipes.contains_key(name) || self.spouts.contains_key(name) || self.sources.contains_key(name)
    }

    /// Every registered name, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .sources
            .keys()
            .chain(self.pipes.keys())
            .chain(self.spouts.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sources.len() + self.pipes.len() + self.spouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
