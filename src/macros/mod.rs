use crate::imports::*;
use crate::registry::is_valid_name;
use crate::services::persist::Persistence;
use serde::{Deserialize, Serialize};

pub mod analysis;

/*
    Types:
    * MacroKind - Whether a macro stands in for a pipe or a source
    * MacroParam - One declared parameter, all parameters are strings
    * Macro - A named, stored script resolvable like a native callable
    * MacroRegistry - The macros of one kind, written through on every change
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacroKind {
    Pipe,
    Source,
}

impl std::fmt::Display for MacroKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacroKind::Pipe => write!(f, "pipe macro"),
            MacroKind::Source => write!(f, "source macro"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroParam {
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
}

fn visible_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    pub kind: MacroKind,
    pub name: String,
    pub code: String,
    pub author_id: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default)]
    pub signature: Vec<MacroParam>,
}

impl Macro {
    pub fn new(
        kind: MacroKind,
        name: impl Into<String>,
        code: impl Into<String>,
        author_id: impl Into<String>,
    ) -> Self {
        Macro {
            kind,
            name: name.into(),
            code: code.into(),
            author_id: author_id.into(),
            author_name: None,
            desc: None,
            visible: true,
            signature: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, default: Option<&str>, desc: Option<&str>) -> Self {
        self.signature.push(MacroParam {
            name: name.to_lowercase(),
            default: default.map(str::to_string),
            desc: desc.map(str::to_string),
        });
        self
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// String parameters; a default makes a parameter optional.
    pub fn signature(&self) -> Signature {
        self.signature.iter().fold(Signature::new(), |signature, param| {
            let mut declared = Param::new(&param.name, ParamType::String);
            if let Some(default) = &param.default {
                declared = declared.default(default.as_str());
            }
            if let Some(desc) = &param.desc {
                declared = declared.hint(desc);
            }
            signature.param(declared)
        })
    }
}

pub struct MacroRegistry {
    kind: MacroKind,
    macros: RwLock<BTreeMap<String, Macro>>,
    persistence: Persistence,
}

impl std::fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroRegistry").field("kind", &self.kind).finish()
    }
}

impl MacroRegistry {
    pub(crate) fn new(kind: MacroKind, persistence: Persistence) -> Self {
        MacroRegistry {
            kind,
            macros: RwLock::new(BTreeMap::new()),
            persistence,
        }
    }

    pub fn kind(&self) -> MacroKind {
        self.kind
    }

    fn registry_name(&self) -> String {
        format!("{}s", self.kind)
    }

    async fn write(&self) {
        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "Failed to snapshot macros");
                return;
            }
        };
        self.persistence.write(&self.registry_name(), snapshot).await;
    }

    /// Adds a new macro. Names are lowercased and must be unused within this kind.
    pub async fn define(&self, mut macro_: Macro) -> Result<()> {
        macro_.name = macro_.name.to_lowercase();
        if macro_.kind != self.kind {
            anyhow::bail!("`{}` is a {}, not a {}", macro_.name, macro_.kind, self.kind);
        }
        if !is_valid_name(&macro_.name) {
            anyhow::bail!("`{}` is not a valid macro name", macro_.name);
        }
        {
            let mut macros = self.macros.write().await;
            if macros.contains_key(&macro_.name) {
                anyhow::bail!("A {} named `{}` already exists", self.kind, macro_.name);
            }
            tracing::debug!(macro_name = %macro_.name, kind = %self.kind, "Defined macro");
            macros.insert(macro_.name.clone(), macro_);
        }
        self.write().await;
        Ok(())
    }

    /// Edits a macro in place. The name and kind can't be changed.
    ///
    /// No static checks happen here; `Runtime::edit_macro` checks the code first.
    pub async fn edit(&self, name: &str, edit: impl FnOnce(&mut Macro)) -> Result<()> {
        {
            let mut macros = self.macros.write().await;
            let macro_ = macros
                .get_mut(name)
                .with_context(|| format!("No {} named `{name}`", self.kind))?;
            let (kind, name) = (macro_.kind, macro_.name.clone());
            edit(macro_);
            macro_.kind = kind;
            macro_.name = name;
        }
        self.write().await;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<Macro> {
        let removed = self
            .macros
            .write()
            .await
            .remove(name)
            .with_context(|| format!("No {} named `{name}`", self.kind))?;
        self.write().await;
        Ok(removed)
    }

    /// A copy of the macro as it is right now; later edits don't affect it.
    pub async fn get(&self, name: &str) -> Option<Macro> {
        self.macros.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.macros.read().await.contains_key(name)
    }

    pub async fn visible(&self) -> Vec<Macro> {
        self.macros.read().await.values().filter(|m| m.visible).cloned().collect()
    }

    pub async fn hidden(&self) -> Vec<Macro> {
        self.macros.read().await.values().filter(|m| !m.visible).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.macros.read().await.len()
    }

    pub(crate) async fn all(&self) -> BTreeMap<String, Macro> {
        self.macros.read().await.clone()
    }

    pub async fn snapshot(&self) -> Result<serde_json::Value> {
        let macros: Vec<Macro> = self.macros.read().await.values().cloned().collect();
        serde_json::to_value(macros).context("Failed to serialize macros")
    }

    /// Replaces the contents with a snapshot, without writing it back.
    pub async fn load(&self, snapshot: serde_json::Value) -> Result<usize> {
        let loaded: Vec<Macro> =
            serde_json::from_value(snapshot).context("Failed to deserialize macros")?;
        let mut macros = self.macros.write().await;
        macros.clear();
        for macro_ in loaded {
            if macro_.kind != self.kind {
                anyhow::bail!("`{}` is a {}, not a {}", macro_.name, macro_.kind, self.kind);
            }
            macros.insert(macro_.name.to_lowercase(), macro_);
        }
        tracing::debug!(kind = %self.kind, count = macros.len(), "Loaded macros");
        Ok(macros.len())
    }
}
