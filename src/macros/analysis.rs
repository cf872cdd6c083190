//! Non-executing checks of scripts and macros.
//!
//! Both macro registries are snapshotted once, then every reachable macro body is
//! parsed and walked depth-first. Nothing is evaluated and no native is invoked.

use crate::imports::*;
use crate::pipeline::Branch;

struct Analyzer<'r> {
    natives: &'r Registry,
    runtime: &'r Runtime,
    pipes: BTreeMap<String, Macro>,
    sources: BTreeMap<String, Macro>,
    visiting: Vec<(MacroKind, String)>,
    done: HashSet<(MacroKind, String)>,
}

impl<'r> Analyzer<'r> {
    async fn new(runtime: &'r Runtime) -> Self {
        Analyzer {
            natives: runtime.natives(),
            runtime,
            pipes: runtime.macros(MacroKind::Pipe).all().await,
            sources: runtime.macros(MacroKind::Source).all().await,
            visiting: Vec::new(),
            done: HashSet::new(),
        }
    }

    fn lookup(&self, kind: MacroKind, name: &str) -> Option<&Macro> {
        match kind {
            MacroKind::Pipe => self.pipes.get(name),
            MacroKind::Source => self.sources.get(name),
        }
    }

    fn visit(&mut self, kind: MacroKind, name: &str) -> ErrorLog {
        let mut errors = ErrorLog::new();
        if let Some(start) = self.visiting.iter().position(|(k, n)| *k == kind && n == name) {
            let mut cycle: Vec<&str> = self.visiting[start..].iter().map(|(_, n)| n.as_str()).collect();
            cycle.push(name);
            errors.log(format!("Recursive macro reference {}", cycle.join(" → ")), true);
            return errors;
        }
        if !self.done.insert((kind, name.to_string())) {
            return errors;
        }
        let Some(code) = self.lookup(kind, name).map(|m| m.code.clone()) else {
            return errors;
        };

        self.visiting.push((kind, name.to_string()));
        let label = format!("{kind} `{name}`");
        let body = match kind {
            MacroKind::Pipe => {
                let pipeline = self.runtime.pipeline(&code);
                self.pipeline(&pipeline)
            }
            MacroKind::Source => {
                let script = self.runtime.script(&code);
                self.script(&script)
            }
        };
        errors.extend(body, Some(&label));
        self.visiting.pop();
        errors
    }

    fn script(&mut self, script: &PipelineWithOrigin) -> ErrorLog {
        let mut errors = ErrorLog::new();
        errors.extend(script.origin_errors().clone(), Some("origin"));
        let origin = self.template(script.origin());
        errors.extend(origin, Some("origin"));
        let pipeline = self.pipeline(script.pipeline());
        errors.extend(pipeline, None);
        errors
    }

    fn pipeline(&mut self, pipeline: &Pipeline) -> ErrorLog {
        let mut errors = ErrorLog::new();
        errors.extend(pipeline.parse_errors().clone(), None);

        for step in pipeline.steps() {
            let mut step_errors = ErrorLog::new();
            for condition in step.mode.conditions() {
                for template in condition.templates() {
                    step_errors.extend(self.template(template), None);
                }
            }
            for branch in &step.branches {
                match branch {
                    Branch::Inline(inner) => {
                        step_errors.extend(self.pipeline(inner), None);
                    }
                    Branch::Call(call) => {
                        for template in call.args.templates() {
                            step_errors.extend(self.template(template), None);
                        }
                        step_errors.extend(self.pipe_callee(&call.name), None);
                    }
                }
            }
            errors.extend(step_errors, Some(&format!("`{}`", step.text)));
        }
        errors
    }

    fn pipe_callee(&mut self, name: &str) -> ErrorLog {
        if matches!(name, "" | "nop" | "print") || self.natives.contains(name) {
            return ErrorLog::new();
        }
        if self.pipes.contains_key(name) {
            return self.visit(MacroKind::Pipe, name);
        }
        if self.sources.contains_key(name) {
            return self.visit(MacroKind::Source, name);
        }
        let mut errors = ErrorLog::new();
        errors.warn(format!("Unknown pipe `{name}`"));
        errors
    }

    /// Call segments may also name variables or arguments, so unknown names are not reported.
    fn template(&mut self, template: &TemplatedString) -> ErrorLog {
        let mut errors = ErrorLog::new();
        for call in template.calls() {
            let name = call.name.as_str();
            if name == "arg" || self.natives.contains(name) {
                continue;
            }
            let kind = if self.sources.contains_key(name) {
                MacroKind::Source
            } else if self.pipes.contains_key(name) {
                MacroKind::Pipe
            } else {
                continue;
            };
            errors.extend(self.visit(kind, name), Some(&format!("source `{name}`")));
        }
        for inline in template.inline_scripts() {
            errors.extend(self.script(&inline.script), Some("inline script"));
        }
        errors
    }
}

/// Static errors of a macro's body, including those of every macro it reaches.
///
/// The macro doesn't need to be defined yet; a definition with the same name
/// replaces the registered one for the purpose of the check.
#[tracing::instrument(skip_all, fields(macro_name = %macro_.name))]
pub async fn get_static_errors(runtime: &Runtime, macro_: &Macro) -> ErrorLog {
    let mut analyzer = Analyzer::new(runtime).await;
    let name = macro_.name.to_lowercase();
    match macro_.kind {
        MacroKind::Pipe => analyzer.pipes.insert(name.clone(), macro_.clone()),
        MacroKind::Source => analyzer.sources.insert(name.clone(), macro_.clone()),
    };
    let errors = analyzer.visit(macro_.kind, &name);
    tracing::debug!(entries = errors.len(), terminal = errors.is_terminal(), "Analyzed macro");
    errors
}

/// Static errors of a full script (origin and pipeline), as run directly or by an event.
#[tracing::instrument(skip_all)]
pub async fn script_static_errors(runtime: &Runtime, script: &str) -> ErrorLog {
    let mut analyzer = Analyzer::new(runtime).await;
    let parsed = runtime.script(script);
    analyzer.script(&parsed)
}
