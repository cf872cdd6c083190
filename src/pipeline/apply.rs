use super::{Branch, ParsedCall, Pipeline, Step};
use crate::imports::*;
use tracing::Instrument;

fn total_chars(items: &[String]) -> usize {
    items.iter().map(|item| item.chars().count()).sum()
}

fn to_arguments(args: &Args) -> HashMap<String, String> {
    args.iter().map(|(k, v)| (k.clone(), v.to_item())).collect()
}

fn check_size(items: &[String], context: &Context) -> std::result::Result<(), ErrorLog> {
    let limit = context.settings().max_chars;
    let total = total_chars(items);
    if total > limit {
        return Err(ErrorLog::fatal(format!(
            "Too many characters in flight: {total} exceeds the limit of {limit}"
        )));
    }
    Ok(())
}

impl Pipeline {
    /// Threads `items` through every step.
    ///
    /// Always returns the spout state gathered so far, even when a step fails, so
    /// callbacks queued before the failure can still be performed.
    pub fn apply<'a>(
        &'a self,
        items: Vec<String>,
        context: &'a Context,
        parent: Option<&'a ItemScope<'a>>,
    ) -> BoxFuture<'a, (Vec<String>, ErrorLog, SpoutState)> {
        let span = tracing::debug_span!("pipeline", steps = self.steps.len(), items = items.len());
        Box::pin(
            async move {
                let mut errors = ErrorLog::new();
                let mut spouts = SpoutState::new();

                errors.extend(self.parse_errors.clone(), None);
                if errors.is_terminal() {
                    return (Vec::new(), errors, spouts);
                }

                let mut items = items;
                for (index, step) in self.steps.iter().enumerate() {
                    let label = format!("`{}`", step.text);
                    if let Err(log) = check_size(&items, context) {
                        errors.extend(log, Some(&label));
                        return (Vec::new(), errors, spouts);
                    }
                    tracing::debug!(step = index, items = items.len(), "Applying step");

                    match step.apply(items, context, parent, &mut spouts).await {
                        Ok((output, warnings)) => {
                            errors.extend(warnings, Some(&label));
                            items = output;
                        }
                        Err(log) => {
                            errors.extend(log, Some(&label));
                            tracing::debug!(step = index, "Pipeline halted");
                            return (Vec::new(), errors, spouts);
                        }
                    }
                }

                if let Err(log) = check_size(&items, context) {
                    errors.extend(log, None);
                    return (Vec::new(), errors, spouts);
                }
                (items, errors, spouts)
            }
            .instrument(span),
        )
    }
}

impl Step {
    async fn apply(
        &self,
        items: Vec<String>,
        context: &Context,
        parent: Option<&ItemScope<'_>>,
        spouts: &mut SpoutState,
    ) -> Diagnosed<Vec<String>> {
        let mut errors = ErrorLog::new();
        let step_scope = ItemScope::under(parent, items.clone());
        let plan = errors.merge(
            self.mode
                .plan(items, self.branches.len(), context, &step_scope)
                .await,
            None,
        )?;
        let trivial = self.mode.is_trivial();

        let mut outputs = Vec::with_capacity(plan.groups().len());
        for group in plan.groups() {
            let targets: Vec<&Branch> = match group.route {
                Route::Pass => {
                    outputs.push(group.items.clone());
                    continue;
                }
                Route::Branch(b) => self.branches.get(b).into_iter().collect(),
                Route::Every => self.branches.iter().collect(),
            };

            let mut output = Vec::new();
            for branch in targets {
                // fresh scope per invocation so item marks don't leak between groups
                let scope = if trivial {
                    ItemScope::under(parent, group.items.clone())
                } else {
                    step_scope.child(group.items.clone())
                };
                output.extend(errors.merge(branch.apply(context, &scope, spouts).await, None)?);
            }
            outputs.push(output);
        }
        errors.into_result(plan.assemble(outputs))
    }
}

impl Branch {
    async fn apply(
        &self,
        context: &Context,
        scope: &ItemScope<'_>,
        spouts: &mut SpoutState,
    ) -> Diagnosed<Vec<String>> {
        match self {
            Branch::Call(call) => call.apply(context, scope, spouts).await,
            Branch::Inline(pipeline) => {
                let (items, errors, nested) = pipeline
                    .apply(scope.items().to_vec(), context, Some(scope))
                    .await;
                spouts.extend(nested);
                errors.into_result(items)
            }
        }
    }
}

impl ParsedCall {
    /// Dispatches on the callee name: `nop`, `print`, native pipe, native spout,
    /// native source, pipe macro, source macro.
    async fn apply(
        &self,
        context: &Context,
        scope: &ItemScope<'_>,
        spouts: &mut SpoutState,
    ) -> Diagnosed<Vec<String>> {
        let name = self.name.as_str();
        let runtime = context.runtime();
        tracing::debug!(callee = %name, items = scope.items().len(), "Calling");

        match name {
            "" | "nop" => return Ok((scope.items().to_vec(), ErrorLog::new())),
            "print" => {
                spouts.print(scope.items().to_vec());
                return Ok((scope.items().to_vec(), ErrorLog::new()));
            }
            _ => {}
        }

        if let Some(native) = runtime.natives().resolve(name) {
            let mut errors = ErrorLog::new();
            let bound = errors.merge(self.args.bind(native.signature(), true), None)?;
            let args = errors.merge(bound.determine(context, scope).await, None)?;
            let (mut output, input) = scope.extract_ignored();

            let result = match native {
                Native::Pipe(pipe) => pipe.apply(input, &args).await,
                Native::Spout(spout) => {
                    spouts.hook(spout, input.clone(), args);
                    Ok(input)
                }
                Native::Source(source) => source.generate(context, &args).await,
            };
            return match result {
                Ok(items) => {
                    output.extend(items);
                    errors.into_result(output)
                }
                Err(e) => Err(errors.fail(format!("Failed to process pipe `{name}`: {e:#}"))),
            };
        }

        if let Some(macro_) = runtime.macros(MacroKind::Pipe).get(name).await {
            return self.pipe_macro(&macro_, context, scope, spouts).await;
        }
        if let Some(macro_) = runtime.macros(MacroKind::Source).get(name).await {
            return self.source_macro(&macro_, context, scope).await;
        }
        Err(ErrorLog::fatal(format!("Unknown pipe `{name}`")))
    }

    async fn pipe_macro(
        &self,
        macro_: &Macro,
        context: &Context,
        scope: &ItemScope<'_>,
        spouts: &mut SpoutState,
    ) -> Diagnosed<Vec<String>> {
        let mut errors = ErrorLog::new();
        let bound = errors.merge(self.args.bind(&macro_.signature(), true), None)?;
        let args = errors.merge(bound.determine(context, scope).await, None)?;
        let (mut output, input) = scope.extract_ignored();
        let inner = errors.merge(
            context
                .into_macro(macro_, to_arguments(&args))
                .map(|inner| (inner, ErrorLog::new())),
            None,
        )?;

        let label = format!("pipe macro `{}`", macro_.name);
        let pipeline = context.runtime().pipeline(&macro_.code);
        let (items, log, nested) = pipeline.apply(input, &inner, None).await;
        spouts.extend(nested);
        errors.extend(log, Some(&label));
        output.extend(items);
        errors.into_result(output)
    }

    /// Source macros in pipe position ignore their input; their side effects are dropped.
    async fn source_macro(
        &self,
        macro_: &Macro,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<Vec<String>> {
        let mut errors = ErrorLog::new();
        let bound = errors.merge(self.args.bind(&macro_.signature(), true), None)?;
        let args = errors.merge(bound.determine(context, scope).await, None)?;
        let (mut output, _) = scope.extract_ignored();
        let inner = errors.merge(
            context
                .into_macro(macro_, to_arguments(&args))
                .map(|inner| (inner, ErrorLog::new())),
            None,
        )?;

        let label = format!("source macro `{}`", macro_.name);
        let script = context.runtime().script(&macro_.code);
        output.extend(errors.merge(script.evaluate(&inner).await, Some(&label))?);
        errors.into_result(output)
    }
}
