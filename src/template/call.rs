use super::{Amount, CallSegment};
use crate::imports::*;

fn to_arguments(args: &Args) -> HashMap<String, String> {
    args.iter().map(|(k, v)| (k.clone(), v.to_item())).collect()
}

impl CallSegment {
    /// Resolves the call and produces its values.
    ///
    /// Lookup order: `arg`, native source, native pipe, source macro, pipe macro,
    /// scope variable, context argument.
    pub(crate) fn evaluate<'a>(
        &'a self,
        context: &'a Context,
        scope: &'a ItemScope<'a>,
    ) -> BoxFuture<'a, Diagnosed<Vec<String>>> {
        Box::pin(async move {
            let runtime = context.runtime();
            let name = self.name.as_str();
            tracing::debug!(callee = %name, "Evaluating call segment");

            if name == "arg" {
                return self.argument(context, scope).await;
            }
            if let Some(source) = runtime.natives().source(name) {
                return self.native_source(source.clone(), context, scope).await;
            }
            if let Some(pipe) = runtime.natives().pipe(name) {
                return self.native_pipe(pipe.clone(), context, scope).await;
            }
            if let Some(macro_) = runtime.macros(MacroKind::Source).get(name).await {
                return self.source_macro(&macro_, context, scope).await;
            }
            if let Some(macro_) = runtime.macros(MacroKind::Pipe).get(name).await {
                return self.pipe_macro(&macro_, context, scope).await;
            }
            if self.args.is_empty() && self.amount.is_none() {
                if let Some(value) = scope.variable(name) {
                    return Ok((vec![value.to_string()], ErrorLog::new()));
                }
                if let Some(value) = context.argument(name) {
                    return Ok((vec![value.to_string()], ErrorLog::new()));
                }
            }
            Err(ErrorLog::fatal(format!("Unknown source `{name}`")))
        })
    }

    fn ignore_amount(&self, errors: &mut ErrorLog) {
        if self.amount.is_some() {
            errors.warn(format!("`{}` does not take an amount, ignoring it", self.name));
        }
    }

    /// Refuses `{N name}` above the configured limit before anything is generated.
    fn check_amount(&self, context: &Context) -> std::result::Result<(), ErrorLog> {
        let limit = context.settings().max_repeat;
        match self.amount {
            Some(Amount::Count(n)) if n > limit => Err(ErrorLog::fatal(format!(
                "Amount {n} for `{}` exceeds the limit of {limit}",
                self.name
            ))),
            _ => Ok(()),
        }
    }

    /// `{arg name}` reads an argument of the macro or event being executed.
    async fn argument(&self, context: &Context, scope: &ItemScope<'_>) -> Diagnosed<Vec<String>> {
        let mut errors = ErrorLog::new();
        self.ignore_amount(&mut errors);
        let Some(remainder) = self.args.remainder() else {
            return Err(errors.fail("`arg` needs the name of an argument"));
        };
        let name = errors.merge(remainder.evaluate(context, scope).await, None)?;
        match context.argument(name.trim()) {
            Some(value) => errors.into_result(vec![value.to_string()]),
            None => Err(errors.fail(format!("No argument named `{}`", name.trim()))),
        }
    }

    async fn native_source(
        &self,
        source: Arc<dyn Source>,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<Vec<String>> {
        self.check_amount(context)?;
        let mut errors = ErrorLog::new();
        let bound = errors.merge(self.args.bind(source.signature(), true), None)?;
        let mut args = errors.merge(bound.determine(context, scope).await, None)?;

        let takes_n = source.signature().get("n").is_some();
        let mut repeat = 1;
        match self.amount {
            Some(Amount::All) if !source.depletable() => {
                return Err(errors.fail(format!(
                    "Source `{}` cannot produce ALL of its items",
                    self.name
                )));
            }
            Some(Amount::All) => {
                args.insert("n".to_string(), ArgValue::from(-1));
            }
            Some(Amount::Count(n)) if takes_n => {
                args.insert("n".to_string(), ArgValue::from(n));
            }
            Some(Amount::Count(n)) => repeat = n,
            None => {}
        }

        let mut values = Vec::new();
        for _ in 0..repeat {
            match source.generate(context, &args).await {
                Ok(items) => values.extend(items),
                Err(e) => {
                    return Err(errors.fail(format!(
                        "Failed to generate from source `{}`: {e:#}",
                        self.name
                    )));
                }
            }
        }
        errors.into_result(values)
    }

    /// A pipe used as a source receives its evaluated remainder as the single input item.
    async fn native_pipe(
        &self,
        pipe: Arc<dyn Pipe>,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<Vec<String>> {
        let mut errors = ErrorLog::new();
        self.ignore_amount(&mut errors);
        let bound = errors.merge(self.args.bind(pipe.signature(), false), None)?;
        let args = errors.merge(bound.determine(context, scope).await, None)?;
        let input = match bound.remainder() {
            Some(remainder) => vec![errors.merge(remainder.evaluate(context, scope).await, None)?],
            None => Vec::new(),
        };
        match pipe.apply(input, &args).await {
            Ok(items) => errors.into_result(items),
            Err(e) => Err(errors.fail(format!("Failed to process pipe `{}`: {e:#}", self.name))),
        }
    }

    async fn source_macro(
        &self,
        macro_: &Macro,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<Vec<String>> {
        self.check_amount(context)?;
        let mut errors = ErrorLog::new();
        let repeat = match self.amount {
            Some(Amount::All) => {
                return Err(errors.fail(format!(
                    "Source macro `{}` cannot produce ALL of its items",
                    self.name
                )));
            }
            Some(Amount::Count(n)) => n,
            None => 1,
        };
        let bound = errors.merge(self.args.bind(&macro_.signature(), true), None)?;
        let args = errors.merge(bound.determine(context, scope).await, None)?;
        let inner = errors.merge(
            context.into_macro(macro_, to_arguments(&args)).map(|c| (c, ErrorLog::new())),
            None,
        )?;

        let script = context.runtime().script(&macro_.code);
        let mut values = Vec::new();
        for _ in 0..repeat {
            values.extend(errors.merge(script.evaluate(&inner).await, None)?);
        }
        errors.into_result(values)
    }

    async fn pipe_macro(
        &self,
        macro_: &Macro,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<Vec<String>> {
        let mut errors = ErrorLog::new();
        self.ignore_amount(&mut errors);
        let bound = errors.merge(self.args.bind(&macro_.signature(), false), None)?;
        let args = errors.merge(bound.determine(context, scope).await, None)?;
        let input = match bound.remainder() {
            Some(remainder) => vec![errors.merge(remainder.evaluate(context, scope).await, None)?],
            None => Vec::new(),
        };
        let inner = errors.merge(
            context.into_macro(macro_, to_arguments(&args)).map(|c| (c, ErrorLog::new())),
            None,
        )?;

        let pipeline = context.runtime().pipeline(&macro_.code);
        let (items, pipeline_errors, _) = pipeline.apply(input, &inner, None).await;
        errors.extend(pipeline_errors, None);
        errors.into_result(items)
    }
}
