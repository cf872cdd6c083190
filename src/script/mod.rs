use crate::grammar::split::split_origin;
use crate::imports::*;

pub(crate) mod cache;

/*
    Types:
    * PipelineWithOrigin - A full script: the origin producing the first items, and the pipeline they go through
    * ExecutionReport - What an execution produced, printed and reported
*/

#[derive(Debug, Clone, Default)]
pub struct PipelineWithOrigin {
    source: String,
    origin: TemplatedString,
    origin_errors: ErrorLog,
    pipeline: Arc<Pipeline>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Final items, empty when execution failed.
    pub items: Vec<String>,
    pub errors: ErrorLog,
    /// The print table as delivered, if anything was printed.
    pub printed: Option<String>,
    pub diagnostic: Option<Diagnostic>,
}

impl ExecutionReport {
    pub fn is_terminal(&self) -> bool {
        self.errors.is_terminal()
    }
}

fn strip_quotes(text: &str) -> &str {
    match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) => inner,
        None => text,
    }
}

impl PipelineWithOrigin {
    /// Parses a script. Never fails: problems are kept and reported on execution.
    pub fn parse(script: &str) -> PipelineWithOrigin {
        let (origin, pipeline) = match split_origin(script) {
            Ok(parts) => parts,
            Err(errors) => {
                return PipelineWithOrigin {
                    source: script.to_string(),
                    origin_errors: errors,
                    ..Default::default()
                };
            }
        };

        let (origin, origin_errors) = match TemplatedString::parse(strip_quotes(&origin)) {
            Ok(origin) => (origin, ErrorLog::new()),
            Err(errors) => (TemplatedString::default(), errors),
        };
        PipelineWithOrigin {
            source: script.to_string(),
            origin,
            origin_errors,
            pipeline: Arc::new(Pipeline::parse(&pipeline)),
        }
    }

    /// The origin text and the pipeline text, as `parse` sees them.
    pub fn split(script: &str) -> std::result::Result<(String, String), ErrorLog> {
        split_origin(script)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn origin(&self) -> &TemplatedString {
        &self.origin
    }

    pub fn origin_errors(&self) -> &ErrorLog {
        &self.origin_errors
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Every error found while parsing the origin and the pipeline.
    pub fn parse_errors(&self) -> ErrorLog {
        let mut errors = ErrorLog::new();
        errors.extend(self.origin_errors.clone(), Some("origin"));
        errors.extend(self.pipeline.parse_errors().clone(), None);
        errors
    }

    async fn run(
        &self,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> (Vec<String>, ErrorLog, SpoutState) {
        let mut errors = ErrorLog::new();
        errors.extend(self.origin_errors.clone(), Some("origin"));
        if errors.is_terminal() {
            return (Vec::new(), errors, SpoutState::new());
        }

        let items = match self.origin.evaluate_values(context, scope).await {
            Ok((items, warnings)) => {
                errors.extend(warnings, Some("origin"));
                items
            }
            Err(log) => {
                errors.extend(log, Some("origin"));
                return (Vec::new(), errors, SpoutState::new());
            }
        };
        tracing::debug!(items = items.len(), "Evaluated origin");

        let (items, log, spouts) = self.pipeline.apply(items, context, Some(scope)).await;
        errors.extend(log, None);
        (items, errors, spouts)
    }

    /// Runs the script for its items only, as a source macro does. Spouts are not performed.
    pub async fn evaluate(&self, context: &Context) -> Diagnosed<Vec<String>> {
        self.evaluate_in(context, &ItemScope::default()).await
    }

    /// Like `evaluate`, with `scope` as the outer scope, so `{0}` in the origin and
    /// `{^0}` in the pipeline see its items.
    pub async fn evaluate_in(&self, context: &Context, scope: &ItemScope<'_>) -> Diagnosed<Vec<String>> {
        let (items, errors, _) = self.run(context, scope).await;
        errors.into_result(items)
    }

    /// Runs the script and performs its side effects: the previous-output slot,
    /// spout callbacks, printing and reporting the error log.
    #[tracing::instrument(skip_all, fields(origin = %context.origin().name, channel = ?context.channel()))]
    pub async fn execute(&self, context: &Context, scope: &ItemScope<'_>) -> ExecutionReport {
        let runtime = context.runtime();
        let services = runtime.services();
        let started_at = Instant::now();

        let started = hook_events::ScriptStarted {
            origin: context.origin().kind,
            origin_name: context.origin().name.clone(),
            channel: context.channel().map(str::to_string),
            script: self.source.clone(),
        };
        if let Err(e) = services.before_execute_script(started).await {
            tracing::warn!(error = %format!("{e:#}"), "before_execute_script hook failed");
        }

        let (items, mut errors, mut spouts) = self.run(context, scope).await;
        let terminal = errors.is_terminal();

        if !terminal
            && context.origin().kind == OriginKind::Direct
            && let Some(channel) = context.channel()
        {
            runtime.set_previous_output(channel, items.clone()).await;
        }

        for pending in spouts.take_callbacks() {
            let name = pending.spout.name().to_string();
            if let Err(e) = pending.spout.run(context, pending.calls).await {
                errors.warn(format!("Failed to execute spout `{name}`: {e:#}"));
            }
        }

        let mut printed = None;
        if !terminal && (!spouts.print_values().is_empty() || !spouts.spouted()) {
            let mut columns = spouts.print_values().to_vec();
            columns.push(items.clone());
            let text = render_print_values(&columns);
            if let Err(e) = services.deliver(context.channel(), &text).await {
                tracing::warn!(error = %format!("{e:#}"), "Failed to deliver output");
            }
            printed = Some(text);
        }

        let diagnostic = errors.render(Some(&context.origin().name));
        if let Some(diagnostic) = &diagnostic
            && let Err(e) = services.report(context.channel(), diagnostic).await
        {
            tracing::warn!(error = %format!("{e:#}"), "Failed to report error log");
        }

        let finished = hook_events::ScriptFinished {
            origin_name: context.origin().name.clone(),
            channel: context.channel().map(str::to_string),
            items: items.len(),
            terminal,
            warnings: errors.entries().iter().filter(|e| !e.terminal).count(),
            started_at,
            finished_at: Instant::now(),
        };
        if let Err(e) = services.after_execute_script(finished).await {
            tracing::warn!(error = %format!("{e:#}"), "after_execute_script hook failed");
        }

        ExecutionReport {
            items,
            errors,
            printed,
            diagnostic,
        }
    }
}

/// Lays columns of items out side by side, joined by arrows where the next column continues the row.
///
/// A lone value is shown as is; a lone blank value or a lone empty column get a placeholder.
pub fn render_print_values(columns: &[Vec<String>]) -> String {
    if let [column] = columns {
        match column.as_slice() {
            [] => return "`no output`".to_string(),
            [cell] if cell.trim().is_empty() => return "`empty string`".to_string(),
            [cell] => return cell.clone(),
            _ => {}
        }
    }

    let row_count = columns.iter().map(Vec::len).max().unwrap_or(0);
    let mut rows = vec![String::new(); row_count];
    for (c, column) in columns.iter().enumerate() {
        if column.is_empty() {
            continue;
        }
        let width = column.iter().map(|cell| cell.chars().count()).max().unwrap_or(0);
        for (r, row) in rows.iter_mut().enumerate() {
            let cell = column.get(r).map(String::as_str).unwrap_or("");
            row.push_str(cell);
            row.push_str(&" ".repeat(width - cell.chars().count()));
            let continues = columns.get(c + 1).is_some_and(|next| r < next.len());
            row.push_str(if continues { " → " } else { "   " });
        }
    }
    rows.iter()
        .map(|row| row.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests;
