use crate::imports::*;

mod call;

/*
    Types:
    * TemplatedString - Literal text interleaved with items, calls and inline conditionals
    * Piece - One segment of a TemplatedString
    * ItemRef - `{0}`, `{^1, 2:}` and friends, one or more scope lookups
    * CallSegment - `{name args}`, `{3 name}`, `{ALL name}`
    * Conditional - `{? a if condition else b}`
    * InlineScript - `{>> origin > pipes}`, a whole script evaluated in place
*/

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplatedString {
    pieces: Vec<Piece>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Text(String),
    Item(ItemRef),
    Call(Box<CallSegment>),
    Conditional(Box<Conditional>),
    InlineScript(Box<InlineScript>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    At(i64),
    /// End-exclusive, either side open.
    Slice(Option<i64>, Option<i64>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemIndex {
    /// How many scopes up to look.
    pub carrots: usize,
    /// Set the item aside instead of consuming it.
    pub bang: bool,
    pub selector: Selector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    indices: Vec<ItemIndex>,
}

impl ItemRef {
    pub fn new(indices: Vec<ItemIndex>) -> Self {
        ItemRef { indices }
    }

    pub fn indices(&self) -> &[ItemIndex] {
        &self.indices
    }

    fn evaluate(&self, scope: &ItemScope<'_>) -> std::result::Result<Vec<String>, String> {
        let mut items = Vec::new();
        for index in &self.indices {
            match index.selector {
                Selector::At(i) => items.push(scope.get_item(index.carrots, i, index.bang)?),
                Selector::Slice(start, end) => {
                    items.extend(scope.get_items(index.carrots, start, end, index.bang)?)
                }
            }
        }
        Ok(items)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    Count(u64),
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallSegment {
    pub amount: Option<Amount>,
    pub name: String,
    pub args: RawArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub case_if: TemplatedString,
    pub condition: Condition,
    pub case_else: TemplatedString,
}

#[derive(Debug, Clone)]
pub struct InlineScript {
    pub source: String,
    pub script: Arc<PipelineWithOrigin>,
}

impl InlineScript {
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        InlineScript {
            source: source.to_string(),
            script: Arc::new(PipelineWithOrigin::parse(source)),
        }
    }
}

impl PartialEq for InlineScript {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl TemplatedString {
    pub fn parse(source: &str) -> std::result::Result<Self, ErrorLog> {
        crate::grammar::parse_template(source)
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::new(vec![Piece::Text(text.into())])
    }

    /// Builds from pieces, merging adjacent text and dropping empty text.
    pub fn new(pieces: Vec<Piece>) -> Self {
        let mut merged: Vec<Piece> = Vec::with_capacity(pieces.len());
        for piece in pieces {
            match (merged.last_mut(), piece) {
                (_, Piece::Text(text)) if text.is_empty() => {}
                (Some(Piece::Text(last)), Piece::Text(text)) => last.push_str(&text),
                (_, piece) => merged.push(piece),
            }
        }
        TemplatedString { pieces: merged }
    }

    pub fn join(parts: &[TemplatedString], separator: &str) -> Self {
        let mut pieces = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                pieces.push(Piece::Text(separator.to_string()));
            }
            pieces.extend(part.pieces.iter().cloned());
        }
        Self::new(pieces)
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// The text, if there is nothing to evaluate.
    pub fn as_literal(&self) -> Option<&str> {
        match self.pieces.as_slice() {
            [] => Some(""),
            [Piece::Text(text)] => Some(text),
            _ => None,
        }
    }

    /// Every call segment, including those nested in arguments and conditionals.
    pub fn calls(&self) -> Vec<&CallSegment> {
        let mut calls = Vec::new();
        self.collect_calls(&mut calls);
        calls
    }

    fn collect_calls<'s>(&'s self, out: &mut Vec<&'s CallSegment>) {
        for piece in &self.pieces {
            match piece {
                Piece::Call(call) => {
                    out.push(call);
                    for template in call.args.templates() {
                        template.collect_calls(out);
                    }
                }
                Piece::Conditional(cond) => {
                    cond.case_if.collect_calls(out);
                    for template in cond.condition.templates() {
                        template.collect_calls(out);
                    }
                    cond.case_else.collect_calls(out);
                }
                Piece::Text(_) | Piece::Item(_) | Piece::InlineScript(_) => {}
            }
        }
    }

    /// Every inline script, including those nested in arguments and conditionals.
    ///
    /// Calls inside an inline script belong to that script and are not listed by `calls`.
    pub fn inline_scripts(&self) -> Vec<&InlineScript> {
        let mut scripts = Vec::new();
        self.collect_inline_scripts(&mut scripts);
        scripts
    }

    fn collect_inline_scripts<'s>(&'s self, out: &mut Vec<&'s InlineScript>) {
        for piece in &self.pieces {
            match piece {
                Piece::InlineScript(inline) => out.push(inline),
                Piece::Call(call) => {
                    for template in call.args.templates() {
                        template.collect_inline_scripts(out);
                    }
                }
                Piece::Conditional(cond) => {
                    cond.case_if.collect_inline_scripts(out);
                    for template in cond.condition.templates() {
                        template.collect_inline_scripts(out);
                    }
                    cond.case_else.collect_inline_scripts(out);
                }
                Piece::Text(_) | Piece::Item(_) => {}
            }
        }
    }

    /// Evaluates every piece into its list of candidate values.
    fn expand<'a>(
        &'a self,
        context: &'a Context,
        scope: &'a ItemScope<'a>,
    ) -> BoxFuture<'a, Diagnosed<Vec<Vec<String>>>> {
        Box::pin(async move {
            let mut errors = ErrorLog::new();
            let mut values = Vec::with_capacity(self.pieces.len());

            for piece in &self.pieces {
                match piece {
                    Piece::Text(text) => values.push(vec![text.clone()]),
                    Piece::Item(item) => match item.evaluate(scope) {
                        Ok(items) => values.push(items),
                        Err(e) => {
                            return Err(errors.fail(format!("Error filling in item: {e}")));
                        }
                    },
                    Piece::Call(call) => {
                        let label = format!("source `{}`", call.name);
                        let items = errors.merge(call.evaluate(context, scope).await, Some(&label))?;
                        values.push(items);
                    }
                    Piece::Conditional(cond) => {
                        let chosen = errors.merge(
                            cond.condition.evaluate(context, scope).await,
                            Some("conditional"),
                        )?;
                        let branch = if chosen { &cond.case_if } else { &cond.case_else };
                        let text = errors.merge(branch.evaluate(context, scope).await, Some("conditional"))?;
                        values.push(vec![text]);
                    }
                    Piece::InlineScript(inline) => {
                        let run = inline.script.evaluate_in(context, scope).await;
                        values.push(errors.merge(run, Some("inline script"))?);
                    }
                }
            }
            errors.into_result(values)
        })
    }

    /// Evaluates to one string, taking the first value of any multi-valued piece.
    pub fn evaluate<'a>(
        &'a self,
        context: &'a Context,
        scope: &'a ItemScope<'a>,
    ) -> BoxFuture<'a, Diagnosed<String>> {
        Box::pin(async move {
            if let Some(text) = self.as_literal() {
                return Ok((text.to_string(), ErrorLog::new()));
            }
            let (values, errors) = self.expand(context, scope).await?;
            let text = values
                .iter()
                .map(|choices| choices.first().map(String::as_str).unwrap_or(""))
                .collect();
            Ok((text, errors))
        })
    }

    /// Evaluates to every combination of the pieces' values, the leftmost piece varying slowest.
    pub async fn multiple_evaluate(
        &self,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<Vec<String>> {
        if let Some(text) = self.as_literal() {
            return Ok((vec![text.to_string()], ErrorLog::new()));
        }
        let (values, mut errors) = self.expand(context, scope).await?;
        let limit = context.settings().max_combinations;

        let mut strings = vec![String::new()];
        let mut truncated = false;
        for choices in &values {
            let mut next = Vec::with_capacity(strings.len() * choices.len());
            'outer: for prefix in &strings {
                for choice in choices {
                    if next.len() >= limit {
                        truncated = true;
                        break 'outer;
                    }
                    next.push(format!("{prefix}{choice}"));
                }
            }
            strings = next;
        }
        if truncated {
            errors.warn(format!("Too many combinations, only the first {limit} were kept"));
        }
        Ok((strings, errors))
    }

    /// Origin semantics: a lone item, call or inline script yields all its values, an empty template
    /// yields nothing, anything else yields exactly one string.
    pub async fn evaluate_values(
        &self,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<Vec<String>> {
        match self.pieces.as_slice() {
            [] => Ok((Vec::new(), ErrorLog::new())),
            [Piece::Item(_) | Piece::Call(_) | Piece::InlineScript(_)] => {
                let (mut values, errors) = self.expand(context, scope).await?;
                Ok((values.pop().unwrap_or_default(), errors))
            }
            _ => {
                let (text, errors) = self.evaluate(context, scope).await?;
                Ok((vec![text], errors))
            }
        }
    }
}

#[cfg(test)]
mod tests;
