use crate::imports::*;

/*
    Types:
    * RawArgs - An argument string as parsed, before any signature is known
    * BoundArgs - RawArgs matched against a Signature, ready to be determined per invocation
    * Binding - Where a parameter's value comes from
*/

/// Syntactic view of an argument string: `name=value` assignments and the unassigned pieces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArgs {
    assigned: Vec<(String, TemplatedString)>,
    implicit: Vec<TemplatedString>,
    warnings: ErrorLog,
}

impl RawArgs {
    pub fn parse(argstr: &str) -> std::result::Result<RawArgs, ErrorLog> {
        if argstr.trim().is_empty() {
            return Ok(RawArgs::default());
        }
        crate::grammar::parse_arguments(argstr)
    }

    pub(crate) fn assign(&mut self, name: String, value: TemplatedString) {
        if self.assigned.iter().any(|(p, _)| *p == name) {
            self.warnings
                .warn(format!("Repeated assignment of parameter `{name}`"));
            return;
        }
        self.assigned.push((name, value));
    }

    pub(crate) fn push_implicit(&mut self, value: TemplatedString) {
        self.implicit.push(value);
    }

    pub fn assigned(&self) -> &[(String, TemplatedString)] {
        &self.assigned
    }

    pub fn implicit(&self) -> &[TemplatedString] {
        &self.implicit
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty() && self.implicit.is_empty()
    }

    /// Every template in the argument list, for static analysis.
    pub fn templates(&self) -> impl Iterator<Item = &TemplatedString> {
        self.assigned.iter().map(|(_, t)| t).chain(self.implicit.iter())
    }

    /// All unassigned pieces as one space separated template.
    pub fn remainder(&self) -> Option<TemplatedString> {
        if self.implicit.is_empty() {
            None
        } else {
            Some(TemplatedString::join(&self.implicit, " "))
        }
    }

    /// Matches the arguments against a signature.
    ///
    /// A single missing required parameter takes the unassigned text: all of it when
    /// `greedy`, its first piece otherwise. More than one missing parameter is terminal.
    /// A greedy signature whose first parameter is still unassigned tries the unassigned
    /// text for it, and warns about any text left over. Defaults fill whatever remains.
    pub fn bind(&self, signature: &Signature, greedy: bool) -> Diagnosed<BoundArgs> {
        let mut errors = self.warnings.clone();
        let mut bindings: Vec<(Param, Binding)> = Vec::new();

        for (name, value) in &self.assigned {
            match signature.get(name) {
                Some(param) => bindings.push((param.clone(), Binding::Template(value.clone()))),
                None => {
                    errors.warn(format!("Unknown parameter `{name}`"));
                }
            }
        }

        let is_bound = |bindings: &[(Param, Binding)], name: &str| bindings.iter().any(|(p, _)| p.name == name);
        let mut implicit: VecDeque<TemplatedString> = self.implicit.iter().cloned().collect();

        let missing: Vec<&Param> = signature
            .params()
            .iter()
            .filter(|p| p.required && !is_bound(&bindings, &p.name))
            .collect();

        match missing.as_slice() {
            [] => {
                if greedy
                    && !implicit.is_empty()
                    && let Some(first) = signature.params().first()
                    && !is_bound(&bindings, &first.name)
                {
                    let text = TemplatedString::join(implicit.make_contiguous(), " ");
                    // only take it if a literal value coerces cleanly
                    let fits = match text.as_literal() {
                        Some(literal) => first.coerce(literal).is_ok(),
                        None => true,
                    };
                    if fits {
                        bindings.push((first.clone(), Binding::Template(text)));
                        implicit.clear();
                    }
                }
            }
            [param] if !implicit.is_empty() => {
                let value = if greedy {
                    let text = TemplatedString::join(implicit.make_contiguous(), " ");
                    implicit.clear();
                    text
                } else {
                    implicit.pop_front().unwrap_or_default()
                };
                bindings.push(((*param).clone(), Binding::Template(value)));
            }
            _ => {
                let names: Vec<String> = missing.iter().map(|p| format!("`{}`", p.name)).collect();
                return Err(errors.fail(format!(
                    "Missing required parameter{} {}",
                    if missing.len() > 1 { "s" } else { "" },
                    names.join(" ")
                )));
            }
        }

        for param in signature.params() {
            if !is_bound(&bindings, &param.name)
                && let Some(default) = &param.default
            {
                bindings.push((param.clone(), Binding::Default(default.clone())));
            }
        }

        let remainder = if implicit.is_empty() {
            None
        } else {
            Some(TemplatedString::join(implicit.make_contiguous(), " "))
        };
        // greedy callers have no use for leftovers
        if greedy && let Some(text) = &remainder {
            match text.as_literal() {
                Some(literal) => errors.warn(format!("Unused argument text `{literal}`")),
                None => errors.warn("Unused argument text"),
            };
        }
        errors.into_result(BoundArgs { bindings, remainder })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Template(TemplatedString),
    Default(ArgValue),
}

/// Arguments matched to parameters. Determining them evaluates templates against a scope.
#[derive(Debug, Clone, Default)]
pub struct BoundArgs {
    bindings: Vec<(Param, Binding)>,
    remainder: Option<TemplatedString>,
}

impl BoundArgs {
    pub fn remainder(&self) -> Option<&TemplatedString> {
        self.remainder.as_ref()
    }

    pub fn bindings(&self) -> &[(Param, Binding)] {
        &self.bindings
    }

    /// Evaluates and coerces each bound template.
    ///
    /// A value that fails to coerce is terminal for a required parameter; otherwise it is
    /// a warning and the default is used instead.
    pub async fn determine(&self, context: &Context, scope: &ItemScope<'_>) -> Diagnosed<Args> {
        let mut errors = ErrorLog::new();
        let mut args = Args::new();

        for (param, binding) in &self.bindings {
            let template = match binding {
                Binding::Default(value) => {
                    args.insert(param.name.clone(), value.clone());
                    continue;
                }
                Binding::Template(template) => template,
            };

            let raw = errors.merge(
                template.evaluate(context, scope).await,
                Some(&format!("parameter `{}`", param.name)),
            )?;
            match param.coerce(&raw) {
                Ok(value) => {
                    args.insert(param.name.clone(), value);
                }
                Err(e) if param.required => {
                    return Err(errors.fail(format!(
                        "Invalid value for parameter `{}`: {e:#}",
                        param.name
                    )));
                }
                Err(e) => {
                    errors.warn(format!(
                        "Invalid value for parameter `{}`, using the default instead: {e:#}",
                        param.name
                    ));
                    if let Some(default) = &param.default {
                        args.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }
        errors.into_result(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::runtime;

    fn signature() -> Signature {
        Signature::new()
            .param(Param::new("text", ParamType::String))
            .param(Param::new("n", ParamType::Int).default(1))
    }

    #[test]
    fn unknown_and_repeated_parameters_warn() {
        let raw = RawArgs::parse("text=a text=b bogus=1").unwrap();
        let (bound, warnings) = raw.bind(&signature(), true).unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(!warnings.is_terminal());
        assert_eq!(bound.bindings().len(), 2);
    }

    #[test]
    fn missing_required_takes_implicit_text() {
        let raw = RawArgs::parse("hello big world n=2").unwrap();

        let (greedy, _) = raw.bind(&signature(), true).unwrap();
        assert!(greedy.remainder().is_none());
        let (param, Binding::Template(text)) = &greedy.bindings()[1] else {
            panic!("expected a template binding");
        };
        assert_eq!(param.name(), "text");
        assert_eq!(text.as_literal(), Some("hello big world"));

        let (lazy, _) = raw.bind(&signature(), false).unwrap();
        let (_, Binding::Template(text)) = &lazy.bindings()[1] else {
            panic!("expected a template binding");
        };
        assert_eq!(text.as_literal(), Some("hello"));
        assert_eq!(lazy.remainder().and_then(|r| r.as_literal()), Some("big world"));
    }

    #[test]
    fn several_missing_parameters_are_terminal() {
        let signature = Signature::new()
            .param(Param::new("a", ParamType::String))
            .param(Param::new("b", ParamType::String));
        let errors = RawArgs::parse("x y").unwrap().bind(&signature, true).unwrap_err();
        assert!(errors.to_string().contains("`a` `b`"));

        let errors = RawArgs::default().bind(&signature, true).unwrap_err();
        assert!(errors.is_terminal());
    }

    #[test]
    fn greedy_first_parameter_only_when_it_fits() {
        let signature = Signature::new().param(Param::new("n", ParamType::Int).default(1));

        let (bound, _) = RawArgs::parse("5").unwrap().bind(&signature, true).unwrap();
        assert!(matches!(&bound.bindings()[0].1, Binding::Template(t) if t.as_literal() == Some("5")));

        let (bound, warnings) = RawArgs::parse("five").unwrap().bind(&signature, true).unwrap();
        assert_eq!(bound.bindings()[0].1, Binding::Default(ArgValue::from(1)));
        assert!(bound.remainder().is_some());
        assert!(!warnings.is_terminal());
        assert!(warnings.to_string().contains("Unused argument text `five`"));

        // lazy binding hands the leftovers on instead
        let (_, warnings) = RawArgs::parse("five").unwrap().bind(&signature, false).unwrap();
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn coercion_failures_depend_on_requiredness() {
        init_tracing();
        let ctx = Context::new(runtime(), Origin::direct("tester"));
        let scope = ItemScope::new(vec!["x".to_string()]);

        let raw = RawArgs::parse("text=ok n={0}").unwrap();
        let (bound, _) = raw.bind(&signature(), true).unwrap();
        let (args, warnings) = bound.determine(&ctx, &scope).await.unwrap();
        assert_eq!(args.get_required_i64("n").unwrap(), 1);
        assert!(warnings.to_string().contains("using the default"));

        let strict = Signature::new().param(Param::new("n", ParamType::Int));
        let (bound, _) = RawArgs::parse("{0}").unwrap().bind(&strict, true).unwrap();
        let errors = bound.determine(&ctx, &scope).await.unwrap_err();
        assert!(errors.is_terminal());
    }
}
