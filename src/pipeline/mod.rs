use crate::grammar::split::{alternatives, enclosed, segments};
use crate::imports::*;
use crate::registry::is_valid_name;

mod apply;

/*
    Types:
    * Pipeline - Ordered steps parsed from pipeline text, plus whatever went wrong parsing it
    * Step - A group mode and the branch(es) it feeds
    * Branch - Either a named callee or a nested pipeline
    * ParsedCall - Callee name and its parsed arguments
*/

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<Step>,
    parse_errors: ErrorLog,
    source: String,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub mode: GroupMode,
    pub branches: Vec<Branch>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum Branch {
    Call(ParsedCall),
    /// `( a > b )` or one alternative of `[ a | b ]`.
    Inline(Arc<Pipeline>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub name: String,
    pub argstr: String,
    pub args: RawArgs,
}

impl Pipeline {
    /// Parses pipeline text. Never fails: problems are kept as `parse_errors` and
    /// reported by `apply`.
    pub fn parse(source: &str) -> Pipeline {
        let mut pipeline = Pipeline {
            source: source.to_string(),
            ..Default::default()
        };
        if source.trim().is_empty() {
            return pipeline;
        }

        let texts = match segments(source) {
            Ok(texts) => texts,
            Err(errors) => {
                pipeline.parse_errors = errors;
                return pipeline;
            }
        };
        for text in texts {
            match Step::parse(&text) {
                Ok((step, warnings)) => {
                    pipeline.parse_errors.extend(warnings, Some(&format!("`{text}`")));
                    pipeline.steps.push(step);
                }
                Err(errors) => {
                    pipeline.parse_errors.extend(errors, Some(&format!("`{text}`")));
                }
            }
        }
        tracing::debug!(
            steps = pipeline.steps.len(),
            errors = pipeline.parse_errors.len(),
            "Parsed pipeline"
        );
        pipeline
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn parse_errors(&self) -> &ErrorLog {
        &self.parse_errors
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Step {
    fn parse(text: &str) -> Diagnosed<Step> {
        let mut errors = ErrorLog::new();
        let (mode, consumed) = errors.merge(
            GroupMode::parse(text).map(|parsed| (parsed, ErrorLog::new())),
            Some("group mode"),
        )?;
        let rest = text[consumed..].trim();

        let branches = if rest.starts_with('[') {
            let (inner, after) = errors.merge(enclosed(rest).map(|e| (e, ErrorLog::new())), None)?;
            if !after.trim().is_empty() {
                return Err(errors.fail(format!("Unexpected `{}` after `]`", after.trim())));
            }
            let options = errors.merge(alternatives(inner).map(|a| (a, ErrorLog::new())), None)?;
            let mut branches = Vec::with_capacity(options.len());
            for option in options {
                branches.push(errors.merge(Branch::inline(&option), None)?);
            }
            branches
        } else if rest.starts_with('(') {
            let (inner, after) = errors.merge(enclosed(rest).map(|e| (e, ErrorLog::new())), None)?;
            if !after.trim().is_empty() {
                return Err(errors.fail(format!("Unexpected `{}` after `)`", after.trim())));
            }
            vec![errors.merge(Branch::inline(inner), None)?]
        } else {
            vec![Branch::Call(errors.merge(ParsedCall::parse(rest), None)?)]
        };

        if let Err(message) = mode.check_branches(branches.len()) {
            return Err(errors.fail(message));
        }
        errors.into_result(Step {
            mode,
            branches,
            text: text.to_string(),
        })
    }
}

impl Branch {
    fn inline(text: &str) -> Diagnosed<Branch> {
        let pipeline = Pipeline::parse(text);
        let mut errors = ErrorLog::new();
        errors.extend(pipeline.parse_errors.clone(), None);
        if errors.is_terminal() {
            return Err(errors);
        }
        errors.into_result(Branch::Inline(Arc::new(pipeline)))
    }
}

impl ParsedCall {
    fn parse(text: &str) -> Diagnosed<ParsedCall> {
        let (name, argstr) = match text.split_once(char::is_whitespace) {
            Some((name, argstr)) => (name, argstr.trim()),
            None => (text, ""),
        };
        let name = name.to_lowercase();
        if !name.is_empty() && !is_valid_name(&name) {
            return Err(ErrorLog::fatal(format!("Invalid pipe name `{name}`")));
        }
        let args = RawArgs::parse(argstr)?;
        Ok((
            ParsedCall {
                name,
                argstr: argstr.to_string(),
                args,
            },
            ErrorLog::new(),
        ))
    }
}

#[cfg(test)]
mod tests;
