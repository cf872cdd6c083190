use crate::condition::{Category, Comparator};
use crate::groupmode::{Assign, BucketKind, ColumnRange, Modifier, SortKey};
use crate::imports::*;
use crate::template::{Amount, Conditional, InlineScript, ItemIndex, Selector};

use pest::Parser;
use pest::error::{ErrorVariant, InputLocation};
use pest::iterators::Pair;
use pest_derive::Parser;

pub mod split;

#[derive(Parser)]
#[grammar = "grammar/script.pest"]
struct ScriptParser;

/*
    Entry points:
    * parse_template - templated text such as `hello {0}, {2 words}`
    * parse_arguments - an argument string such as `n=3 "quoted value" {0}`
    * parse_condition - a boolean expression such as `{0} == a and not {1} is empty`
    * parse_groupmode - the group mode prefix of a pipeline step, returns bytes consumed
*/

pub fn parse_template(source: &str) -> std::result::Result<TemplatedString, ErrorLog> {
    let mut pairs = ScriptParser::parse(Rule::template_root, source)
        .map_err(|e| ErrorLog::fatal(describe(source, &e)))?;
    let mut walker = Walker::default();
    let template = match pairs.next() {
        Some(pair) if pair.as_rule() == Rule::template => walker.template(pair),
        _ => TemplatedString::default(),
    };
    walker.finish(template)
}

pub fn parse_arguments(source: &str) -> std::result::Result<RawArgs, ErrorLog> {
    let mut pairs = ScriptParser::parse(Rule::arg_list_root, source)
        .map_err(|e| ErrorLog::fatal(describe(source, &e)))?;
    let mut walker = Walker::default();
    let args = match pairs.next() {
        Some(pair) if pair.as_rule() == Rule::arg_list => walker.arg_list(pair),
        _ => RawArgs::default(),
    };
    walker.finish(args)
}

pub fn parse_condition(source: &str) -> std::result::Result<Condition, ErrorLog> {
    let mut pairs = ScriptParser::parse(Rule::condition_root, source)
        .map_err(|e| ErrorLog::fatal(describe(source, &e)))?;
    let mut walker = Walker::default();
    let Some(pair) = pairs.next() else {
        return Err(ErrorLog::fatal("Empty condition"));
    };
    let condition = walker.condition(pair);
    walker.finish(condition)
}

pub fn parse_groupmode(source: &str) -> std::result::Result<(GroupMode, usize), ErrorLog> {
    let mut pairs = ScriptParser::parse(Rule::groupmode, source)
        .map_err(|e| ErrorLog::fatal(describe(source, &e)))?;
    let Some(pair) = pairs.next() else {
        return Ok((GroupMode::default(), 0));
    };
    let consumed = pair.as_span().end();
    let mut walker = Walker::default();
    let mode = walker.groupmode(pair);
    walker.finish((mode, consumed))
}

/// Turns a pest failure into a message pointing at the offending part of the input.
fn describe(source: &str, error: &pest::error::Error<Rule>) -> String {
    let position = match error.location {
        InputLocation::Pos(p) => p,
        InputLocation::Span((start, _)) => start,
    };
    let expected = match &error.variant {
        ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
            let names: Vec<String> = positives.iter().map(|r| format!("{r:?}")).collect();
            format!(", expected {}", names.join(" or "))
        }
        _ => String::new(),
    };

    match source.get(position..) {
        Some(rest) if !rest.is_empty() => {
            let near: String = rest.chars().take(12).collect();
            format!("Invalid syntax at position {position}{expected}, near `{near}` in `{source}`")
        }
        _ => format!("Unexpected end of input{expected} in `{source}`"),
    }
}

/// Walks pest pairs into script structures.
///
/// Implicit items (`{}`) are numbered in textual order across the whole input,
/// including nested argument lists. Mixing them with explicit indices is an error.
#[derive(Default)]
struct Walker {
    next_implicit: i64,
    explicit_items: bool,
    implicit_items: bool,
    errors: ErrorLog,
}

impl Walker {
    fn finish<T>(self, value: T) -> std::result::Result<T, ErrorLog> {
        let mut errors = self.errors;
        if self.explicit_items && self.implicit_items {
            errors.log("Do not mix empty `{}`'s with numbered `{}`'s", true);
        }
        if errors.is_terminal() {
            Err(errors)
        } else {
            Ok(value)
        }
    }

    fn number(&mut self, pair: &Pair<Rule>) -> i64 {
        match pair.as_str().parse::<i64>() {
            Ok(n) => n,
            Err(_) => {
                self.errors
                    .log(format!("Number `{}` is out of range", pair.as_str()), true);
                0
            }
        }
    }

    fn count(&mut self, pair: &Pair<Rule>, what: &str) -> usize {
        match pair.as_str().parse::<usize>() {
            Ok(0) => {
                self.errors.log(format!("{what} must be at least 1"), true);
                1
            }
            Ok(n) => n,
            Err(_) => {
                self.errors
                    .log(format!("{what} `{}` is out of range", pair.as_str()), true);
                1
            }
        }
    }

    // Any rule whose children are escapes, elements and plain text.
    fn template(&mut self, pair: Pair<Rule>) -> TemplatedString {
        let mut pieces = Vec::new();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::escape => pieces.push(Piece::Text(inner.as_str().chars().skip(1).collect())),
                Rule::element => {
                    if let Some(piece) = self.element(inner) {
                        pieces.push(piece);
                    }
                }
                _ => pieces.push(Piece::Text(inner.as_str().to_string())),
            }
        }
        TemplatedString::new(pieces)
    }

    fn element(&mut self, pair: Pair<Rule>) -> Option<Piece> {
        let body = pair.into_inner().next()?;
        let piece = match body.as_rule() {
            Rule::inline_script => {
                let code = body.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                let inline = InlineScript::parse(code);
                self.errors.extend(inline.script.parse_errors(), Some("inline script"));
                Piece::InlineScript(Box::new(inline))
            }
            Rule::conditional => {
                let mut inner = body.into_inner();
                let case_if = inner.next().map(|p| self.template(p)).unwrap_or_default();
                let condition = inner.next().map(|p| self.condition(p))?;
                let case_else = inner.next().map(|p| self.template(p)).unwrap_or_default();
                Piece::Conditional(Box::new(Conditional {
                    case_if,
                    condition,
                    case_else,
                }))
            }
            Rule::special => {
                let name = body.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                match name {
                    "n" => Piece::Text("\n".to_string()),
                    "t" => Piece::Text("\t".to_string()),
                    other => {
                        self.errors.log(
                            format!("Unknown special symbol `\\{other}`, valid symbols are `\\n` and `\\t`"),
                            true,
                        );
                        return None;
                    }
                }
            }
            Rule::item_list => {
                let indices = body.into_inner().map(|p| self.item_index(p)).collect();
                Piece::Item(ItemRef::new(indices))
            }
            Rule::implicit_item => {
                self.implicit_items = true;
                let mut carrots = 0;
                let mut bang = false;
                for inner in body.into_inner() {
                    match inner.as_rule() {
                        Rule::carrots => carrots = inner.as_str().len(),
                        Rule::bang => bang = true,
                        _ => {}
                    }
                }
                let index = self.next_implicit;
                self.next_implicit += 1;
                Piece::Item(ItemRef::new(vec![ItemIndex {
                    carrots,
                    bang,
                    selector: Selector::At(index),
                }]))
            }
            Rule::call => {
                let mut amount = None;
                let mut name = String::new();
                let mut args = RawArgs::default();
                for inner in body.into_inner() {
                    match inner.as_rule() {
                        Rule::amount if inner.as_str().eq_ignore_ascii_case("all") => {
                            amount = Some(Amount::All)
                        }
                        Rule::amount => amount = Some(Amount::Count(self.number(&inner).max(0) as u64)),
                        Rule::callee => name = inner.as_str().to_lowercase(),
                        Rule::arg_list => args = self.arg_list(inner),
                        _ => {}
                    }
                }
                Piece::Call(Box::new(CallSegment { amount, name, args }))
            }
            _ => unreachable!("element body cannot be {:?}", body.as_rule()),
        };
        Some(piece)
    }

    fn item_index(&mut self, pair: Pair<Rule>) -> ItemIndex {
        self.explicit_items = true;
        let mut index = ItemIndex {
            carrots: 0,
            bang: false,
            selector: Selector::At(0),
        };
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::carrots => index.carrots = inner.as_str().len(),
                Rule::bang => index.bang = true,
                Rule::int => index.selector = Selector::At(self.number(&inner)),
                Rule::item_range => {
                    let (start, end) = self.range(inner);
                    index.selector = Selector::Slice(start, end);
                }
                _ => {}
            }
        }
        index
    }

    fn range(&mut self, pair: Pair<Rule>) -> (Option<i64>, Option<i64>) {
        let mut start = None;
        let mut end = None;
        for bound in pair.into_inner() {
            let value = bound.clone().into_inner().next().map(|n| self.number(&n));
            match bound.as_rule() {
                Rule::range_start => start = value,
                Rule::range_end => end = value,
                _ => {}
            }
        }
        (start, end)
    }

    fn arg_list(&mut self, pair: Pair<Rule>) -> RawArgs {
        let mut args = RawArgs::default();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::assignment => {
                    let mut parts = inner.into_inner();
                    let name = parts.next().map(|p| p.as_str().to_lowercase()).unwrap_or_default();
                    let value = parts.next().map(|p| self.template(p)).unwrap_or_default();
                    args.assign(name, value);
                }
                _ => args.push_implicit(self.template(inner)),
            }
        }
        args
    }

    fn operand(&mut self, pair: Pair<Rule>) -> TemplatedString {
        match pair.into_inner().next() {
            Some(inner) => self.template(inner),
            None => TemplatedString::default(),
        }
    }

    fn condition(&mut self, pair: Pair<Rule>) -> Condition {
        match pair.as_rule() {
            Rule::condition => match pair.into_inner().next() {
                Some(inner) => self.condition(inner),
                None => Condition::Conjunction(Vec::new()),
            },
            Rule::disjunction | Rule::conjunction => {
                let is_or = pair.as_rule() == Rule::disjunction;
                let mut children: Vec<Condition> =
                    pair.into_inner().map(|p| self.condition(p)).collect();
                if children.len() == 1 {
                    children.remove(0)
                } else if is_or {
                    Condition::Disjunction(children)
                } else {
                    Condition::Conjunction(children)
                }
            }
            Rule::negation => match pair.into_inner().next() {
                Some(inner) => Condition::Negation(Box::new(self.condition(inner))),
                None => Condition::Conjunction(Vec::new()),
            },
            Rule::comparison => {
                let mut inner = pair.into_inner();
                let lhs = inner.next().map(|p| self.operand(p)).unwrap_or_default();
                let op = inner
                    .next()
                    .and_then(|p| Comparator::from_symbol(p.as_str()))
                    .unwrap_or(Comparator::Eq);
                let rhs = inner.next().map(|p| self.operand(p)).unwrap_or_default();
                Condition::Comparison { lhs, op, rhs }
            }
            Rule::predicate => {
                let mut operand = TemplatedString::default();
                let mut negated = false;
                let mut category = Category::Empty;
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::operand => operand = self.operand(inner),
                        Rule::is_not => negated = true,
                        Rule::category => {
                            category = Category::from_keyword(inner.as_str()).unwrap_or(Category::Empty)
                        }
                        _ => {}
                    }
                }
                Condition::Predicate {
                    operand,
                    negated,
                    category,
                }
            }
            other => unreachable!("condition cannot be {other:?}"),
        }
    }

    fn groupmode(&mut self, pair: Pair<Rule>) -> GroupMode {
        let mut modifiers = Vec::new();
        let mut assigners = Vec::new();

        for inner in pair.into_inner() {
            let rule = inner.as_rule();
            let strict = inner.clone().into_inner().any(|p| p.as_rule() == Rule::strict);
            match rule {
                Rule::split => {
                    if let Some(n) = inner.into_inner().next() {
                        modifiers.push(Modifier::Split(self.count(&n, "Split size")));
                    }
                }
                Rule::spread => {
                    if let Some(n) = inner.into_inner().next() {
                        let n = self.count(&n, "Spread count");
                        modifiers.push(Modifier::Spread { n, strict });
                    }
                }
                Rule::interval => {
                    if let Some(n) = inner.into_inner().next() {
                        modifiers.push(Modifier::Interval(self.count(&n, "Interval")));
                    }
                }
                Rule::column => {
                    let Some(range) = inner.into_inner().find(|p| p.as_rule() == Rule::col_range)
                    else {
                        continue;
                    };
                    let range = if range.as_str().contains(':') {
                        let (start, end) = self.range(range);
                        ColumnRange::Slice(start, end)
                    } else {
                        match range.into_inner().next() {
                            Some(n) => ColumnRange::At(self.number(&n)),
                            None => ColumnRange::Slice(None, None),
                        }
                    };
                    modifiers.push(Modifier::Column { range, strict });
                }
                Rule::stride => {
                    if let Some(n) = inner.into_inner().find(|p| p.as_rule() == Rule::uint) {
                        let n = self.count(&n, "Column size");
                        modifiers.push(Modifier::Stride { n, strict });
                    }
                }
                Rule::one => modifiers.push(Modifier::Split(1)),
                Rule::head => modifiers.push(Modifier::Column {
                    range: ColumnRange::At(1),
                    strict,
                }),
                Rule::tail => modifiers.push(Modifier::Column {
                    range: ColumnRange::At(-1),
                    strict,
                }),
                Rule::if_mode => {
                    if let Some(condition) = inner.into_inner().find(|p| p.as_rule() == Rule::condition)
                    {
                        let condition = self.condition(condition);
                        modifiers.push(Modifier::If { condition, strict });
                    }
                }
                Rule::sort_by => {
                    let keys = inner
                        .into_inner()
                        .flat_map(|keys| keys.into_inner())
                        .map(|key| {
                            let text = key.as_str();
                            let descending = text.starts_with('-');
                            let digits = text.trim_start_matches(['+', '-']);
                            let index = digits.parse::<usize>().unwrap_or_else(|_| {
                                self.errors.log(format!("Sort key `{text}` is out of range"), true);
                                0
                            });
                            SortKey { index, descending }
                        })
                        .collect();
                    modifiers.push(Modifier::SortBy(keys));
                }
                Rule::group_by => {
                    let mut kind = BucketKind::Group;
                    let mut keys = Vec::new();
                    for part in inner.into_inner() {
                        match part.as_rule() {
                            Rule::group_kind => {
                                kind = BucketKind::from_keyword(part.as_str()).unwrap_or(BucketKind::Group)
                            }
                            Rule::key_list => {
                                for key in part.into_inner() {
                                    match key.as_str().parse::<usize>() {
                                        Ok(k) => keys.push(k),
                                        Err(_) => {
                                            self.errors.log(
                                                format!("Group key `{}` is out of range", key.as_str()),
                                                true,
                                            );
                                        }
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    modifiers.push(Modifier::GroupBy { kind, keys });
                }
                Rule::switch => {
                    let conditions = inner.into_inner().map(|p| self.condition(p)).collect();
                    assigners.push(Assign::Switch(conditions));
                }
                Rule::multiply => assigners.push(Assign::Multiply),
                Rule::random => assigners.push(Assign::Random),
                _ => {}
            }
        }

        if assigners.len() > 1 {
            self.errors
                .log("Only one of `SWITCH`, `*` or `?` may be used per step", true);
        }
        let assign = assigners.pop().unwrap_or_default();
        GroupMode { modifiers, assign }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(template: &TemplatedString) -> Vec<ItemIndex> {
        template
            .pieces()
            .iter()
            .filter_map(|piece| match piece {
                Piece::Item(item) => Some(item.indices().to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn literal_text_is_a_single_piece() {
        let template = parse_template("just some words").unwrap();
        assert_eq!(template.as_literal(), Some("just some words"));
    }

    #[test]
    fn escapes_and_special_symbols() {
        let template = parse_template("a~{b~}{\\n}c").unwrap();
        assert_eq!(template.as_literal(), Some("a{b}\nc"));
    }

    #[test]
    fn unknown_special_symbol_is_terminal() {
        let errors = parse_template("{\\q}").unwrap_err();
        assert!(errors.is_terminal());
        assert!(errors.to_string().contains("\\q"));
    }

    #[test]
    fn implicit_items_are_numbered_in_order_across_nesting() {
        let template = parse_template("{} {? {} if {} == x else y} {}").unwrap();
        let mut seen = items(&template);
        for piece in template.pieces() {
            if let Piece::Conditional(cond) = piece {
                seen.extend(items(&cond.case_if));
            }
        }
        let numbers: Vec<_> = seen
            .iter()
            .map(|i| match i.selector {
                Selector::At(n) => n,
                _ => -1,
            })
            .collect();
        // outer {} then case_if {} then (condition {}) then trailing {}
        assert_eq!(numbers, vec![0, 3, 1]);
    }

    #[test]
    fn mixing_implicit_and_explicit_items_fails() {
        let errors = parse_template("{} and {1}").unwrap_err();
        assert!(errors.is_terminal());
    }

    #[test]
    fn item_lists_with_ranges_and_carrots() {
        let template = parse_template("{^2, -1, 1:, :3!}").unwrap();
        let indices = items(&template);
        assert_eq!(indices.len(), 4);
        assert_eq!(indices[0].carrots, 1);
        assert_eq!(indices[0].selector, Selector::At(2));
        assert_eq!(indices[1].selector, Selector::At(-1));
        assert_eq!(indices[2].selector, Selector::Slice(Some(1), None));
        assert_eq!(indices[3].selector, Selector::Slice(None, Some(3)));
        assert!(indices[3].bang);
    }

    #[test]
    fn call_with_amount_and_arguments() {
        let template = parse_template("{3 words n=4 \"two words\" {0}}").unwrap();
        let [Piece::Call(call)] = template.pieces() else {
            panic!("expected a single call, got {template:?}");
        };
        assert_eq!(call.name, "words");
        assert_eq!(call.amount, Some(Amount::Count(3)));
        assert_eq!(call.args.assigned().len(), 1);
        assert_eq!(call.args.implicit().len(), 2);
        assert_eq!(call.args.implicit()[0].as_literal(), Some("two words"));
    }

    #[test]
    fn unbalanced_braces_fail_with_position() {
        let errors = parse_template("hello {0").unwrap_err();
        assert!(errors.is_terminal());
        assert!(errors.to_string().contains("hello {0"));
    }

    #[test]
    fn conditions_nest_with_precedence() {
        let condition = parse_condition("a == b or not c is empty and d like e").unwrap();
        let Condition::Disjunction(parts) = condition else {
            panic!("expected a disjunction");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], Condition::Comparison { op: Comparator::Eq, .. }));
        let Condition::Conjunction(ref inner) = parts[1] else {
            panic!("expected a conjunction");
        };
        assert!(matches!(inner[0], Condition::Negation(_)));
        assert!(matches!(inner[1], Condition::Comparison { op: Comparator::Like, .. }));
    }

    #[test]
    fn groupmode_prefix_stops_at_the_callee() {
        let source = "(2) %3 #1:3! sort by -1 upper";
        let (mode, consumed) = parse_groupmode(source).unwrap();
        assert_eq!(&source[consumed..], "upper");
        assert_eq!(
            mode.modifiers,
            vec![
                Modifier::Split(2),
                Modifier::Interval(3),
                Modifier::Column {
                    range: ColumnRange::Slice(Some(1), Some(3)),
                    strict: true
                },
                Modifier::SortBy(vec![SortKey {
                    index: 1,
                    descending: true
                }]),
            ]
        );
        assert_eq!(mode.assign, Assign::Default);
    }

    #[test]
    fn groupmode_assigners() {
        let (mode, _) = parse_groupmode("* [a|b]").unwrap();
        assert_eq!(mode.assign, Assign::Multiply);

        let (mode, _) = parse_groupmode("SWITCH({0} == x | {0} == y) [a|b|c]").unwrap();
        assert!(matches!(mode.assign, Assign::Switch(ref c) if c.len() == 2));

        assert!(parse_groupmode("* ? [a|b]").is_err());
        assert!(parse_groupmode("(0) a").is_err());
    }

    #[test]
    fn split_shorthands_and_group_keys() {
        let source = ". ^ $! \\3! GROUP BY 0, 2 upper";
        let (mode, consumed) = parse_groupmode(source).unwrap();
        assert_eq!(&source[consumed..], "upper");
        assert_eq!(
            mode.modifiers,
            vec![
                Modifier::Split(1),
                Modifier::Column {
                    range: ColumnRange::At(1),
                    strict: false
                },
                Modifier::Column {
                    range: ColumnRange::At(-1),
                    strict: true
                },
                Modifier::Stride { n: 3, strict: true },
                Modifier::GroupBy {
                    kind: BucketKind::Group,
                    keys: vec![0, 2]
                },
            ]
        );

        assert!(parse_groupmode("\\0 a").is_err());
        let errors = parse_groupmode("group by 99999999999999999999999 a").unwrap_err();
        assert!(errors.to_string().contains("out of range"));
    }

    #[test]
    fn plain_pipe_names_are_not_modes() {
        let (mode, consumed) = parse_groupmode("sort").unwrap();
        assert!(mode.is_trivial());
        assert_eq!(consumed, 0);
    }
}
