use crate::imports::*;
use crate::signature::parse_bool;

/*
    Types:
    * Condition - Boolean expression tree over templated operands
    * Comparator - Binary operators for comparisons
    * Category - What `x IS [NOT] category` tests for
*/

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Comparison {
        lhs: TemplatedString,
        op: Comparator,
        rhs: TemplatedString,
    },
    Predicate {
        operand: TemplatedString,
        negated: bool,
        category: Category,
    },
    Conjunction(Vec<Condition>),
    Disjunction(Vec<Condition>),
    Negation(Box<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    NotLike,
}

impl Comparator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol.to_lowercase().as_str() {
            "==" => Comparator::Eq,
            "!=" => Comparator::Ne,
            "<" => Comparator::Lt,
            ">" => Comparator::Gt,
            "<=" => Comparator::Le,
            ">=" => Comparator::Ge,
            "like" => Comparator::Like,
            "notlike" => Comparator::NotLike,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Gt => ">",
            Comparator::Le => "<=",
            Comparator::Ge => ">=",
            Comparator::Like => "LIKE",
            Comparator::NotLike => "NOTLIKE",
        }
    }

    /// Numeric operators require both sides to parse as floats; LIKE searches with a regex.
    pub fn apply(&self, lhs: &str, rhs: &str) -> std::result::Result<bool, String> {
        let numbers = || -> std::result::Result<(f64, f64), String> {
            let parse = |side: &str| {
                side.trim().parse::<f64>().map_err(|_| {
                    format!(
                        "Cannot compare `{lhs}` {} `{rhs}`: `{side}` is not a number",
                        self.symbol()
                    )
                })
            };
            Ok((parse(lhs)?, parse(rhs)?))
        };
        let search = || {
            regex::Regex::new(rhs)
                .map(|re| re.is_match(lhs))
                .map_err(|e| format!("Invalid regex `{rhs}`: {e}"))
        };

        Ok(match self {
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
            Comparator::Lt => numbers().map(|(l, r)| l < r)?,
            Comparator::Gt => numbers().map(|(l, r)| l > r)?,
            Comparator::Le => numbers().map(|(l, r)| l <= r)?,
            Comparator::Ge => numbers().map(|(l, r)| l >= r)?,
            Comparator::Like => search()?,
            Comparator::NotLike => !search()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Empty,
    White,
    True,
    False,
    Bool,
    Int,
    Float,
}

impl Category {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword.to_lowercase().as_str() {
            "empty" => Category::Empty,
            "white" => Category::White,
            "true" => Category::True,
            "false" => Category::False,
            "bool" => Category::Bool,
            "int" => Category::Int,
            "float" => Category::Float,
            _ => return None,
        })
    }

    pub fn test(&self, value: &str) -> bool {
        match self {
            Category::Empty => value.is_empty(),
            Category::White => value.trim().is_empty(),
            Category::True => parse_bool(value) == Some(true),
            Category::False => parse_bool(value) == Some(false),
            Category::Bool => parse_bool(value).is_some(),
            Category::Int => value.trim().parse::<i64>().is_ok(),
            Category::Float => value.trim().parse::<f64>().is_ok(),
        }
    }
}

impl Condition {
    pub fn parse(source: &str) -> std::result::Result<Self, ErrorLog> {
        crate::grammar::parse_condition(source)
    }

    /// Every operand template in the tree.
    pub fn templates(&self) -> Vec<&TemplatedString> {
        match self {
            Condition::Comparison { lhs, rhs, .. } => vec![lhs, rhs],
            Condition::Predicate { operand, .. } => vec![operand],
            Condition::Conjunction(children) | Condition::Disjunction(children) => {
                children.iter().flat_map(|c| c.templates()).collect()
            }
            Condition::Negation(inner) => inner.templates(),
        }
    }

    async fn compare(
        lhs: &TemplatedString,
        op: Comparator,
        rhs: &TemplatedString,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<bool> {
        let mut errors = ErrorLog::new();
        let l = errors.merge(lhs.evaluate(context, scope).await, Some("left-hand side"))?;
        let r = errors.merge(rhs.evaluate(context, scope).await, Some("right-hand side"))?;
        match op.apply(&l, &r) {
            Ok(value) => errors.into_result(value),
            Err(message) => Err(errors.fail(message)),
        }
    }

    /// Short-circuiting evaluation; operands are only evaluated when reached.
    pub fn evaluate<'a>(
        &'a self,
        context: &'a Context,
        scope: &'a ItemScope<'a>,
    ) -> BoxFuture<'a, Diagnosed<bool>> {
        Box::pin(async move {
            let mut errors = ErrorLog::new();
            let value = match self {
                Condition::Comparison { lhs, op, rhs } => errors.merge(
                    Self::compare(lhs, *op, rhs, context, scope).await,
                    Some("comparison"),
                )?,
                Condition::Predicate {
                    operand,
                    negated,
                    category,
                } => {
                    let value = errors.merge(operand.evaluate(context, scope).await, Some("predicate"))?;
                    category.test(&value) != *negated
                }
                Condition::Conjunction(children) => {
                    let mut all = true;
                    for child in children {
                        if !errors.merge(child.evaluate(context, scope).await, None)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                Condition::Disjunction(children) => {
                    let mut any = false;
                    for child in children {
                        if errors.merge(child.evaluate(context, scope).await, None)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                Condition::Negation(inner) => !errors.merge(inner.evaluate(context, scope).await, None)?,
            };
            Ok((value, errors))
        })
    }
}
