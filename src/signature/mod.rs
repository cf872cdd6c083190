use crate::imports::*;

pub mod arguments;

/*
    Types:
    * ArgValue - A determined argument value
    * Args - Determined arguments keyed by parameter name
    * ParamType - How raw argument text is coerced into an ArgValue
    * Param - A single declared parameter
    * Signature - The ordered parameters of a callable

    Extension Traits:
    * ArgMapExt - Typed lookups on Args with errors naming the missing key
    * ArgAsExt - Typed conversions on ArgValue with errors naming the field
*/
pub type ArgValue = serde_json::Value;
pub type Args = HashMap<String, ArgValue>;

pub trait ArgMapExt {
    fn get(&self, key: &str) -> Option<&ArgValue>;

    fn get_required(&self, key: &str) -> Result<&ArgValue> {
        self.get(key)
            .context(format!("missing required argument '{key}'"))
    }

    fn get_required_string(&self, key: &str) -> Result<String> {
        self.get_required(key)?
            .as_str_or_err(key)
            .map(|s| s.to_string())
    }

    fn get_required_i64(&self, key: &str) -> Result<i64> {
        self.get_required(key)?.as_i64_or_err(key)
    }

    fn get_required_bool(&self, key: &str) -> Result<bool> {
        self.get_required(key)?.as_bool_or_err(key)
    }

    fn get_optional_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    fn get_optional_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    fn get_optional_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    fn get_optional_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }
}

impl ArgMapExt for Args {
    fn get(&self, key: &str) -> Option<&ArgValue> {
        HashMap::get(self, key)
    }
}

pub trait ArgAsExt {
    fn as_str_or_err(&self, field: &str) -> Result<&str>;
    fn as_i64_or_err(&self, field: &str) -> Result<i64>;
    fn as_f64_or_err(&self, field: &str) -> Result<f64>;
    fn as_bool_or_err(&self, field: &str) -> Result<bool>;
    fn as_array_or_err(&self, field: &str) -> Result<&Vec<ArgValue>>;
    /// Display form used when an argument becomes a macro argument or an item.
    fn to_item(&self) -> String;
}

impl ArgAsExt for ArgValue {
    fn as_str_or_err(&self, field: &str) -> Result<&str> {
        self.as_str().context(format!("'{field}' must be a string"))
    }

    fn as_i64_or_err(&self, field: &str) -> Result<i64> {
        self.as_i64().context(format!("'{field}' must be an integer"))
    }

    fn as_f64_or_err(&self, field: &str) -> Result<f64> {
        self.as_f64().context(format!("'{field}' must be a number"))
    }

    fn as_bool_or_err(&self, field: &str) -> Result<bool> {
        self.as_bool().context(format!("'{field}' must be a boolean"))
    }

    fn as_array_or_err(&self, field: &str) -> Result<&Vec<ArgValue>> {
        self.as_array().context(format!("'{field}' must be a list"))
    }

    fn to_item(&self) -> String {
        match self {
            ArgValue::String(s) => s.clone(),
            ArgValue::Null => String::new(),
            ArgValue::Array(values) => values
                .iter()
                .map(|v| v.to_item())
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        }
    }
}

/// Loose boolean parsing shared by argument coercion and `IS TRUE`/`IS FALSE` predicates.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Int,
    Float,
    Bool,
    /// A regular expression, validated at coercion time and kept as its source text.
    Regex,
    /// One of a fixed set of lowercase options.
    Choice(Vec<String>),
    /// Comma separated values of the inner type.
    List(Box<ParamType>),
}

impl ParamType {
    pub fn coerce(&self, raw: &str) -> Result<ArgValue> {
        Ok(match self {
            ParamType::String => ArgValue::String(raw.to_string()),
            ParamType::Int => {
                let n: i64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("\"{raw}\" is not an integer"))?;
                ArgValue::from(n)
            }
            ParamType::Float => {
                let n: f64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("\"{raw}\" is not a number"))?;
                serde_json::Number::from_f64(n)
                    .map(ArgValue::Number)
                    .with_context(|| format!("\"{raw}\" is not a finite number"))?
            }
            ParamType::Bool => ArgValue::Bool(
                parse_bool(raw).with_context(|| format!("\"{raw}\" is not a boolean"))?,
            ),
            ParamType::Regex => {
                regex::Regex::new(raw).with_context(|| format!("\"{raw}\" is not a valid regex"))?;
                ArgValue::String(raw.to_string())
            }
            ParamType::Choice(options) => {
                let choice = raw.trim().to_lowercase();
                if !options.contains(&choice) {
                    anyhow::bail!("\"{raw}\" must be one of {}", options.join(", "));
                }
                ArgValue::String(choice)
            }
            ParamType::List(inner) => {
                let values = raw
                    .split(',')
                    .map(|part| inner.coerce(part.trim()))
                    .collect::<Result<Vec<_>>>()?;
                ArgValue::Array(values)
            }
        })
    }

    pub fn describe(&self) -> String {
        match self {
            ParamType::String => "string".to_string(),
            ParamType::Int => "int".to_string(),
            ParamType::Float => "float".to_string(),
            ParamType::Bool => "bool".to_string(),
            ParamType::Regex => "regex".to_string(),
            ParamType::Choice(options) => options.join("|"),
            ParamType::List(inner) => format!("list of {}", inner.describe()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub(crate) name: String,
    pub(crate) ty: ParamType,
    pub(crate) required: bool,
    pub(crate) hint: Option<String>,
    pub(crate) default: Option<ArgValue>,
    pub(crate) check: Option<fn(&ArgValue) -> bool>,
}

impl Param {
    /// A required parameter; giving it a default makes it optional.
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Param {
            name: name.into().to_lowercase(),
            ty,
            required: true,
            hint: None,
            default: None,
            check: None,
        }
    }

    pub fn default(mut self, value: impl Into<ArgValue>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Extra validation applied after coercion.
    pub fn check(mut self, check: fn(&ArgValue) -> bool) -> Self {
        self.check = Some(check);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &ParamType {
        &self.ty
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&ArgValue> {
        self.default.as_ref()
    }

    pub fn coerce(&self, raw: &str) -> Result<ArgValue> {
        let value = self.ty.coerce(raw)?;
        if let Some(check) = self.check
            && !check(&value)
        {
            anyhow::bail!("\"{raw}\" is not allowed for `{}`", self.name);
        }
        Ok(value)
    }
}

/// Ordered parameters of a source, pipe, spout or macro.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.retain(|p| p.name != param.name);
        self.params.push(param);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Parses, binds and evaluates an argument string in one go.
    ///
    /// Returns the determined arguments and whatever text was left unassigned.
    pub async fn parse_and_determine(
        &self,
        argstr: &str,
        greedy: bool,
        context: &Context,
        scope: &ItemScope<'_>,
    ) -> Diagnosed<(Args, Option<TemplatedString>)> {
        let mut errors = ErrorLog::new();
        let raw = match RawArgs::parse(argstr) {
            Ok(raw) => raw,
            Err(e) => {
                errors.extend(e, Some("arguments"));
                return Err(errors);
            }
        };
        let bound = errors.merge(raw.bind(self, greedy), None)?;
        let args = errors.merge(bound.determine(context, scope).await, None)?;
        errors.into_result((args, bound.remainder().cloned()))
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .params
            .iter()
            .map(|p| match (&p.default, p.required) {
                (Some(default), _) => format!("[{}: {} = {}]", p.name, p.ty.describe(), default.to_item()),
                (None, true) => format!("{}: {}", p.name, p.ty.describe()),
                (None, false) => format!("[{}: {}]", p.name, p.ty.describe()),
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::runtime;

    #[test]
    fn coercion_by_type() {
        assert_eq!(ParamType::Int.coerce(" 42 ").unwrap(), ArgValue::from(42));
        assert!(ParamType::Int.coerce("4.2").is_err());
        assert_eq!(ParamType::Bool.coerce("Yes").unwrap(), ArgValue::Bool(true));
        assert!(ParamType::Regex.coerce("(unclosed").is_err());
        assert!(ParamType::Float.coerce("NaN").is_err());

        let choice = ParamType::Choice(vec!["left".into(), "right".into()]);
        assert_eq!(choice.coerce("LEFT").unwrap(), ArgValue::from("left"));
        assert!(choice.coerce("up").is_err());

        let list = ParamType::List(Box::new(ParamType::Int));
        assert_eq!(
            list.coerce("1, 2,3").unwrap(),
            ArgValue::Array(vec![1.into(), 2.into(), 3.into()])
        );
    }

    #[test]
    fn checks_run_after_coercion() {
        let param = Param::new("n", ParamType::Int).check(|v| v.as_i64().is_some_and(|n| n > 0));
        assert!(param.coerce("3").is_ok());
        assert!(param.coerce("-3").is_err());
    }

    #[test]
    fn arg_map_lookups() {
        let args: Args = HashMap::from([
            ("n".to_string(), ArgValue::from(3)),
            ("s".to_string(), ArgValue::from("text")),
        ]);
        assert_eq!(args.get_required_i64("n").unwrap(), 3);
        assert!(args.get_required_i64("s").is_err());
        assert!(args.get_required_string("missing").is_err());
        assert_eq!(args.get_optional_string("s").as_deref(), Some("text"));
    }

    #[test]
    fn display_lists_params() {
        let signature = Signature::new()
            .param(Param::new("text", ParamType::String))
            .param(Param::new("n", ParamType::Int).default(1));
        assert_eq!(signature.to_string(), "text: string [n: int = 1]");
    }

    #[tokio::test]
    async fn parse_and_determine_returns_remainder() {
        init_tracing();
        let ctx = Context::new(runtime(), Origin::direct("tester"));
        let scope = ItemScope::new(vec!["item".to_string()]);
        let signature = Signature::new().param(Param::new("n", ParamType::Int).default(1));

        let ((args, remainder), warnings) = signature
            .parse_and_determine("n=3 some {0} text", false, &ctx, &scope)
            .await
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(args.get_required_i64("n").unwrap(), 3);
        let remainder = remainder.unwrap();
        let (text, _) = remainder.evaluate(&ctx, &scope).await.unwrap();
        assert_eq!(text, "some item text");
    }
}
