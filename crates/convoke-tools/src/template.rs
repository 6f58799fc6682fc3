//! Step parameter templates.
//!
//! Step params may reference the sequence input and prior step outputs with
//! a small placeholder language:
//!
//! ```text
//! ${input.path}            dotted lookup into the sequence input
//! ${step2.data.items[0]}   dotted lookup with array indexing into step 2's output
//! $${literal}              escape: renders as `${literal}`
//! ```
//!
//! Placeholders are strict: a missing key or out-of-range index is a
//! [`TemplateError`], never an empty string.  Templates are parsed once at
//! config load and stored compiled; rendering is a straight map lookup.

use serde_json::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Parse- or render-time template failure.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template syntax error in `{input}`: {reason}")]
    Syntax { input: String, reason: String },

    #[error("unresolved placeholder `{placeholder}`: {reason}")]
    Unresolved { placeholder: String, reason: String },
}

type Result<T> = std::result::Result<T, TemplateError>;

// ---------------------------------------------------------------------------
// Path expressions
// ---------------------------------------------------------------------------

/// One segment of a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathStep {
    Key(String),
    Index(usize),
}

/// A parsed `root.key[0].nested` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    /// `input` or `stepN`.
    root: String,
    steps: Vec<PathStep>,
    /// The original source text, kept for error messages.
    source: String,
}

impl PathExpr {
    /// The root identifier (`input`, `step3`, ...).
    pub fn root(&self) -> &str {
        &self.root
    }

    fn parse(source: &str) -> Result<Self> {
        let syntax = |reason: &str| TemplateError::Syntax {
            input: source.to_string(),
            reason: reason.to_string(),
        };

        let mut steps = Vec::new();
        let mut chars = source.chars().peekable();

        let root = take_ident(&mut chars);
        if root.is_empty() {
            return Err(syntax("expected identifier after `${`"));
        }

        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    let key = take_ident(&mut chars);
                    if key.is_empty() {
                        return Err(syntax("expected identifier after `.`"));
                    }
                    steps.push(PathStep::Key(key));
                }
                '[' => {
                    chars.next();
                    let mut digits = String::new();
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() {
                            digits.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if chars.next() != Some(']') || digits.is_empty() {
                        return Err(syntax("expected `[<digits>]`"));
                    }
                    let index = digits
                        .parse()
                        .map_err(|_| syntax("array index out of range"))?;
                    steps.push(PathStep::Index(index));
                }
                _ => return Err(syntax(&format!("unexpected character `{c}`"))),
            }
        }

        Ok(Self {
            root,
            steps,
            source: source.to_string(),
        })
    }

    /// Look the path up in a context object keyed by root name.
    fn resolve<'a>(&self, ctx: &'a Value) -> Result<&'a Value> {
        let unresolved = |reason: String| TemplateError::Unresolved {
            placeholder: format!("${{{}}}", self.source),
            reason,
        };

        let mut current = ctx
            .get(&self.root)
            .ok_or_else(|| unresolved(format!("`{}` is not defined", self.root)))?;

        for step in &self.steps {
            current = match step {
                PathStep::Key(key) => current
                    .get(key)
                    .ok_or_else(|| unresolved(format!("missing key `{key}`")))?,
                PathStep::Index(index) => current
                    .get(index)
                    .ok_or_else(|| unresolved(format!("index {index} out of bounds")))?,
            };
        }
        Ok(current)
    }
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder(PathExpr),
}

/// A compiled template string.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a raw string into a compiled template.
    pub fn parse(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = input;

        while let Some(pos) = rest.find("${") {
            // `$${` escapes a literal `${`.
            if pos > 0 && rest.as_bytes()[pos - 1] == b'$' {
                literal.push_str(&rest[..pos - 1]);
                literal.push_str("${");
                rest = &rest[pos + 2..];
                continue;
            }

            literal.push_str(&rest[..pos]);
            rest = &rest[pos + 2..];

            let end = rest.find('}').ok_or_else(|| TemplateError::Syntax {
                input: input.to_string(),
                reason: "unterminated `${`".into(),
            })?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(PathExpr::parse(&rest[..end])?));
            rest = &rest[end + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() || segments.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Whether the template contains any placeholder.
    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
    }

    /// Root identifiers referenced by this template, for load-time
    /// validation of step ordering.
    pub fn roots(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(path) => Some(path.root()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Render against a context object keyed by root (`input`, `step1`...).
    ///
    /// A template that is exactly one placeholder yields the referenced JSON
    /// value unchanged; mixed templates render to a string, serializing
    /// non-string values compactly.
    pub fn render(&self, ctx: &Value) -> Result<Value> {
        if let [Segment::Placeholder(path)] = self.segments.as_slice() {
            return Ok(path.resolve(ctx)?.clone());
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(path) => {
                    let value = path.resolve(ctx)?;
                    match value {
                        Value::String(s) => out.push_str(s),
                        other => out.push_str(&other.to_string()),
                    }
                }
            }
        }
        Ok(Value::String(out))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "input": {"path": "/tmp/data.csv", "count": 3},
            "step1": {"data": {"items": ["a", "b"], "total": 2}},
        })
    }

    #[test]
    fn literal_passthrough() {
        let t = Template::parse("no placeholders here").expect("parses");
        assert!(!t.has_placeholders());
        assert_eq!(t.render(&ctx()).unwrap(), json!("no placeholders here"));
    }

    #[test]
    fn single_placeholder_keeps_json_type() {
        let t = Template::parse("${input.count}").expect("parses");
        assert_eq!(t.render(&ctx()).unwrap(), json!(3));

        let t = Template::parse("${step1.data}").expect("parses");
        assert_eq!(t.render(&ctx()).unwrap(), json!({"items": ["a", "b"], "total": 2}));
    }

    #[test]
    fn mixed_template_renders_string() {
        let t = Template::parse("file ${input.path} has ${input.count} rows").expect("parses");
        assert_eq!(
            t.render(&ctx()).unwrap(),
            json!("file /tmp/data.csv has 3 rows")
        );
    }

    #[test]
    fn array_indexing() {
        let t = Template::parse("${step1.data.items[1]}").expect("parses");
        assert_eq!(t.render(&ctx()).unwrap(), json!("b"));
    }

    #[test]
    fn missing_key_is_an_error_not_empty() {
        let t = Template::parse("${input.missing}").expect("parses");
        let err = t.render(&ctx()).expect_err("must fail");
        assert!(matches!(err, TemplateError::Unresolved { .. }));
    }

    #[test]
    fn out_of_bounds_index_is_an_error() {
        let t = Template::parse("${step1.data.items[9]}").expect("parses");
        assert!(t.render(&ctx()).is_err());
    }

    #[test]
    fn undefined_root_is_an_error() {
        let t = Template::parse("${step7.x}").expect("parses");
        let err = t.render(&ctx()).expect_err("must fail");
        assert!(err.to_string().contains("step7"));
    }

    #[test]
    fn dollar_escape() {
        let t = Template::parse("cost is $${amount}").expect("parses");
        assert!(!t.has_placeholders());
        assert_eq!(t.render(&ctx()).unwrap(), json!("cost is ${amount}"));
    }

    #[test]
    fn escape_then_real_placeholder() {
        let t = Template::parse("$${x} and ${input.count}").expect("parses");
        assert_eq!(t.render(&ctx()).unwrap(), json!("${x} and 3"));
    }

    #[test]
    fn unterminated_placeholder_is_syntax_error() {
        assert!(matches!(
            Template::parse("${input.path"),
            Err(TemplateError::Syntax { .. })
        ));
    }

    #[test]
    fn bad_path_characters_rejected() {
        assert!(Template::parse("${input..x}").is_err());
        assert!(Template::parse("${input.x[a]}").is_err());
        assert!(Template::parse("${}").is_err());
    }

    #[test]
    fn roots_are_reported() {
        let t = Template::parse("${input.a}/${step2.b}").expect("parses");
        assert_eq!(t.roots(), vec!["input", "step2"]);
    }
}
