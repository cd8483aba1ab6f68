//! Inline test expressions.
//!
//! Forms may declare small validation tests inline instead of naming a registered one. Two
//! shapes are accepted:
//!
//! - `a, b -> a.length >= b` binds the named parameters, the field value first
//! - `$1 != $2` binds `$1` to `$4` positionally
//!
//! The body is a single expression over literals, parameters, `!`/`-`, arithmetic, comparison,
//! `&&`/`||`, the conditional operator and `.length`. Anything statement-like (braces or
//! semicolons) is rejected when the test is compiled, as is anything nested too deeply.
//!
//! Source is lexed and parsed with `chumsky`; operator precedence is handled by a pratt
//! parser over the token stream.

use chumsky::input::{Input, ValueInput};
use chumsky::pratt::*;
use chumsky::prelude::*;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::provider::{FieldHandle, ValidationTest};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*([\w$,\s]+?)\s*->(.*)$").expect("inline test header pattern is valid")
});

const POSITIONAL: [&str; 4] = ["$1", "$2", "$3", "$4"];

/// Errors raised while compiling an inline expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("Expression '{0}' is too complex for an inline test")]
    TooComplex(String),

    #[error("Unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Unexpected end of expression")]
    UnexpectedEnd,
}

/// A loosely typed runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Scalar {
    pub fn truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Num(n) => *n != 0.0 && !n.is_nan(),
            Scalar::Str(s) => !s.is_empty(),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Scalar::Null => 0.0,
            Scalar::Bool(b) => f64::from(u8::from(*b)),
            Scalar::Num(n) => *n,
            Scalar::Str(s) if s.trim().is_empty() => 0.0,
            Scalar::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }

    fn to_text(&self) -> String {
        match self {
            Scalar::Null => "null".to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Num(n) => n.to_string(),
            Scalar::Str(s) => s.clone(),
        }
    }

    fn loose_eq(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Null, _) | (_, Scalar::Null) => false,
            (Scalar::Str(a), Scalar::Str(b)) => a == b,
            _ => self.to_number() == other.to_number(),
        }
    }
}

impl From<&Value> for Scalar {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => Scalar::Num(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Scalar::Str(s.clone()),
            other => Scalar::Str(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Lit(Scalar),
    Param(usize),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
    Length(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'src> {
    Num(f64),
    Str(String),
    /// A string literal missing its closing quote
    Unterminated,
    Bool(bool),
    Null,
    Ident(&'src str),
    Param(usize),
    ParenOpen,
    ParenClose,
    Question,
    Colon,
    Dot,
    Bang,
    AndAnd,
    OrOr,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

impl Token<'_> {
    fn describe(&self) -> String {
        let symbol = match self {
            Token::Num(n) => return format!("number {}", n),
            Token::Str(s) => return format!("string '{}'", s),
            Token::Ident(i) => return format!("identifier '{}'", i),
            Token::Param(i) => return format!("parameter {}", i + 1),
            Token::Unterminated => "unterminated string",
            Token::Bool(true) => "true",
            Token::Bool(false) => "false",
            Token::Null => "null",
            Token::ParenOpen => "(",
            Token::ParenClose => ")",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::Bang => "!",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::StrictEq => "===",
            Token::StrictNe => "!==",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
        };
        format!("'{}'", symbol)
    }
}

type Spanned<'src> = (Token<'src>, SimpleSpan);

/// Deepest parenthesis nesting accepted in an inline test
const MAX_NESTING: usize = 32;

/// Longest token stream accepted in an inline test
const MAX_TOKENS: usize = 256;

fn quoted<'src>(
    quote: char,
) -> impl Parser<'src, &'src str, Token<'src>, extra::Err<Rich<'src, char>>> + Clone {
    let escaped = just('\\').ignore_then(any()).map(|c| match c {
        'n' => '\n',
        't' => '\t',
        other => other,
    });

    just(quote)
        .ignore_then(choice((escaped, none_of([quote, '\\']))).repeated().collect::<String>())
        .then(just(quote).or_not())
        .map(|(text, closed)| match closed {
            Some(_) => Token::Str(text),
            None => Token::Unterminated,
        })
}

fn lexer<'src>()
-> impl Parser<'src, &'src str, Vec<Spanned<'src>>, extra::Err<Rich<'src, char>>> {
    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Num);

    let word = any()
        .filter(|c: &char| c.is_alphabetic() || *c == '_' || *c == '$')
        .then(
            any()
                .filter(|c: &char| c.is_alphanumeric() || *c == '_' || *c == '$')
                .repeated(),
        )
        .to_slice()
        .map(|word| match word {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            "null" | "undefined" => Token::Null,
            _ => Token::Ident(word),
        });

    let comparator = choice((
        just("===").to(Token::StrictEq),
        just("!==").to(Token::StrictNe),
        just("==").to(Token::Eq),
        just("!=").to(Token::Ne),
        just("<=").to(Token::Le),
        just(">=").to(Token::Ge),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
    ));

    let logical = choice((
        just("&&").to(Token::AndAnd),
        just("||").to(Token::OrOr),
        just('!').to(Token::Bang),
    ));

    let arithmetic = choice((
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let punctuation = choice((
        just('(').to(Token::ParenOpen),
        just(')').to(Token::ParenClose),
        just('?').to(Token::Question),
        just(':').to(Token::Colon),
        just('.').to(Token::Dot),
    ));

    let token = choice((
        number,
        quoted('"'),
        quoted('\''),
        word,
        comparator,
        logical,
        arithmetic,
        punctuation,
    ));

    token
        .map_with(|token, extra| (token, extra.span()))
        .padded()
        .repeated()
        .collect()
}

/// Bind identifiers to parameter slots and enforce the size limits.
fn resolve<'src>(
    source: &str,
    tokens: Vec<Spanned<'src>>,
    params: &[String],
) -> Result<Vec<Spanned<'src>>, ExprError> {
    if tokens.len() > MAX_TOKENS {
        return Err(ExprError::TooComplex(source.to_string()));
    }

    let mut depth = 0usize;
    let mut after_dot = false;
    let mut resolved = Vec::with_capacity(tokens.len());
    for (token, span) in tokens {
        let token = match token {
            Token::Unterminated => return Err(ExprError::UnterminatedString),
            Token::ParenOpen => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(ExprError::TooComplex(source.to_string()));
                }
                Token::ParenOpen
            }
            Token::ParenClose => {
                depth = depth.saturating_sub(1);
                Token::ParenClose
            }
            // Member names stay as written
            Token::Ident(name) if after_dot => Token::Ident(name),
            Token::Ident(name) => params
                .iter()
                .position(|p| p.as_str() == name)
                .map(Token::Param)
                .ok_or_else(|| ExprError::UnknownIdentifier(name.to_string()))?,
            other => other,
        };
        after_dot = token == Token::Dot;
        resolved.push((token, span));
    }
    Ok(resolved)
}

fn parser<'src, I>() -> impl Parser<'src, I, Expr, extra::Err<Rich<'src, Token<'src>>>>
where
    I: ValueInput<'src, Token = Token<'src>, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Num(n) => Expr::Lit(Scalar::Num(n)),
            Token::Str(s) => Expr::Lit(Scalar::Str(s)),
            Token::Bool(b) => Expr::Lit(Scalar::Bool(b)),
            Token::Null => Expr::Lit(Scalar::Null),
            Token::Param(index) => Expr::Param(index),
        };

        let atom = literal.or(expr
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)));

        // `? then :` acts as a right-associative infix operator carrying the middle branch
        let conditional = just(Token::Question)
            .ignore_then(expr)
            .then_ignore(just(Token::Colon));

        let equality = select! {
            Token::StrictEq => BinOp::StrictEq,
            Token::StrictNe => BinOp::StrictNe,
            Token::Eq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
        };
        let relational = select! {
            Token::Le => BinOp::Le,
            Token::Ge => BinOp::Ge,
            Token::Lt => BinOp::Lt,
            Token::Gt => BinOp::Gt,
        };
        let additive = select! {
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
        };
        let multiplicative = select! {
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::Percent => BinOp::Rem,
        };
        let binary = |left: Expr, op: BinOp, right: Expr| {
            Expr::Binary(op, Box::new(left), Box::new(right))
        };

        atom.pratt((
            infix(right(1), conditional, |condition, then, otherwise, _| {
                Expr::Cond(Box::new(condition), Box::new(then), Box::new(otherwise))
            }),
            infix(left(2), just(Token::OrOr), |l, _, r, _| {
                Expr::Or(Box::new(l), Box::new(r))
            }),
            infix(left(3), just(Token::AndAnd), |l, _, r, _| {
                Expr::And(Box::new(l), Box::new(r))
            }),
            infix(left(4), equality, move |l, op, r, _| binary(l, op, r)),
            infix(left(5), relational, move |l, op, r, _| binary(l, op, r)),
            infix(left(6), additive, move |l, op, r, _| binary(l, op, r)),
            infix(left(7), multiplicative, move |l, op, r, _| binary(l, op, r)),
            prefix(8, just(Token::Bang), |_, e, _| Expr::Not(Box::new(e))),
            prefix(8, just(Token::Minus), |_, e, _| Expr::Neg(Box::new(e))),
            postfix(
                9,
                just(Token::Dot).then(just(Token::Ident("length"))),
                |e, _, _| Expr::Length(Box::new(e)),
            ),
        ))
    })
}

fn parse_body(body: &str, params: &[String]) -> Result<Expr, ExprError> {
    let tokens = lexer().parse(body).into_result().map_err(|errors| {
        match errors.first().and_then(|e| e.found().map(|c| (*c, e.span().start))) {
            Some((c, offset)) => ExprError::UnexpectedChar(c, offset),
            None => ExprError::UnexpectedEnd,
        }
    })?;
    let tokens = resolve(body, tokens, params)?;

    let input = tokens
        .as_slice()
        .map(SimpleSpan::from(body.len()..body.len()), |(token, span)| (token, span));
    parser().parse(input).into_result().map_err(|errors| {
        match errors.first().and_then(|e| e.found().map(|t| (t.describe(), e.span().start))) {
            Some((found, offset)) => ExprError::UnexpectedToken { found, offset },
            None => ExprError::UnexpectedEnd,
        }
    })
}

fn compare(op: BinOp, left: &Scalar, right: &Scalar) -> bool {
    let ordering = match (left, right) {
        (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    }
}

fn evaluate(expr: &Expr, args: &[Scalar]) -> Scalar {
    match expr {
        Expr::Lit(value) => value.clone(),
        Expr::Param(index) => args.get(*index).cloned().unwrap_or(Scalar::Null),
        Expr::Not(inner) => Scalar::Bool(!evaluate(inner, args).truthy()),
        Expr::Neg(inner) => Scalar::Num(-evaluate(inner, args).to_number()),
        Expr::And(left, right) => {
            let left = evaluate(left, args);
            if left.truthy() {
                evaluate(right, args)
            } else {
                left
            }
        }
        Expr::Or(left, right) => {
            let left = evaluate(left, args);
            if left.truthy() {
                left
            } else {
                evaluate(right, args)
            }
        }
        Expr::Cond(condition, then, otherwise) => {
            if evaluate(condition, args).truthy() {
                evaluate(then, args)
            } else {
                evaluate(otherwise, args)
            }
        }
        Expr::Length(inner) => match evaluate(inner, args) {
            Scalar::Str(s) => Scalar::Num(s.chars().count() as f64),
            _ => Scalar::Null,
        },
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, args);
            let right = evaluate(right, args);
            match op {
                BinOp::Add => match (&left, &right) {
                    (Scalar::Str(_), _) | (_, Scalar::Str(_)) => {
                        Scalar::Str(left.to_text() + &right.to_text())
                    }
                    _ => Scalar::Num(left.to_number() + right.to_number()),
                },
                BinOp::Sub => Scalar::Num(left.to_number() - right.to_number()),
                BinOp::Mul => Scalar::Num(left.to_number() * right.to_number()),
                BinOp::Div => Scalar::Num(left.to_number() / right.to_number()),
                BinOp::Rem => Scalar::Num(left.to_number() % right.to_number()),
                BinOp::Eq => Scalar::Bool(left.loose_eq(&right)),
                BinOp::Ne => Scalar::Bool(!left.loose_eq(&right)),
                BinOp::StrictEq => Scalar::Bool(left == right),
                BinOp::StrictNe => Scalar::Bool(left != right),
                BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                    Scalar::Bool(compare(*op, &left, &right))
                }
            }
        }
    }
}

/// A validation test compiled from an inline expression
#[derive(Debug, Clone)]
pub struct InlineTest {
    name: String,
    source: String,
    params: Vec<String>,
    body: Expr,
}

impl InlineTest {
    /// Compile `source` into a test registered as `name`.
    pub fn compile(name: &str, source: &str) -> Result<Self, ExprError> {
        if source.contains(';') || source.contains('{') || source.contains('}') {
            return Err(ExprError::TooComplex(source.to_string()));
        }

        let (params, body): (Vec<String>, &str) = match HEADER.captures(source) {
            Some(captures) => {
                let header = captures.get(1).map_or("", |m| m.as_str());
                let body = captures.get(2).map_or("", |m| m.as_str());
                let params = header
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
                (params, body)
            }
            None => (POSITIONAL.iter().map(|p| p.to_string()).collect(), source),
        };

        let body = parse_body(body, &params)?;

        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            params,
            body,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Evaluate with positional arguments.
    pub fn evaluate(&self, args: &[Scalar]) -> Scalar {
        evaluate(&self.body, args)
    }
}

impl ValidationTest for InlineTest {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, field: &dyn FieldHandle, params: Option<&Value>) -> bool {
        let mut args = vec![field.value().map_or(Scalar::Null, Scalar::Str)];
        match params {
            Some(Value::Array(items)) => args.extend(items.iter().map(Scalar::from)),
            Some(value) => args.push(Scalar::from(value)),
            None => {}
        }
        self.evaluate(&args).truthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(Option<&'static str>);

    impl FieldHandle for Fixed {
        fn id(&self) -> &str {
            "fixed"
        }

        fn value(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn eval(source: &str, args: &[Scalar]) -> Scalar {
        InlineTest::compile("t", source)
            .expect("expression should compile")
            .evaluate(args)
    }

    #[test]
    fn named_parameters_bind_field_value_first() {
        let test = InlineTest::compile("min", "value, n -> value.length >= n")
            .expect("should compile");
        assert_eq!(test.params(), ["value", "n"]);
        assert!(test.run(&Fixed(Some("hello")), Some(&json!(3))));
        assert!(!test.run(&Fixed(Some("hi")), Some(&json!(3))));
    }

    #[test]
    fn positional_parameters_default_to_dollar_names() {
        let test = InlineTest::compile("between", "$1 >= $2 && $1 <= $3").expect("should compile");
        assert!(test.run(&Fixed(Some("5")), Some(&json!([1, 10]))));
        assert!(!test.run(&Fixed(Some("50")), Some(&json!([1, 10]))));
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3", &[]), Scalar::Num(7.0));
        assert_eq!(eval("(1 + 2) * 3", &[]), Scalar::Num(9.0));
        assert_eq!(eval("10 - 4 - 3", &[]), Scalar::Num(3.0));
        assert_eq!(eval("!false && 1 < 2", &[]), Scalar::Bool(true));
        assert_eq!(eval("-2 * -2", &[]), Scalar::Num(4.0));
    }

    #[test]
    fn conditional_selects_branch() {
        let args = [Scalar::Str("yes".to_string())];
        assert_eq!(eval("$1 == 'yes' ? 'a' : 'b'", &args), Scalar::Str("a".to_string()));
        assert_eq!(eval("$2 ? 1 : 2", &args), Scalar::Num(2.0));
    }

    #[test]
    fn loose_and_strict_equality() {
        let args = [Scalar::Str("5".to_string())];
        assert_eq!(eval("$1 == 5", &args), Scalar::Bool(true));
        assert_eq!(eval("$1 === 5", &args), Scalar::Bool(false));
        assert_eq!(eval("$1 === '5'", &args), Scalar::Bool(true));
        assert_eq!(eval("$2 == null", &args), Scalar::Bool(true));
    }

    #[test]
    fn string_concatenation_and_comparison() {
        assert_eq!(eval("'a' + 1", &[]), Scalar::Str("a1".to_string()));
        assert_eq!(eval("'apple' < 'banana'", &[]), Scalar::Bool(true));
        assert_eq!(eval("'abc'.length", &[]), Scalar::Num(3.0));
    }

    #[test]
    fn rejects_statement_like_source() {
        assert!(matches!(
            InlineTest::compile("t", "a -> { return a; }"),
            Err(ExprError::TooComplex(_))
        ));
        assert!(matches!(
            InlineTest::compile("t", "$1; $2"),
            Err(ExprError::TooComplex(_))
        ));
    }

    #[test]
    fn reports_parse_errors() {
        assert_eq!(
            InlineTest::compile("t", "a -> b").unwrap_err(),
            ExprError::UnknownIdentifier("b".to_string())
        );
        assert!(matches!(
            InlineTest::compile("t", "$1 +"),
            Err(ExprError::UnexpectedEnd | ExprError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            InlineTest::compile("t", "'open"),
            Err(ExprError::UnterminatedString)
        ));
        assert!(matches!(
            InlineTest::compile("t", "$1 # 2"),
            Err(ExprError::UnexpectedChar('#', _))
        ));
        assert!(matches!(
            InlineTest::compile("t", "$1.size"),
            Err(ExprError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn conditional_is_right_associative() {
        let args = [Scalar::Num(2.0)];
        assert_eq!(
            eval("$1 == 1 ? 'one' : $1 == 2 ? 'two' : 'many'", &args),
            Scalar::Str("two".to_string())
        );
        assert_eq!(eval("-'ab'.length", &[]), Scalar::Num(-2.0));
    }

    #[test]
    fn escapes_inside_strings() {
        assert_eq!(eval(r#""a\"b""#, &[]), Scalar::Str("a\"b".to_string()));
        assert_eq!(eval(r"'it\'s'.length", &[]), Scalar::Num(4.0));
    }

    #[test]
    fn deep_nesting_is_too_complex() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(matches!(
            InlineTest::compile("t", &source),
            Err(ExprError::TooComplex(_))
        ));
        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(eval(&shallow, &[]), Scalar::Num(1.0));
    }

    #[test]
    fn missing_field_value_is_null() {
        let test = InlineTest::compile("present", "$1 != null").expect("should compile");
        assert!(!test.run(&Fixed(None), None));
        assert!(test.run(&Fixed(Some("")), None));
    }
}
