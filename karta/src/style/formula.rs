//! Small expression language used by style conditions and attribute functions.
//!
//! ```text
//! data.kind == "park" && zoom >= 12
//! data["name:en"] ? concat(data["name:en"], " (", data.name, ")") : data.name
//! max(2, data.lanes * 1.5)
//! ```
//!
//! Formulas are parsed once into an [`Expr`] tree and evaluated against an object's tags, the
//! current zoom and a deterministic random generator.

use std::fmt::{Display, Formatter};

use karta_wkb::{ObjectInfo, TagValue};
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, digit1, multispace0, satisfy};
use nom::combinator::{all_consuming, map, map_res, not, opt, recognize, value};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

use super::random::XorShift32;

/// Result of a formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(String),
}

impl Value {
    /// Truthiness of the value: `null`, `false`, `0`, `NaN` and `""` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(v) => *v,
            Value::Number(v) => *v != 0.0 && !v.is_nan(),
            Value::String(v) => !v.is_empty(),
        }
    }

    /// Numeric value. Strings that are not numbers give `NaN`.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(v) => *v as u8 as f64,
            Value::Number(v) => *v,
            Value::String(v) if v.trim().is_empty() => 0.0,
            Value::String(v) => v.trim().parse().unwrap_or(f64::NAN),
        }
    }

    /// String value. `None` for `null` and empty strings.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()).filter(|s| !s.is_empty()),
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::String(a), Value::String(b)) => a == b,
            (a, b) => a.as_number() == b.as_number(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Number(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

impl From<&TagValue> for Value {
    fn from(value: &TagValue) -> Self {
        match value {
            TagValue::Bool(v) => Value::Bool(*v),
            TagValue::Number(v) => Value::Number(*v),
            TagValue::String(v) => Value::String(v.clone()),
        }
    }
}

/// Built-in functions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Function {
    /// `min(a, ...)`: smallest number.
    Min,
    /// `max(a, ...)`: largest number.
    Max,
    /// `abs(a)`: absolute value.
    Abs,
    /// `floor(a)`: rounds down.
    Floor,
    /// `ceil(a)`: rounds up.
    Ceil,
    /// `round(a)`: rounds to the nearest integer.
    Round,
    /// `concat(a, ...)`: joins the values as text.
    Concat,
    /// `has(name)`: true if the object has the tag.
    Has,
    /// `number(a)`: converts to a number.
    Number,
    /// `string(a)`: converts to text.
    String,
    /// `random()`: number in `0..1`.
    Random,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "min" => Self::Min,
            "max" => Self::Max,
            "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "concat" => Self::Concat,
            "has" => Self::Has,
            "number" => Self::Number,
            "string" => Self::String,
            "random" => Self::Random,
            _ => return None,
        })
    }
}

/// Prefix operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!a`
    Not,
    /// `-a`
    Neg,
}

/// Infix operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `&&`
    And,
    /// `||`
    Or,
}

/// Parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value.
    Literal(Value),
    /// Display zoom.
    Zoom,
    /// Length of the object geometry.
    Length,
    /// Angle of the object geometry.
    Angle,
    /// Tag of the object, `data.name`.
    Data(String),
    /// Built-in function call.
    Call(Function, Vec<Expr>),
    /// Prefix operation.
    Unary(UnaryOp, Box<Expr>),
    /// Infix operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `condition ? then : else`.
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Inputs of a formula evaluation.
pub struct EvalContext<'a> {
    /// Object being styled.
    pub info: &'a ObjectInfo,
    /// Display zoom.
    pub zoom: f64,
    /// Generator behind `random()`.
    pub rng: &'a mut XorShift32,
}

impl Expr {
    /// Parses a formula. The whole string must be a valid expression.
    pub fn parse(text: &str) -> Result<Self, String> {
        all_consuming(ws(expr))(text)
            .map(|(_, expr)| expr)
            .map_err(|e| e.to_string())
    }

    /// Evaluates the formula.
    pub fn eval(&self, ctx: &mut EvalContext) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Zoom => Value::Number(ctx.zoom),
            Expr::Length => ctx.info.length.map_or(Value::Null, Value::Number),
            Expr::Angle => ctx.info.angle.map_or(Value::Null, Value::Number),
            Expr::Data(key) => ctx.info.tag(key).map_or(Value::Null, Value::from),
            Expr::Call(function, args) => eval_call(*function, args, ctx),
            Expr::Unary(UnaryOp::Not, arg) => Value::Bool(!arg.eval(ctx).is_truthy()),
            Expr::Unary(UnaryOp::Neg, arg) => Value::Number(-arg.eval(ctx).as_number()),
            Expr::Binary(op, left, right) => eval_binary(*op, left, right, ctx),
            Expr::Conditional(condition, then, otherwise) => {
                if condition.eval(ctx).is_truthy() {
                    then.eval(ctx)
                } else {
                    otherwise.eval(ctx)
                }
            }
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &mut EvalContext) -> Value {
    let l = left.eval(ctx);
    match op {
        BinaryOp::And if !l.is_truthy() => return l,
        BinaryOp::Or if l.is_truthy() => return l,
        BinaryOp::And | BinaryOp::Or => return right.eval(ctx),
        _ => {}
    }

    let r = right.eval(ctx);
    match op {
        BinaryOp::Add => match (&l, &r) {
            (Value::String(_), _) | (_, Value::String(_)) => Value::String(format!("{l}{r}")),
            _ => Value::Number(l.as_number() + r.as_number()),
        },
        BinaryOp::Sub => Value::Number(l.as_number() - r.as_number()),
        BinaryOp::Mul => Value::Number(l.as_number() * r.as_number()),
        BinaryOp::Div => Value::Number(l.as_number() / r.as_number()),
        BinaryOp::Rem => Value::Number(l.as_number() % r.as_number()),
        BinaryOp::Eq => Value::Bool(l.loose_eq(&r)),
        BinaryOp::Ne => Value::Bool(!l.loose_eq(&r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&l, &r) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => l.as_number().partial_cmp(&r.as_number()),
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators return early"),
    }
}

fn eval_call(function: Function, args: &[Expr], ctx: &mut EvalContext) -> Value {
    let mut values = args.iter().map(|arg| arg.eval(ctx)).collect::<Vec<_>>().into_iter();
    let first = values.clone().next().unwrap_or(Value::Null);

    match function {
        Function::Min => Value::Number(values.map(|v| v.as_number()).fold(f64::INFINITY, f64::min)),
        Function::Max => {
            Value::Number(values.map(|v| v.as_number()).fold(f64::NEG_INFINITY, f64::max))
        }
        Function::Abs => Value::Number(first.as_number().abs()),
        Function::Floor => Value::Number(first.as_number().floor()),
        Function::Ceil => Value::Number(first.as_number().ceil()),
        Function::Round => Value::Number(first.as_number().round()),
        Function::Concat => Value::String(values.map(|v| v.to_string()).collect()),
        Function::Has => Value::Bool(ctx.info.tag(&first.to_string()).is_some()),
        Function::Number => Value::Number(first.as_number()),
        Function::String => Value::String(first.to_string()),
        Function::Random => {
            values.next();
            Value::Number(ctx.rng.next_f64())
        }
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(satisfy(|c: char| c.is_alphanumeric() || c == '_')))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |s: &str| s.parse::<f64>().map(|v| Expr::Literal(Value::Number(v))),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        )),
        String::from,
    )(input)
}

fn data_access(input: &str) -> IResult<&str, Expr> {
    map(
        preceded(
            keyword("data"),
            alt((
                preceded(ws(char('.')), map(identifier, String::from)),
                delimited(ws(char('[')), string_literal, ws(char(']'))),
            )),
        ),
        Expr::Data,
    )(input)
}

fn call(input: &str) -> IResult<&str, Expr> {
    map_res(
        pair(
            identifier,
            delimited(
                ws(char('(')),
                separated_list0(ws(char(',')), expr),
                ws(char(')')),
            ),
        ),
        |(name, args)| {
            Function::from_name(name)
                .map(|function| Expr::Call(function, args))
                .ok_or("unknown function")
        },
    )(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        map(string_literal, |s| Expr::Literal(Value::String(s))),
        delimited(char('('), expr, char(')')),
        value(Expr::Literal(Value::Bool(true)), keyword("true")),
        value(Expr::Literal(Value::Bool(false)), keyword("false")),
        value(Expr::Literal(Value::Null), keyword("null")),
        value(Expr::Zoom, keyword("zoom")),
        value(Expr::Length, keyword("length")),
        value(Expr::Angle, keyword("angle")),
        data_access,
        call,
    )))(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('!')), unary), |e| {
            Expr::Unary(UnaryOp::Not, Box::new(e))
        }),
        map(preceded(ws(char('-')), unary), |e| {
            Expr::Unary(UnaryOp::Neg, Box::new(e))
        }),
        primary,
    ))(input)
}

fn binary_level<'a>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expr>,
    operator: fn(&'a str) -> IResult<&'a str, BinaryOp>,
) -> IResult<&'a str, Expr> {
    let (input, first) = operand(input)?;
    let (input, rest) = many0(pair(ws(operator), operand))(input)?;

    let expr = rest.into_iter().fold(first, |left, (op, right)| {
        Expr::Binary(op, Box::new(left), Box::new(right))
    });
    Ok((input, expr))
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    binary_level(input, unary, |i| {
        alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
            value(BinaryOp::Rem, char('%')),
        ))(i)
    })
}

fn additive(input: &str) -> IResult<&str, Expr> {
    binary_level(input, multiplicative, |i| {
        alt((value(BinaryOp::Add, char('+')), value(BinaryOp::Sub, char('-'))))(i)
    })
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    binary_level(input, additive, |i| {
        alt((
            value(BinaryOp::Le, tag("<=")),
            value(BinaryOp::Ge, tag(">=")),
            value(BinaryOp::Lt, char('<')),
            value(BinaryOp::Gt, char('>')),
        ))(i)
    })
}

fn equality(input: &str) -> IResult<&str, Expr> {
    binary_level(input, comparison, |i| {
        alt((value(BinaryOp::Eq, tag("==")), value(BinaryOp::Ne, tag("!="))))(i)
    })
}

fn and(input: &str) -> IResult<&str, Expr> {
    binary_level(input, equality, |i| value(BinaryOp::And, tag("&&"))(i))
}

fn or(input: &str) -> IResult<&str, Expr> {
    binary_level(input, and, |i| value(BinaryOp::Or, tag("||"))(i))
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, condition) = or(input)?;
    let (input, branches) = opt(tuple((ws(char('?')), expr, ws(char(':')), expr)))(input)?;

    Ok(match branches {
        Some((_, then, _, otherwise)) => (
            input,
            Expr::Conditional(Box::new(condition), Box::new(then), Box::new(otherwise)),
        ),
        None => (input, condition),
    })
}
