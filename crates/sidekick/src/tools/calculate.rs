use std::fmt::{self, Display};
use std::future::ready;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use sidekick_core::tool::{Error as ToolError, Tool, ToolResult};

/// Why an expression could not be evaluated.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CalcError {
    /// Nothing to evaluate.
    #[error("empty expression")]
    Empty,
    /// A character that is not part of arithmetic.
    #[error("unsupported character `{0}`")]
    UnexpectedChar(char),
    /// A malformed numeric literal.
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    /// A well-formed token in the wrong place.
    #[error("unexpected `{0}`")]
    UnexpectedToken(String),
    /// The expression stops in the middle.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Zero raised to a negative power.
    #[error("0 cannot be raised to a negative power")]
    ZeroToNegativePower,
    /// An integer result that does not fit.
    #[error("integer result too large")]
    Overflow,
    /// A float result that does not fit.
    #[error("result out of range")]
    OutOfRange,
    /// A negative number raised to a fractional power.
    #[error("complex results are not supported")]
    Complex,
    /// Too many nested parentheses or unary signs.
    #[error("expression nested too deeply")]
    TooDeep,
}

/// A number with Python-like arithmetic: integers stay integral until a
/// float or a true division gets involved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    /// An integer.
    Int(i128),
    /// A float.
    Float(f64),
}

impl Number {
    #[inline]
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{}", format_float(x)),
        }
    }
}

/// Formats a float the way Python's `repr` does.
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_owned();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let formatted = format!("{x:e}");
        let Some((mantissa, exp)) = formatted.split_once('e') else {
            return formatted;
        };
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exp.abs());
    }
    if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::FloorDiv => "//",
            Op::Mod => "%",
            Op::Pow => "**",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
    Num(Number),
    Op(Op),
    LParen,
    RParen,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{n}"),
            Token::Op(op) => write!(f, "{op}"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = vec![];
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                let (number, len) = scan_number(&chars[i..])?;
                i += len;
                tokens.push(Token::Num(number));
                continue;
            }
            '+' => Token::Op(Op::Add),
            '-' => Token::Op(Op::Sub),
            '*' if next == Some('*') => Token::Op(Op::Pow),
            '*' => Token::Op(Op::Mul),
            '/' if next == Some('/') => Token::Op(Op::FloorDiv),
            '/' => Token::Op(Op::Div),
            '%' => Token::Op(Op::Mod),
            '(' => Token::LParen,
            ')' => Token::RParen,
            c => return Err(CalcError::UnexpectedChar(c)),
        };
        i += match token {
            Token::Op(Op::Pow | Op::FloorDiv) => 2,
            _ => 1,
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Scans a numeric literal: `12`, `1_000`, `3.5`, `.5`, `2.`, `1e-3`.
fn scan_number(chars: &[char]) -> Result<(Number, usize), CalcError> {
    let mut len = 0;
    let mut is_float = false;
    let digits = |len: &mut usize| {
        while *len < chars.len()
            && (chars[*len].is_ascii_digit() || chars[*len] == '_')
        {
            *len += 1;
        }
    };

    digits(&mut len);
    if chars.get(len) == Some(&'.') {
        is_float = true;
        len += 1;
        digits(&mut len);
    }
    if matches!(chars.get(len), Some('e' | 'E')) {
        let mut end = len + 1;
        if matches!(chars.get(end), Some('+' | '-')) {
            end += 1;
        }
        if chars.get(end).is_some_and(char::is_ascii_digit) {
            is_float = true;
            len = end;
            digits(&mut len);
        }
    }

    let literal: String = chars[..len].iter().collect();
    let cleaned = literal.replace('_', "");
    let invalid = || CalcError::InvalidNumber(literal.clone());
    if cleaned == "." || literal.contains("__") {
        return Err(invalid());
    }
    let number = if is_float {
        Number::Float(cleaned.parse().map_err(|_| invalid())?)
    } else {
        Number::Int(cleaned.parse().map_err(|_| invalid())?)
    };
    Ok((number, len))
}

// Each nesting level costs a few stack frames.
const MAX_DEPTH: usize = 200;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    #[inline]
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    #[inline]
    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Number, CalcError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (Op::Add | Op::Sub))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = apply(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    // term := factor (('*' | '/' | '//' | '%') factor)*
    fn term(&mut self) -> Result<Number, CalcError> {
        let mut lhs = self.factor()?;
        while let Some(Token::Op(op @ (Op::Mul | Op::Div | Op::FloorDiv | Op::Mod))) =
            self.peek()
        {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = apply(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    // Every recursive rule passes through here.
    fn factor(&mut self) -> Result<Number, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        self.depth += 1;
        let value = self.unary();
        self.depth -= 1;
        value
    }

    // factor := ('+' | '-') factor | power
    fn unary(&mut self) -> Result<Number, CalcError> {
        match self.peek() {
            Some(Token::Op(Op::Add)) => {
                self.pos += 1;
                self.factor()
            }
            Some(Token::Op(Op::Sub)) => {
                self.pos += 1;
                negate(self.factor()?)
            }
            _ => self.power(),
        }
    }

    // power := atom ['**' factor]
    fn power(&mut self) -> Result<Number, CalcError> {
        let base = self.atom()?;
        if let Some(Token::Op(Op::Pow)) = self.peek() {
            self.pos += 1;
            let exp = self.factor()?;
            return apply(Op::Pow, base, exp);
        }
        Ok(base)
    }

    // atom := number | '(' expr ')'
    fn atom(&mut self) -> Result<Number, CalcError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    Some(other) => Err(CalcError::UnexpectedToken(other.to_string())),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(other) => Err(CalcError::UnexpectedToken(other.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

fn negate(n: Number) -> Result<Number, CalcError> {
    match n {
        Number::Int(i) => i.checked_neg().map(Number::Int).ok_or(CalcError::Overflow),
        Number::Float(f) => Ok(Number::Float(-f)),
    }
}

fn floor_div_int(a: i128, b: i128) -> Result<i128, CalcError> {
    let q = a.checked_div(b).ok_or(CalcError::Overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn mod_int(a: i128, b: i128) -> i128 {
    let r = a.checked_rem(b).unwrap_or(0);
    if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
}

fn mod_float(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
}

fn apply(op: Op, lhs: Number, rhs: Number) -> Result<Number, CalcError> {
    use Number::{Float, Int};

    if matches!(op, Op::Div | Op::FloorDiv | Op::Mod) && rhs.is_zero() {
        return Err(CalcError::DivisionByZero);
    }

    let result = match (op, lhs, rhs) {
        (Op::Div, a, b) => Float(a.as_f64() / b.as_f64()),
        (Op::Pow, Int(a), Int(b)) if b >= 0 => {
            let exp = u32::try_from(b).map_err(|_| CalcError::Overflow)?;
            Int(a.checked_pow(exp).ok_or(CalcError::Overflow)?)
        }
        (Op::Pow, a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            if a == 0.0 && b < 0.0 {
                return Err(CalcError::ZeroToNegativePower);
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(CalcError::Complex);
            }
            let value = a.powf(b);
            if value.is_infinite() {
                return Err(CalcError::OutOfRange);
            }
            Float(value)
        }
        (Op::Add, Int(a), Int(b)) => Int(a.checked_add(b).ok_or(CalcError::Overflow)?),
        (Op::Sub, Int(a), Int(b)) => Int(a.checked_sub(b).ok_or(CalcError::Overflow)?),
        (Op::Mul, Int(a), Int(b)) => Int(a.checked_mul(b).ok_or(CalcError::Overflow)?),
        (Op::FloorDiv, Int(a), Int(b)) => Int(floor_div_int(a, b)?),
        (Op::Mod, Int(a), Int(b)) => Int(mod_int(a, b)),
        (op, a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            Float(match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::FloorDiv => (a / b).floor(),
                Op::Mod => mod_float(a, b),
                Op::Div | Op::Pow => unreachable!("handled above"),
            })
        }
    };
    Ok(result)
}

/// Evaluates an arithmetic expression.
///
/// Supports integers and decimals, `+ - * / // % **`, unary `+`/`-` and
/// parentheses. `**` is right-associative and binds tighter than unary
/// minus, so `-2 ** 2` is `-4`.
pub fn evaluate(expression: &str) -> Result<Number, CalcError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(extra) = parser.peek() {
        return Err(CalcError::UnexpectedToken(extra.to_string()));
    }
    Ok(value)
}

/// Input of [`CalculateTool`].
#[derive(Deserialize, JsonSchema)]
pub struct CalculateToolParameters {
    #[schemars(description = "The arithmetic expression, e.g. `(2 + 3) ** 2 / 4`.")]
    expression: String,
}

/// A tool for evaluating arithmetic safely. Nothing but numbers and
/// operators is accepted.
pub struct CalculateTool {
    parameter_schema: Value,
}

impl CalculateTool {
    /// Creates a new calculate tool.
    #[inline]
    pub fn new() -> Self {
        CalculateTool {
            parameter_schema: schema_for!(CalculateToolParameters).to_value(),
        }
    }
}

impl Default for CalculateTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for CalculateTool {
    type Input = CalculateToolParameters;

    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Safely evaluate arithmetic (+ - * / // % ** and parentheses)."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: CalculateToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let result = evaluate(&input.expression)
            .map(|value| value.to_string())
            .map_err(|err| ToolError::execution_error().with_reason(err.to_string()));
        ready(result)
    }
}
