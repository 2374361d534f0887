//! Expression language for categorization rules.
//!
//! Variables are written either bare (`amp_mean`) or as placeholders
//! (`{amp_mean}`). Method calls are sugar for function calls, so
//! `{h}.GetMean()` and `mean(h)` are the same thing.

use crate::plot::histogram::Histogram1D;
use crate::utils::error::{PartsError, Result};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    Hist(Arc<Histogram1D>),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Hist(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numbers and bools (as 0/1).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Hist(_) => "histogram",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Hist(a), Value::Hist(b)) => Arc::ptr_eq(a, b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Hist(h) => write!(f, "<histogram {}>", h.name),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Hist(h) => serializer.serialize_str(&h.name),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Histogram1D> for Value {
    fn from(h: Histogram1D) -> Self {
        Value::Hist(Arc::new(h))
    }
}

pub type Env = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Placeholder(String),
    Str(String),
    Op(&'static str),
    End,
}

const OPERATORS: [&str; 19] = [
    "**", "<=", ">=", "==", "!=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "(", ")",
    ",", ".",
];

fn tokenize(src: &str) -> std::result::Result<Vec<(Tok, usize)>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number '{}' at position {}", text, start))?;
            tokens.push((Tok::Num(value), start));
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((Tok::Ident(chars[start..i].iter().collect()), start));
        } else if c == '{' {
            let close = chars[i..]
                .iter()
                .position(|&ch| ch == '}')
                .ok_or_else(|| format!("unclosed '{{' at position {}", start))?;
            let name: String = chars[i + 1..i + close].iter().collect();
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(format!("empty placeholder at position {}", start));
            }
            tokens.push((Tok::Placeholder(name), start));
            i += close + 1;
        } else if c == '\'' || c == '"' {
            let close = chars[i + 1..]
                .iter()
                .position(|&ch| ch == c)
                .ok_or_else(|| format!("unterminated string at position {}", start))?;
            tokens.push((Tok::Str(chars[i + 1..i + 1 + close].iter().collect()), start));
            i += close + 2;
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| format!("unexpected character '{}' at position {}", c, start))?;
            tokens.push((Tok::Op(*op), start));
            i += op.len();
        }
    }

    tokens.push((Tok::End, chars.len()));
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Var(String, usize),
    Neg(Box<Node>, usize),
    Not(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>, usize),
    Compare(Box<Node>, Vec<(CmpOp, Node, usize)>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Call(String, Vec<Node>, usize),
}

struct Parser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

type ParseResult = std::result::Result<Node, String>;

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].0
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn advance(&mut self) -> Tok {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Tok::Op(o) if *o == op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Tok::Ident(w) if w == word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> std::result::Result<(), String> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(format!("expected '{}' at position {}", op, self.offset()))
        }
    }

    fn parse(mut self) -> ParseResult {
        let node = self.or_expr()?;
        if *self.peek() != Tok::End {
            return Err(format!("unexpected trailing input at position {}", self.offset()));
        }
        Ok(node)
    }

    fn or_expr(&mut self) -> ParseResult {
        let mut node = self.and_expr()?;
        while self.eat_word("or") || self.eat_op("||") {
            node = Node::Or(Box::new(node), Box::new(self.and_expr()?));
        }
        Ok(node)
    }

    fn and_expr(&mut self) -> ParseResult {
        let mut node = self.not_expr()?;
        while self.eat_word("and") || self.eat_op("&&") {
            node = Node::And(Box::new(node), Box::new(self.not_expr()?));
        }
        Ok(node)
    }

    fn not_expr(&mut self) -> ParseResult {
        if self.eat_word("not") || self.eat_op("!") {
            return Ok(Node::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult {
        let first = self.additive()?;
        let mut rest = Vec::new();
        loop {
            let at = self.offset();
            let op = match self.peek() {
                Tok::Op("<") => CmpOp::Lt,
                Tok::Op("<=") => CmpOp::Le,
                Tok::Op(">") => CmpOp::Gt,
                Tok::Op(">=") => CmpOp::Ge,
                Tok::Op("==") => CmpOp::Eq,
                Tok::Op("!=") => CmpOp::Ne,
                _ => break,
            };
            self.advance();
            rest.push((op, self.additive()?, at));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Node::Compare(Box::new(first), rest))
        }
    }

    fn additive(&mut self) -> ParseResult {
        let mut node = self.term()?;
        loop {
            let at = self.offset();
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            node = Node::Binary(op, Box::new(node), Box::new(self.term()?), at);
        }
        Ok(node)
    }

    fn term(&mut self) -> ParseResult {
        let mut node = self.unary()?;
        loop {
            let at = self.offset();
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Rem
            } else {
                break;
            };
            node = Node::Binary(op, Box::new(node), Box::new(self.unary()?), at);
        }
        Ok(node)
    }

    fn unary(&mut self) -> ParseResult {
        let at = self.offset();
        if self.eat_op("-") {
            return Ok(Node::Neg(Box::new(self.unary()?), at));
        }
        if self.eat_op("+") {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> ParseResult {
        let base = self.postfix()?;
        let at = self.offset();
        if self.eat_op("**") {
            // right-associative, binds tighter than a unary minus on its left
            let exponent = self.unary()?;
            return Ok(Node::Binary(BinOp::Pow, Box::new(base), Box::new(exponent), at));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> ParseResult {
        let mut node = self.primary()?;
        while self.eat_op(".") {
            let at = self.offset();
            let name = match self.advance() {
                Tok::Ident(name) => name,
                _ => return Err(format!("expected method name at position {}", at)),
            };
            self.expect_op("(")?;
            let mut args = vec![node];
            args.extend(self.arguments()?);
            node = Node::Call(name, args, at);
        }
        Ok(node)
    }

    /// Arguments after an opening parenthesis, up to and including `)`.
    fn arguments(&mut self) -> std::result::Result<Vec<Node>, String> {
        let mut args = Vec::new();
        if self.eat_op(")") {
            return Ok(args);
        }
        loop {
            args.push(self.or_expr()?);
            if self.eat_op(")") {
                return Ok(args);
            }
            self.expect_op(",")?;
        }
    }

    fn primary(&mut self) -> ParseResult {
        let at = self.offset();
        match self.advance() {
            Tok::Num(n) => Ok(Node::Literal(Value::Number(n))),
            Tok::Str(s) => Ok(Node::Literal(Value::Str(s))),
            Tok::Placeholder(name) => Ok(Node::Var(name, at)),
            Tok::Ident(word) => match word.as_str() {
                "true" | "True" => Ok(Node::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Node::Literal(Value::Bool(false))),
                _ if self.eat_op("(") => Ok(Node::Call(word, self.arguments()?, at)),
                _ => Ok(Node::Var(word, at)),
            },
            Tok::Op("(") => {
                let node = self.or_expr()?;
                self.expect_op(")")?;
                Ok(node)
            }
            Tok::End => Err(format!("unexpected end of expression at position {}", at)),
            Tok::Op(op) => Err(format!("unexpected '{}' at position {}", op, at)),
        }
    }
}

/// A parsed expression, reusable across environments.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    root: Node,
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source).map_err(|message| PartsError::Expression {
            expression: source.to_string(),
            message,
        })?;
        let root = Parser { tokens, pos: 0 }
            .parse()
            .map_err(|message| PartsError::Expression {
                expression: source.to_string(),
                message,
            })?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, env: &Env) -> Result<Value> {
        eval_node(&self.root, env).map_err(|message| PartsError::Expression {
            expression: self.source.clone(),
            message,
        })
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(source: &str, env: &Env) -> Result<Value> {
    Expr::parse(source)?.eval(env)
}

type EvalResult = std::result::Result<Value, String>;

fn number(value: &Value, at: usize) -> std::result::Result<f64, String> {
    value.as_number().ok_or_else(|| {
        format!(
            "expected a number at position {}, got {}",
            at,
            value.type_name()
        )
    })
}

fn eval_node(node: &Node, env: &Env) -> EvalResult {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Var(name, at) => env
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unknown variable '{}' at position {}", name, at)),
        Node::Neg(inner, at) => {
            let value = eval_node(inner, env)?;
            Ok(Value::Number(-number(&value, *at)?))
        }
        Node::Not(inner) => Ok(Value::Bool(!eval_node(inner, env)?.truthy())),
        Node::And(lhs, rhs) => {
            let left = eval_node(lhs, env)?;
            if !left.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_node(rhs, env)?.truthy()))
        }
        Node::Or(lhs, rhs) => {
            let left = eval_node(lhs, env)?;
            if left.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_node(rhs, env)?.truthy()))
        }
        Node::Binary(op, lhs, rhs, at) => {
            let left = eval_node(lhs, env)?;
            let right = eval_node(rhs, env)?;
            binary(*op, &left, &right, *at)
        }
        Node::Compare(first, rest) => {
            let mut left = eval_node(first, env)?;
            for (op, rhs, at) in rest {
                let right = eval_node(rhs, env)?;
                if !compare(*op, &left, &right, *at)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Node::Call(name, args, at) => {
            let values = args
                .iter()
                .map(|arg| eval_node(arg, env))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            call(name, &values, *at)
        }
    }
}

fn binary(op: BinOp, left: &Value, right: &Value, at: usize) -> EvalResult {
    if let (BinOp::Add, Value::Str(a), Value::Str(b)) = (op, left, right) {
        return Ok(Value::Str(format!("{}{}", a, b)));
    }
    let (a, b) = (number(left, at)?, number(right, at)?);
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(format!("division by zero at position {}", at));
            }
            a / b
        }
        BinOp::Rem => {
            if b == 0.0 {
                return Err(format!("division by zero at position {}", at));
            }
            // result takes the sign of the divisor
            a - b * (a / b).floor()
        }
        BinOp::Pow => a.powf(b),
    };
    Ok(Value::Number(result))
}

fn compare(op: CmpOp, left: &Value, right: &Value, at: usize) -> std::result::Result<bool, String> {
    match op {
        CmpOp::Eq => return Ok(left == right),
        CmpOp::Ne => return Ok(left != right),
        _ => {}
    }

    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => number(left, at)?.partial_cmp(&number(right, at)?),
    };
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
    })
}

fn arity(name: &str, args: &[Value], allowed: &[usize], at: usize) -> std::result::Result<(), String> {
    if allowed.contains(&args.len()) {
        Ok(())
    } else {
        let expected: Vec<String> = allowed.iter().map(|n| n.to_string()).collect();
        Err(format!(
            "{}() takes {} argument(s), got {} at position {}",
            name,
            expected.join(" or "),
            args.len(),
            at
        ))
    }
}

fn hist<'a>(name: &str, value: &'a Value, at: usize) -> std::result::Result<&'a Histogram1D, String> {
    match value {
        Value::Hist(h) => Ok(h),
        other => Err(format!(
            "{}() expects a histogram at position {}, got {}",
            name,
            at,
            other.type_name()
        )),
    }
}

fn bin_index(value: &Value, at: usize) -> std::result::Result<usize, String> {
    let n = number(value, at)?;
    if n < 0.0 || !n.is_finite() {
        return Err(format!("invalid bin index {} at position {}", n, at));
    }
    Ok(n as usize)
}

fn call(name: &str, args: &[Value], at: usize) -> EvalResult {
    let num = |v: f64| -> EvalResult { Ok(Value::Number(v)) };
    match name {
        "abs" | "sqrt" | "exp" => {
            arity(name, args, &[1], at)?;
            let x = number(&args[0], at)?;
            match name {
                "abs" => num(x.abs()),
                "sqrt" => num(x.sqrt()),
                _ => num(x.exp()),
            }
        }
        "log" => {
            arity(name, args, &[1, 2], at)?;
            let x = number(&args[0], at)?;
            match args.get(1) {
                Some(base) => num(x.log(number(base, at)?)),
                None => num(x.ln()),
            }
        }
        "pow" => {
            arity(name, args, &[2], at)?;
            num(number(&args[0], at)?.powf(number(&args[1], at)?))
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(format!("{}() needs at least one argument at position {}", name, at));
            }
            let values = args
                .iter()
                .map(|v| number(v, at))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let pick = if name == "min" { f64::min } else { f64::max };
            num(values.into_iter().reduce(pick).unwrap_or(f64::NAN))
        }
        "mean" | "GetMean" => {
            arity(name, args, &[1], at)?;
            num(hist(name, &args[0], at)?.mean())
        }
        "rms" | "stddev" | "GetRMS" | "GetStdDev" => {
            arity(name, args, &[1], at)?;
            num(hist(name, &args[0], at)?.std_dev())
        }
        "integral" | "Integral" => {
            arity(name, args, &[1, 3], at)?;
            let h = hist(name, &args[0], at)?;
            if args.len() == 3 {
                num(h.integral_bins(bin_index(&args[1], at)?, bin_index(&args[2], at)?))
            } else {
                num(h.integral())
            }
        }
        "entries" | "GetEntries" => {
            arity(name, args, &[1], at)?;
            num(hist(name, &args[0], at)?.entries)
        }
        "maximum" | "GetMaximum" => {
            arity(name, args, &[1], at)?;
            num(hist(name, &args[0], at)?.maximum())
        }
        "minimum" | "GetMinimum" => {
            arity(name, args, &[1], at)?;
            num(hist(name, &args[0], at)?.minimum())
        }
        "bin_content" | "GetBinContent" => {
            arity(name, args, &[2], at)?;
            num(hist(name, &args[0], at)?.bin_content(bin_index(&args[1], at)?))
        }
        "bin_error" | "GetBinError" => {
            arity(name, args, &[2], at)?;
            num(hist(name, &args[0], at)?.bin_error(bin_index(&args[1], at)?))
        }
        "nbins" | "GetNbinsX" => {
            arity(name, args, &[1], at)?;
            num(hist(name, &args[0], at)?.nbins as f64)
        }
        "find_bin" | "FindBin" => {
            arity(name, args, &[2], at)?;
            num(hist(name, &args[0], at)?.find_bin(number(&args[1], at)?) as f64)
        }
        "quantile" => {
            arity(name, args, &[2], at)?;
            num(hist(name, &args[0], at)?.quantile(number(&args[1], at)?))
        }
        _ => Err(format!("unknown function '{}' at position {}", name, at)),
    }
}
