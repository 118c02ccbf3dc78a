use anyhow::{anyhow, bail, Result};
use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::definitions::ExpressionEvaluator;
use crate::errors::OrchestrationError;
use crate::types::{ParameterMap, PlatformSpecifics, Scalar};

const MAX_PASSES: usize = 8;
const CALCULATE: &str = "{calculate(";

fn reference_expression() -> &'static Regex {
    static EXPRESSION: OnceLock<Regex> = OnceLock::new();
    EXPRESSION.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_\-\.]+)\}").expect("valid reference pattern"))
}

/// Default evaluator for profile expressions.
///
/// Supports `{Platform}`, `{LogicalCoreCount}`, `{<ParameterName>}` references and
/// `{calculate(...)}` over integer arithmetic, comparisons, `&&`/`||`/`!` and `a ? b : c`.
#[derive(Debug, Clone)]
pub struct ProfileExpressionEvaluator {
    platform: Option<PlatformSpecifics>,
    logical_cores: usize,
}

impl Default for ProfileExpressionEvaluator {
    fn default() -> Self {
        Self {
            platform: PlatformSpecifics::current().ok(),
            logical_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl ProfileExpressionEvaluator {
    pub fn new(platform: Option<PlatformSpecifics>, logical_cores: usize) -> Self {
        Self {
            platform,
            logical_cores,
        }
    }

    pub fn evaluate_text(&self, text: &str, parameters: &ParameterMap) -> Result<String> {
        if !text.contains('{') {
            return Ok(text.to_string());
        }

        let replaced = reference_expression().replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            if name.eq_ignore_ascii_case("Platform") {
                if let Some(platform) = &self.platform {
                    return platform.name();
                }
            } else if name.eq_ignore_ascii_case("LogicalCoreCount") {
                return self.logical_cores.to_string();
            }

            match parameters.get(name) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        });

        resolve_calculations(&replaced)
    }
}

impl ExpressionEvaluator for ProfileExpressionEvaluator {
    fn evaluate(&self, parameters: &mut ParameterMap) -> Result<()> {
        for _ in 0..MAX_PASSES {
            let snapshot = parameters.clone();
            let mut changed = false;

            for (_, value) in parameters.iter_mut() {
                let Scalar::String(text) = value else {
                    continue;
                };

                let evaluated = self.evaluate_text(text, &snapshot)?;
                if evaluated != *text {
                    *value = Scalar::from_text(&evaluated);
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        Ok(())
    }
}

fn resolve_calculations(text: &str) -> Result<String> {
    let mut output = text.to_string();
    let mut search_from = 0;

    while let Some(offset) = output[search_from..].find(CALCULATE) {
        let start = search_from + offset;
        let inner_start = start + CALCULATE.len();
        let Some(inner_end) = closing_paren(&output, inner_start) else {
            break;
        };

        if !output[inner_end + 1..].starts_with('}') {
            search_from = inner_start;
            continue;
        }

        let inner = &output[inner_start..inner_end];
        if inner.contains('{') {
            // Unresolved references; a later pass may resolve them.
            search_from = inner_start;
            continue;
        }

        let value = calculate(inner).map_err(|e| {
            OrchestrationError::schema(format!("Invalid expression 'calculate({})'. {}", inner, e))
        })?;

        output.replace_range(start..inner_end + 2, &value);
        search_from = start;
    }

    Ok(output)
}

fn closing_paren(text: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (index, ch) in text[from..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' if depth == 0 => return Some(from + index),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Evaluates an integer/boolean expression and renders the result as text.
pub fn calculate(expression: &str) -> Result<String> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.ternary()?;
    if parser.pos != parser.tokens.len() {
        bail!("Unexpected trailing input");
    }

    Ok(match value {
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(i64),
    Bool(bool),
}

impl Value {
    fn int(self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(n),
            Value::Bool(_) => Err(anyhow!("Expected a number")),
        }
    }

    fn bool(self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(b),
            Value::Int(_) => Err(anyhow!("Expected a boolean")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(i64),
    Bool(bool),
    Op(&'static str),
}

const OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!", "?", ":", "(", ")",
];

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = expression.trim_start();

    while !rest.is_empty() {
        let ch = rest.chars().next().unwrap_or(' ');
        if ch.is_ascii_digit() {
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            tokens.push(Token::Num(rest[..end].parse()?));
            rest = &rest[end..];
        } else if ch.is_ascii_alphabetic() {
            let end = rest
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(rest.len());
            let word = &rest[..end];
            if word.eq_ignore_ascii_case("true") {
                tokens.push(Token::Bool(true));
            } else if word.eq_ignore_ascii_case("false") {
                tokens.push(Token::Bool(false));
            } else {
                bail!("Unknown identifier '{}'", word);
            }
            rest = &rest[end..];
        } else {
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| anyhow!("Unexpected character '{}'", ch))?;
            tokens.push(Token::Op(*op));
            rest = &rest[op.len()..];
        }
        rest = rest.trim_start();
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek_op(&self, op: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Op(o)) if *o == op)
    }

    fn eat(&mut self, op: &str) -> bool {
        if self.peek_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ternary(&mut self) -> Result<Value> {
        let condition = self.or()?;
        if self.eat("?") {
            let when_true = self.ternary()?;
            if !self.eat(":") {
                bail!("Expected ':' in conditional expression");
            }
            let when_false = self.ternary()?;
            return Ok(if condition.bool()? { when_true } else { when_false });
        }
        Ok(condition)
    }

    fn or(&mut self) -> Result<Value> {
        let mut left = self.and()?;
        while self.eat("||") {
            let right = self.and()?;
            left = Value::Bool(left.bool()? || right.bool()?);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value> {
        let mut left = self.comparison()?;
        while self.eat("&&") {
            let right = self.comparison()?;
            left = Value::Bool(left.bool()? && right.bool()?);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Value> {
        let left = self.additive()?;
        for op in ["==", "!=", "<=", ">=", "<", ">"] {
            if self.eat(op) {
                let right = self.additive()?;
                let result = match (op, left, right) {
                    ("==", l, r) => l == r,
                    ("!=", l, r) => l != r,
                    ("<=", l, r) => l.int()? <= r.int()?,
                    (">=", l, r) => l.int()? >= r.int()?,
                    ("<", l, r) => l.int()? < r.int()?,
                    (_, l, r) => l.int()? > r.int()?,
                };
                return Ok(Value::Bool(result));
            }
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Value> {
        let mut left = self.multiplicative()?;
        loop {
            if self.eat("+") {
                left = Value::Int(left.int()? + self.multiplicative()?.int()?);
            } else if self.eat("-") {
                left = Value::Int(left.int()? - self.multiplicative()?.int()?);
            } else {
                return Ok(left);
            }
        }
    }

    fn multiplicative(&mut self) -> Result<Value> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat("*") {
                "*"
            } else if self.eat("/") {
                "/"
            } else if self.eat("%") {
                "%"
            } else {
                return Ok(left);
            };

            let l = left.int()?;
            let r = self.unary()?.int()?;
            left = Value::Int(match op {
                "*" => l * r,
                _ if r == 0 => bail!("Division by zero"),
                "/" => l / r,
                _ => l % r,
            });
        }
    }

    fn unary(&mut self) -> Result<Value> {
        if self.eat("-") {
            return Ok(Value::Int(-self.unary()?.int()?));
        }
        if self.eat("!") {
            return Ok(Value::Bool(!self.unary()?.bool()?));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| anyhow!("Unexpected end of expression"))?;
        self.pos += 1;

        match token {
            Token::Num(n) => Ok(Value::Int(n)),
            Token::Bool(b) => Ok(Value::Bool(b)),
            Token::Op("(") => {
                let value = self.ternary()?;
                if !self.eat(")") {
                    bail!("Expected ')'");
                }
                Ok(value)
            }
            Token::Op(op) => bail!("Unexpected operator '{}'", op),
        }
    }
}
