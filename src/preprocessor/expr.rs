/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Expression language for preprocessor directives and substitutions.
//!
//! Integer/boolean arithmetic over arbitrary-precision integers:
//! `+ - * ** // / << >> and or not == != < <= > >=`, with `/` accepted as a
//! legacy synonym for `//` (this loses information
//! when float intent was meant, which is an intentional quirk we preserve).
//! Evaluation is strict — every operand is fully resolved before an
//! operator is applied — and names resolve against a [`DefineEnv`].

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::fmt;

use crate::errors::PreprocessorError;

pub type PResult<T> = Result<T, PreprocessorError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(BigInt),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_int(&self, file: &str, line: usize) -> PResult<BigInt> {
        match self {
            Value::Int(i) => Ok(i.clone()),
            Value::Bool(b) => Ok(BigInt::from(if *b { 1 } else { 0 })),
            other => Err(PreprocessorError::NonIntegerResult {
                file: file.to_string(),
                line,
                found: other.type_name().to_string(),
            }),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Int(i) => !i.is_zero(),
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Name resolution environment: the `defines` map of a [`super::Scope`].
pub trait DefineEnv {
    /// Returns the raw expression text bound to `name`, if any.
    fn lookup(&self, name: &str) -> Option<String>;
}

// --- tokenizer -------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(BigInt),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Op(&'static str),
}

fn tokenize(src: &str, file: &str, line: usize) -> PResult<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '[' {
            tokens.push(Token::LBracket);
            i += 1;
        } else if c == ']' {
            tokens.push(Token::RBracket);
            i += 1;
        } else if c == ',' {
            tokens.push(Token::Comma);
            i += 1;
        } else if c == '"' {
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                s.push(chars[i]);
                i += 1;
            }
            i += 1;
            tokens.push(Token::Str(s));
        } else if c.is_ascii_digit() {
            let start = i;
            if c == '0' && i + 1 < chars.len() && (chars[i + 1] == 'x' || chars[i + 1] == 'X') {
                i += 2;
                let hex_start = i;
                while i < chars.len() && chars[i].is_ascii_hexdigit() {
                    i += 1;
                }
                let text: String = chars[hex_start..i].iter().collect();
                let value = BigInt::parse_bytes(text.as_bytes(), 16).ok_or_else(|| {
                    PreprocessorError::ExpressionFailure {
                        file: file.to_string(),
                        line,
                        reason: format!("invalid hex literal '0x{text}'"),
                    }
                })?;
                tokens.push(Token::Int(value));
            } else if c == '0' && i + 1 < chars.len() && (chars[i + 1] == 'b' || chars[i + 1] == 'B') {
                i += 2;
                let bin_start = i;
                while i < chars.len() && (chars[i] == '0' || chars[i] == '1') {
                    i += 1;
                }
                let text: String = chars[bin_start..i].iter().collect();
                let value = BigInt::parse_bytes(text.as_bytes(), 2).ok_or_else(|| {
                    PreprocessorError::ExpressionFailure {
                        file: file.to_string(),
                        line,
                        reason: format!("invalid binary literal '0b{text}'"),
                    }
                })?;
                tokens.push(Token::Int(value));
            } else {
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Int(text.parse().unwrap()));
            }
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::Ident(text));
        } else {
            // multi-char operators, longest match first
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            if two == "**" {
                tokens.push(Token::Op("**"));
                i += 2;
            } else if two == "//" {
                tokens.push(Token::Op("//"));
                i += 2;
            } else if two == "<<" {
                tokens.push(Token::Op("<<"));
                i += 2;
            } else if two == ">>" {
                tokens.push(Token::Op(">>"));
                i += 2;
            } else if two == "==" {
                tokens.push(Token::Op("=="));
                i += 2;
            } else if two == "!=" {
                tokens.push(Token::Op("!="));
                i += 2;
            } else if two == "<=" {
                tokens.push(Token::Op("<="));
                i += 2;
            } else if two == ">=" {
                tokens.push(Token::Op(">="));
                i += 2;
            } else {
                let op = match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    '<' => "<",
                    '>' => ">",
                    _ => {
                        return Err(PreprocessorError::ExpressionFailure {
                            file: file.to_string(),
                            line,
                            reason: format!("unexpected character '{c}'"),
                        });
                    }
                };
                tokens.push(Token::Op(op));
                i += 1;
            }
        }
    }
    Ok(tokens)
}

// --- recursive-descent parser / evaluator -----------------------------

struct Parser<'a, E: DefineEnv> {
    tokens: Vec<Token>,
    pos: usize,
    env: &'a E,
    file: String,
    line: usize,
    loop_vars: &'a [(String, Value)],
}

impl<'a, E: DefineEnv> Parser<'a, E> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_op(&mut self, op: &str) -> PResult<()> {
        match self.next() {
            Some(Token::Op(o)) if o == op => Ok(()),
            other => Err(self.fail(format!("expected '{op}', found {other:?}"))),
        }
    }

    fn fail(&self, reason: String) -> PreprocessorError {
        PreprocessorError::ExpressionFailure {
            file: self.file.clone(),
            line: self.line,
            reason,
        }
    }

    fn resolve_name(&self, name: &str) -> PResult<Value> {
        if name == "and" || name == "or" || name == "not" {
            return Err(self.fail(format!("'{name}' used as a name")));
        }
        if name == "true" || name == "false" {
            return Ok(Value::Bool(name == "true"));
        }
        if let Some((_, v)) = self.loop_vars.iter().find(|(n, _)| n == name) {
            return Ok(v.clone());
        }
        match self.env.lookup(name) {
            Some(rhs) => eval_str(&rhs, self.env, self.file.as_str(), self.line, self.loop_vars),
            None => Err(PreprocessorError::UndefinedName {
                file: self.file.clone(),
                line: self.line,
                name: name.to_string(),
            }),
        }
    }

    // or_expr (lowest precedence) down to atoms.
    fn parse_or(&mut self) -> PResult<Value> {
        let mut lhs = self.parse_and()?;
        while let Some(Token::Ident(name)) = self.peek() {
            if name == "or" {
                self.pos += 1;
                let rhs = self.parse_and()?;
                lhs = Value::Bool(lhs.as_bool() || rhs.as_bool());
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Value> {
        let mut lhs = self.parse_not()?;
        while let Some(Token::Ident(name)) = self.peek() {
            if name == "and" {
                self.pos += 1;
                let rhs = self.parse_not()?;
                lhs = Value::Bool(lhs.as_bool() && rhs.as_bool());
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> PResult<Value> {
        if let Some(Token::Ident(name)) = self.peek() {
            if name == "not" {
                self.pos += 1;
                let v = self.parse_not()?;
                return Ok(Value::Bool(!v.as_bool()));
            }
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Value> {
        let lhs = self.parse_shift()?;
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if matches!(op, "==" | "!=" | "<" | "<=" | ">" | ">=") {
                self.pos += 1;
                let rhs = self.parse_shift()?;
                let li = lhs.as_int(&self.file, self.line)?;
                let ri = rhs.as_int(&self.file, self.line)?;
                let result = match op {
                    "==" => li == ri,
                    "!=" => li != ri,
                    "<" => li < ri,
                    "<=" => li <= ri,
                    ">" => li > ri,
                    ">=" => li >= ri,
                    _ => unreachable!(),
                };
                return Ok(Value::Bool(result));
            }
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> PResult<Value> {
        let mut lhs = self.parse_additive()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if op == "<<" || op == ">>" {
                self.pos += 1;
                let rhs = self.parse_additive()?;
                let li = lhs.as_int(&self.file, self.line)?;
                let ri = rhs.as_int(&self.file, self.line)?;
                let shift = ri.to_u32().ok_or_else(|| self.fail("shift amount out of range".into()))?;
                lhs = Value::Int(if op == "<<" { li << shift } else { li >> shift });
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Value> {
        let mut lhs = self.parse_multiplicative()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if op == "+" || op == "-" {
                self.pos += 1;
                let rhs = self.parse_multiplicative()?;
                let li = lhs.as_int(&self.file, self.line)?;
                let ri = rhs.as_int(&self.file, self.line)?;
                lhs = Value::Int(if op == "+" { li + ri } else { li - ri });
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Value> {
        let mut lhs = self.parse_unary()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            // `/` is a legacy synonym for `//`.
            if op == "*" || op == "//" || op == "/" {
                self.pos += 1;
                let rhs = self.parse_unary()?;
                let li = lhs.as_int(&self.file, self.line)?;
                let ri = rhs.as_int(&self.file, self.line)?;
                lhs = Value::Int(match op {
                    "*" => li * ri,
                    _ => {
                        if ri.is_zero() {
                            return Err(self.fail("division by zero".into()));
                        }
                        floor_div(&li, &ri)
                    }
                });
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Value> {
        if let Some(Token::Op("-")) = self.peek() {
            self.pos += 1;
            let v = self.parse_unary()?;
            return Ok(Value::Int(-v.as_int(&self.file, self.line)?));
        }
        if let Some(Token::Op("+")) = self.peek() {
            self.pos += 1;
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PResult<Value> {
        let base = self.parse_call_or_atom()?;
        if let Some(Token::Op("**")) = self.peek() {
            self.pos += 1;
            // right-associative
            let exponent = self.parse_unary()?;
            let b = base.as_int(&self.file, self.line)?;
            let e = exponent
                .as_int(&self.file, self.line)?
                .to_u32()
                .ok_or_else(|| self.fail("exponent out of range".into()))?;
            return Ok(Value::Int(b.pow(e)));
        }
        Ok(base)
    }

    fn parse_call_or_atom(&mut self) -> PResult<Value> {
        if let Some(Token::Ident(name)) = self.peek().cloned() {
            if name == "range" {
                self.pos += 1;
                self.expect_lparen()?;
                let mut args = Vec::new();
                if !matches!(self.peek(), Some(Token::RParen)) {
                    loop {
                        args.push(self.parse_or()?.as_int(&self.file, self.line)?);
                        match self.peek() {
                            Some(Token::Comma) => {
                                self.pos += 1;
                            }
                            _ => break,
                        }
                    }
                }
                self.expect_rparen()?;
                let (start, stop, step) = match args.len() {
                    1 => (BigInt::zero(), args[0].clone(), BigInt::from(1)),
                    2 => (args[0].clone(), args[1].clone(), BigInt::from(1)),
                    3 => (args[0].clone(), args[1].clone(), args[2].clone()),
                    _ => return Err(self.fail("range() takes 1 to 3 arguments".into())),
                };
                if step.is_zero() {
                    return Err(self.fail("range() step cannot be zero".into()));
                }
                let mut items = Vec::new();
                let mut cur = start;
                if step > BigInt::zero() {
                    while cur < stop {
                        items.push(Value::Int(cur.clone()));
                        cur += &step;
                    }
                } else {
                    while cur > stop {
                        items.push(Value::Int(cur.clone()));
                        cur += &step;
                    }
                }
                return Ok(Value::List(items));
            }
        }
        self.parse_atom()
    }

    fn expect_lparen(&mut self) -> PResult<()> {
        match self.next() {
            Some(Token::LParen) => Ok(()),
            other => Err(self.fail(format!("expected '(', found {other:?}"))),
        }
    }

    fn expect_rparen(&mut self) -> PResult<()> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            other => Err(self.fail(format!("expected ')', found {other:?}"))),
        }
    }

    fn parse_atom(&mut self) -> PResult<Value> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Value::Int(i)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::Ident(name)) => self.resolve_name(&name),
            Some(Token::LParen) => {
                let v = self.parse_or()?;
                self.expect_rparen()?;
                Ok(v)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(Token::RBracket)) {
                    loop {
                        items.push(self.parse_or()?);
                        match self.peek() {
                            Some(Token::Comma) => {
                                self.pos += 1;
                            }
                            _ => break,
                        }
                    }
                }
                match self.next() {
                    Some(Token::RBracket) => Ok(Value::List(items)),
                    other => Err(self.fail(format!("expected ']', found {other:?}"))),
                }
            }
            other => Err(self.fail(format!("unexpected token {other:?}"))),
        }
    }
}

fn floor_div(a: &BigInt, b: &BigInt) -> BigInt {
    let (q, r) = (a / b, a % b);
    if !r.is_zero() && (r < BigInt::zero()) != (b < &BigInt::zero()) {
        q - 1
    } else {
        q
    }
}

/// Evaluates a raw expression string under `env`, with `loop_vars` (the
/// currently-open `#for` loop variables, innermost last) taking precedence
/// over the defines map.
pub fn eval_str<E: DefineEnv>(
    expr: &str,
    env: &E,
    file: &str,
    line: usize,
    loop_vars: &[(String, Value)],
) -> PResult<Value> {
    let tokens = tokenize(expr, file, line)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        env,
        file: file.to_string(),
        line,
        loop_vars,
    };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(PreprocessorError::ExpressionFailure {
            file: file.to_string(),
            line,
            reason: "trailing tokens after expression".to_string(),
        });
    }
    Ok(value)
}

/// Evaluates an expression to an integer (the common case for `#define`,
/// `#if` width/condition arithmetic, and `$()` substitutions).
pub fn eval_int<E: DefineEnv>(
    expr: &str,
    env: &E,
    file: &str,
    line: usize,
    loop_vars: &[(String, Value)],
) -> PResult<BigInt> {
    eval_str(expr, env, file, line, loop_vars)?.as_int(file, line)
}

/// Evaluates an expression to a boolean (predicates for `#if`/`#elif`).
pub fn eval_bool<E: DefineEnv>(
    expr: &str,
    env: &E,
    file: &str,
    line: usize,
    loop_vars: &[(String, Value)],
) -> PResult<bool> {
    Ok(eval_str(expr, env, file, line, loop_vars)?.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestEnv(HashMap<String, String>);

    impl DefineEnv for TestEnv {
        fn lookup(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    #[test]
    fn define_arithmetic() {
        let mut defines = HashMap::new();
        defines.insert("VAL_1".to_string(), "3".to_string());
        defines.insert("VAL_2".to_string(), "5".to_string());
        defines.insert("VAL_3".to_string(), "(VAL_1 * VAL_2)".to_string());
        let env = TestEnv(defines);
        let result = eval_int("VAL_3", &env, "t", 1, &[]).unwrap();
        assert_eq!(result, BigInt::from(15));
    }

    #[test]
    fn legacy_slash_is_floor_div() {
        let env = TestEnv(HashMap::new());
        let result = eval_int("7 / 2", &env, "t", 1, &[]).unwrap();
        assert_eq!(result, BigInt::from(3));
        let result = eval_int("7 // 2", &env, "t", 1, &[]).unwrap();
        assert_eq!(result, BigInt::from(3));
    }

    #[test]
    fn range_is_finite_list() {
        let env = TestEnv(HashMap::new());
        let result = eval_str("range(3)", &env, "t", 1, &[]).unwrap();
        assert_eq!(
            result,
            Value::List(vec![
                Value::Int(BigInt::from(0)),
                Value::Int(BigInt::from(1)),
                Value::Int(BigInt::from(2)),
            ])
        );
    }

    #[test]
    fn boolean_and_comparison() {
        let env = TestEnv(HashMap::new());
        assert!(eval_bool("1 == 1 and 2 < 3", &env, "t", 1, &[]).unwrap());
        assert!(!eval_bool("not (1 == 1)", &env, "t", 1, &[]).unwrap());
    }

    #[test]
    fn undefined_name_errors() {
        let env = TestEnv(HashMap::new());
        let err = eval_int("UNKNOWN", &env, "t", 1, &[]).unwrap_err();
        assert!(matches!(err, PreprocessorError::UndefinedName { .. }));
    }
}
