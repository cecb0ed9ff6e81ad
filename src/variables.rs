//! Task variables.
//!
//! Each machine owns a [`Variables`] table: name → dynamically typed
//! [`Value`], readable and writable by handlers through the context and by
//! the host through `set_variable` / `get_variable`.  Names starting with
//! [`HARDWARE_PREFIX`] are hardware variables: the task declares them
//! without a value and the per-setup configuration must supply one before
//! the run may start.
//!
//! Host text is turned into values with [`parse_value`], which never fails:
//! anything that is not a recognisable literal comes back as
//! [`Parsed::Raw`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{truncated, Error, Result};

/// Reserved prefix for per-setup hardware variables.
pub const HARDWARE_PREFIX: &str = "hw_";

/// Dynamically typed variable value.
///
/// Externally tagged so it survives non-self-describing formats (postcard);
/// JSON storage goes through [`Value::to_json`] / [`Value::from_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Convert from JSON.  `null` has no counterpart and yields `None`,
    /// as does any list or map containing one.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        Some(match json {
            serde_json::Value::Null => return None,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64()?),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| Self::from_json(v).map(|v| (k, v)))
                    .collect::<Option<BTreeMap<_, _>>>()?,
            ),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

// ───────────────────────────────────────────────────────────────
// Text parsing
// ───────────────────────────────────────────────────────────────

/// Outcome of [`parse_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// The text was a literal of a known type.
    Value(Value),
    /// Not a literal; keep the text as typed.
    Raw(String),
}

impl Parsed {
    /// Collapse to a value, keeping raw text as a string.
    pub fn into_value(self) -> Value {
        match self {
            Self::Value(v) => v,
            Self::Raw(s) => Value::Str(s),
        }
    }
}

/// Interpret user-entered text as a typed value.
///
/// Accepts `True`/`False` (either case convention), integers, finite
/// floats, single- or double-quoted strings, and lists, tuples and dicts
/// written as Python or JSON literals.  Tuples become lists.
pub fn parse_value(text: &str) -> Parsed {
    let t = text.trim();
    let value = match t {
        "True" | "true" => Some(Value::Bool(true)),
        "False" | "false" => Some(Value::Bool(false)),
        _ => parse_number(t)
            .or_else(|| parse_quoted(t))
            .or_else(|| parse_compound(t)),
    };
    value.map_or_else(|| Parsed::Raw(t.to_owned()), Parsed::Value)
}

fn parse_number(t: &str) -> Option<Value> {
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::Int(i));
    }
    // Rust accepts "inf" and "NaN"; a typed-in word is not a number.
    let starts_numeric = t
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    match t.parse::<f64>() {
        Ok(f) if starts_numeric && f.is_finite() => Some(Value::Float(f)),
        _ => None,
    }
}

fn parse_quoted(t: &str) -> Option<Value> {
    if t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'') {
        return Some(Value::Str(t[1..t.len() - 1].to_owned()));
    }
    if t.starts_with('"') {
        return serde_json::from_str::<String>(t).ok().map(Value::Str);
    }
    None
}

fn parse_compound(t: &str) -> Option<Value> {
    if !t.starts_with(['[', '(', '{']) {
        return None;
    }
    let mut lit = Literal { text: t, pos: 0 };
    let value = lit.value()?;
    lit.skip_space();
    (lit.pos == t.len()).then_some(value)
}

/// Recursive reader for list, tuple and dict literals in either Python or
/// JSON spelling.  `None`/`null` anywhere yields `None`, so the whole text
/// falls back to [`Parsed::Raw`].
struct Literal<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Literal<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_space(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_space();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_space();
        match self.peek()? {
            '[' => {
                self.bump();
                self.sequence(']').map(|(items, _)| Value::List(items))
            }
            '(' => {
                self.bump();
                let (mut items, trailing_comma) = self.sequence(')')?;
                // `(x)` is only parentheses; `(x,)` is a one-element tuple.
                if items.len() == 1 && !trailing_comma {
                    items.pop()
                } else {
                    Some(Value::List(items))
                }
            }
            '{' => {
                self.bump();
                self.dict()
            }
            q @ ('\'' | '"') => {
                self.bump();
                self.string(q).map(Value::Str)
            }
            _ => self.scalar(),
        }
    }

    /// Comma-separated values up to `close`.  Returns whether the last
    /// item was followed by a comma.
    fn sequence(&mut self, close: char) -> Option<(Vec<Value>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.eat(close) {
                return Some((items, trailing_comma));
            }
            items.push(self.value()?);
            trailing_comma = self.eat(',');
            if !trailing_comma {
                return self.eat(close).then_some((items, false));
            }
        }
    }

    fn dict(&mut self) -> Option<Value> {
        let mut map = BTreeMap::new();
        loop {
            if self.eat('}') {
                return Some(Value::Map(map));
            }
            self.skip_space();
            let q = self.bump().filter(|c| matches!(c, '\'' | '"'))?;
            let key = self.string(q)?;
            if !self.eat(':') {
                return None;
            }
            let value = self.value()?;
            map.insert(key, value);
            if !self.eat(',') {
                return self.eat('}').then_some(Value::Map(map));
            }
        }
    }

    /// Body of a string whose opening quote `q` was consumed.
    fn string(&mut self, q: char) -> Option<String> {
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == q => return Some(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'u' => {
                        let hex = self.rest().get(..4)?;
                        let code = u32::from_str_radix(hex, 16).ok()?;
                        out.push(char::from_u32(code)?);
                        self.pos += 4;
                    }
                    c @ ('\\' | '\'' | '"' | '/') => out.push(c),
                    _ => return None,
                },
                c => out.push(c),
            }
        }
    }

    fn scalar(&mut self) -> Option<Value> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | ']' | ')' | '}'))
            .unwrap_or(rest.len());
        let word = &rest[..len];
        self.pos += len;
        match word {
            "True" | "true" => Some(Value::Bool(true)),
            "False" | "false" => Some(Value::Bool(false)),
            _ => parse_number(word),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Variable table
// ───────────────────────────────────────────────────────────────

/// One machine's variable bindings.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, Value>,
    /// Hardware variables declared by the task, in declaration order.
    hardware: Vec<String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable with its default value.
    pub fn declare(&mut self, name: &str, default: Value) {
        self.values.insert(name.to_owned(), default);
    }

    /// Declare a hardware variable that has no task default.
    pub fn declare_hardware(&mut self, name: &str) {
        if !self.hardware.iter().any(|h| h == name) {
            self.hardware.push(name.to_owned());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.is_hardware(name)
    }

    pub fn is_hardware(&self, name: &str) -> bool {
        self.hardware.iter().any(|h| h == name)
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| Error::unknown_variable(name))
    }

    /// Overwrite a declared variable.  The new value may change type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if !self.contains(name) {
            return Err(Error::unknown_variable(name));
        }
        self.values.insert(name.to_owned(), value);
        Ok(())
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        self.get(name)?
            .as_int()
            .ok_or_else(|| Error::VariableType(truncated(name)))
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        self.get(name)?
            .as_float()
            .ok_or_else(|| Error::VariableType(truncated(name)))
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        self.get(name)?
            .as_bool()
            .ok_or_else(|| Error::VariableType(truncated(name)))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.get(name)?
            .as_str()
            .ok_or_else(|| Error::VariableType(truncated(name)))
    }

    /// Hardware variables still lacking a value.
    pub fn undefined_hardware(&self) -> impl Iterator<Item = &str> {
        self.hardware
            .iter()
            .filter(|h| !self.values.contains_key(h.as_str()))
            .map(String::as_str)
    }

    pub fn hardware_names(&self) -> impl Iterator<Item = &str> {
        self.hardware.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
