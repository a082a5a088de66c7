//! Reading and writing `terraform.tfvars` files.
//!
//! Values are `serde_json::Value`s so that stage outputs (which terraform
//! reports as JSON) flow into the next stage's variables without conversion.
//! Only the literal subset of HCL the pipeline itself writes is supported:
//! `null`, booleans, numbers, quoted strings, lists and brace-delimited maps.

use std::fs;
use std::path::Path;

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::{IacError, IacResult};

/// File name of the per-stage variables file.
pub const TFVARS_FILE: &str = "terraform.tfvars";

/// Ordered set of variable assignments for one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TfVars {
    entries: Map<String, Value>,
}

impl TfVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, keeping its original position if already present.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// String value of a variable; `None` for null, missing or non-string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as tfvars text, one assignment per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(&render_key(key));
            out.push_str(" = ");
            out.push_str(&render_value_at(value, 0));
            out.push('\n');
        }
        out
    }

    /// Overwrite `path` with the rendered variables.
    pub fn write(&self, path: &Path) -> IacResult<()> {
        debug!("Writing {} variables to {:?}", self.len(), path);
        fs::write(path, self.render())?;
        Ok(())
    }

    /// Parse tfvars text.
    pub fn parse(text: &str) -> IacResult<Self> {
        Parser::new(text).parse_file()
    }

    /// Read a tfvars file; `Ok(None)` when it does not exist.
    pub fn read(path: &Path) -> IacResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map(Some)
    }
}

impl FromIterator<(String, Value)> for TfVars {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Render a single value in tfvars syntax.
pub fn render_value(value: &Value) -> String {
    render_value_at(value, 0)
}

fn render_value_at(value: &Value, indent: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(|v| render_value_at(v, indent)).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) => {
            let pad = " ".repeat(indent + 2);
            let mut out = String::from("{\n");
            for (key, item) in map {
                out.push_str(&pad);
                out.push_str(&render_key(key));
                out.push_str(" = ");
                out.push_str(&render_value_at(item, indent + 2));
                out.push('\n');
            }
            out.push_str(&" ".repeat(indent));
            out.push('}');
            out
        }
    }
}

/// Quote a string, escaping control characters and template sequences so
/// terraform reads it back verbatim.
fn quote(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .replace("${", "$${")
        .replace("%{", "%%{");
    format!("\"{}\"", escaped)
}

fn render_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> IacError {
        IacError::TfvarsParse {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn expect(&mut self, expected: char) -> IacResult<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    /// Skip blanks and comments, and newlines too when `newlines` is set.
    fn skip_trivia(&mut self, newlines: bool) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' if newlines => {
                    self.bump();
                }
                '#' => self.skip_line(),
                '/' if self.chars.get(self.pos + 1) == Some(&'/') => self.skip_line(),
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn parse_file(mut self) -> IacResult<TfVars> {
        let mut vars = TfVars::new();
        loop {
            self.skip_trivia(true);
            if self.peek().is_none() {
                break;
            }
            let key = self.parse_key()?;
            self.skip_trivia(false);
            self.expect('=')?;
            self.skip_trivia(false);
            let value = self.parse_value()?;
            vars.set(key, value);

            self.skip_trivia(false);
            match self.peek() {
                None | Some('\n') => {}
                Some(c) => return Err(self.error(format!("unexpected '{}' after value", c))),
            }
        }
        Ok(vars)
    }

    fn parse_key(&mut self) -> IacResult<String> {
        if self.peek() == Some('"') {
            return self.parse_string();
        }
        let word = self.parse_word();
        if word.is_empty() {
            return Err(self.error("expected variable name"));
        }
        Ok(word)
    }

    fn parse_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+') {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn parse_value(&mut self) -> IacResult<Value> {
        match self.peek() {
            Some('"') => self.parse_string().map(Value::String),
            Some('[') => self.parse_list(),
            Some('{') => self.parse_map(),
            Some(_) => {
                let word = self.parse_word();
                self.parse_literal(&word)
            }
            None => Err(self.error("expected value, found end of input")),
        }
    }

    fn parse_literal(&self, word: &str) -> IacResult<Value> {
        match word {
            "" => Err(self.error("expected value")),
            "null" => Ok(Value::Null),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => {
                if let Ok(i) = word.parse::<i64>() {
                    return Ok(Value::Number(i.into()));
                }
                word.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| self.error(format!("unsupported expression '{}'", word)))
            }
        }
    }

    fn parse_string(&mut self) -> IacResult<String> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            if matches!(self.peek(), Some('\n') | None) {
                return Err(self.error("unterminated string"));
            }
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c @ ('"' | '\\')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(c @ ('$' | '%')) if self.is_template_escape(c) => {
                    self.bump();
                    out.push(c);
                }
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    /// `$${` and `%%{` stand for a literal `${` and `%{`.
    fn is_template_escape(&self, c: char) -> bool {
        self.peek() == Some(c) && self.chars.get(self.pos + 1) == Some(&'{')
    }

    fn parse_list(&mut self) -> IacResult<Value> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia(true);
            if self.peek() == Some(']') {
                self.bump();
                return Ok(Value::Array(items));
            }
            items.push(self.parse_value()?);
            self.skip_trivia(true);
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {}
                _ => return Err(self.error("expected ',' or ']' in list")),
            }
        }
    }

    fn parse_map(&mut self) -> IacResult<Value> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_trivia(true);
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Object(map));
            }
            let key = self.parse_key()?;
            self.skip_trivia(false);
            match self.bump() {
                Some('=') | Some(':') => {}
                _ => return Err(self.error("expected '=' in map")),
            }
            self.skip_trivia(false);
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_trivia(false);
            if self.peek() == Some(',') {
                self.bump();
            }
        }
    }
}
