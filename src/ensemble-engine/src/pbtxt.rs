// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Protocol buffer text format, read into and written from JSON documents.
//!
//! The runtime persists each model's configuration as text format.  We
//! read it without a compiled schema: field names become lowerCamelCase
//! JSON keys (as the protobuf JSON mapping does), and the few schema facts
//! needed to get the shape right are kept in the tables below.

use serde_json::{Map, Number, Value};

use ensemble_core::common::{Error, ErrorCode, ErrorKind, Result};
use ensemble_core::config_err;
use ensemble_core::datamodel::ModelConfig;

use crate::config::WriterConfig;
use crate::token::{LexError, LexErrorCode, Lexer, Spanned, Token};

/// Repeated fields of the model configuration schema.  A single occurrence
/// of one of these still parses to an array.
const REPEATED_FIELDS: &[&str] = &[
    "input",
    "output",
    "batch_input",
    "batch_output",
    "dims",
    "step",
    "instance_group",
    "gpus",
    "secondary_devices",
    "preferred_batch_size",
    "model_warmup",
    "gpu_execution_accelerator",
    "cpu_execution_accelerator",
    "profile",
    "source_input",
    "control_input",
    "control",
    "int32_false_true",
    "fp32_false_true",
    "bool_false_true",
    "state",
    "initial_state",
];

/// Map fields, written as repeated `{ key: ... value: ... }` entries.
const MAP_FIELDS: &[&str] = &[
    "input_map",
    "output_map",
    "parameters",
    "inputs",
    "cc_model_filenames",
    "metric_tags",
    "priority_queue_policy",
];

/// Fields holding enum values, which are written unquoted.
const ENUM_FIELDS: &[&str] = &["data_type", "kind", "format", "priority"];

fn is_repeated(name: &str) -> bool {
    REPEATED_FIELDS.contains(&name)
}

fn is_map(name: &str) -> bool {
    MAP_FIELDS.contains(&name)
}

fn is_enum(name: &str) -> bool {
    ENUM_FIELDS.contains(&name)
}

/// `input_map` -> `inputMap`
pub fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `inputMap` -> `input_map`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn line_col(text: &str, pos: usize) -> (usize, usize) {
    let prefix = &text[..pos.min(text.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = match prefix.rfind('\n') {
        Some(nl) => prefix[nl + 1..].chars().count() + 1,
        None => prefix.chars().count() + 1,
    };
    (line, col)
}

fn text_error(text: &str, pos: usize, msg: &str) -> Error {
    let (line, col) = line_col(text, pos);
    Error::new(
        ErrorKind::Import,
        ErrorCode::TextFormat,
        Some(format!("{line}:{col}: {msg}")),
    )
}

fn text_err<T>(text: &str, pos: usize, msg: &str) -> Result<T> {
    Err(text_error(text, pos, msg))
}

fn lex_err(text: &str, err: LexError) -> Error {
    let msg = match err.code {
        LexErrorCode::UnrecognizedToken => "unrecognized token",
        LexErrorCode::UnclosedString => "unclosed string",
        LexErrorCode::BadEscape => "bad escape sequence",
    };
    text_error(text, err.start, msg)
}

struct Parser<'input> {
    text: &'input str,
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
}

impl<'input> Parser<'input> {
    fn new(text: &'input str) -> Result<Self> {
        let tokens = Lexer::new(text)
            .collect::<std::result::Result<Vec<_>, LexError>>()
            .map_err(|err| lex_err(text, err))?;
        Ok(Parser {
            text,
            tokens,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token<'input>> {
        self.tokens.get(self.pos).map(|(_, tok, _)| tok)
    }

    fn offset(&self) -> usize {
        match self.tokens.get(self.pos) {
            Some((start, _, _)) => *start,
            None => self.text.len(),
        }
    }

    fn advance(&mut self) -> Option<Token<'input>> {
        let tok = self.tokens.get(self.pos).map(|(_, tok, _)| tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error<T>(&self, msg: &str) -> Result<T> {
        text_err(self.text, self.offset(), msg)
    }

    /// Fields up to `close` (or end of input at the top level).
    fn message(&mut self, close: Option<Token<'input>>) -> Result<Map<String, Value>> {
        let mut fields = Map::new();
        loop {
            match (self.peek(), &close) {
                (None, None) => break,
                (None, Some(_)) => return self.error("unexpected end of input"),
                (Some(tok), Some(close)) if tok == close => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            self.field(&mut fields)?;
            if matches!(self.peek(), Some(Token::Comma | Token::Semicolon)) {
                self.pos += 1;
            }
        }
        Ok(fields)
    }

    fn field(&mut self, fields: &mut Map<String, Value>) -> Result<()> {
        let name = match self.advance() {
            Some(Token::Ident(name)) => name.to_owned(),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return self.error("expected field name");
            }
        };

        let has_colon = self.peek() == Some(&Token::Colon);
        if has_colon {
            self.pos += 1;
        }

        let (value, from_list) = match self.peek() {
            Some(Token::LBrace | Token::LAngle) => (self.message_value()?, false),
            Some(Token::LBracket) => {
                self.pos += 1;
                (self.list()?, true)
            }
            _ if has_colon => (self.scalar()?, false),
            _ => return self.error("expected ':' or '{'"),
        };

        insert_field(fields, &name, value, from_list)
            .or_else(|msg| self.error(&format!("{name}: {msg}")))
    }

    fn message_value(&mut self) -> Result<Value> {
        let close = match self.advance() {
            Some(Token::LBrace) => Token::RBrace,
            Some(Token::LAngle) => Token::RAngle,
            _ => return self.error("expected '{'"),
        };
        Ok(Value::Object(self.message(Some(close))?))
    }

    fn list(&mut self) -> Result<Value> {
        let mut items = vec![];
        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(Value::Array(items));
        }
        loop {
            let item = match self.peek() {
                Some(Token::LBrace | Token::LAngle) => self.message_value()?,
                _ => self.scalar()?,
            };
            items.push(item);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return self.error("expected ',' or ']'");
                }
            }
        }
        Ok(Value::Array(items))
    }

    fn scalar(&mut self) -> Result<Value> {
        let start = self.offset();
        match self.advance() {
            Some(Token::Str(mut s)) => {
                // adjacent string literals are concatenated
                while let Some(Token::Str(more)) = self.peek() {
                    s.push_str(more);
                    self.pos += 1;
                }
                Ok(Value::String(s))
            }
            Some(Token::Num(num)) => Ok(parse_number(num)),
            Some(Token::Ident(ident)) => Ok(match ident {
                "true" | "True" | "t" => Value::Bool(true),
                "false" | "False" | "f" => Value::Bool(false),
                _ => Value::String(ident.to_owned()),
            }),
            _ => text_err(self.text, start, "expected a value"),
        }
    }
}

fn parse_number(num: &str) -> Value {
    let (negative, digits) = match num.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, num.strip_prefix('+').unwrap_or(num)),
    };

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        if let Ok(n) = i64::from_str_radix(hex, 16) {
            return Value::from(if negative { -n } else { n });
        }
    } else if let Ok(n) = num.parse::<i64>() {
        return Value::from(n);
    } else if let Ok(n) = digits.parse::<u64>() {
        if !negative {
            return Value::from(n);
        }
    }

    let float = num.trim_end_matches(['f', 'F']);
    match float.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        // non-finite values have no JSON number form
        None => Value::String(num.to_owned()),
    }
}

/// Adds a parsed field to its message, folding repeated occurrences into
/// arrays and map entries into objects.
fn insert_field(
    fields: &mut Map<String, Value>,
    name: &str,
    value: Value,
    from_list: bool,
) -> std::result::Result<(), String> {
    let key = lower_camel(name);

    if is_map(name) {
        let entries = match value {
            Value::Array(entries) => entries,
            entry => vec![entry],
        };
        let map = fields
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(map) = map else {
            return Err("map field used as a scalar".to_owned());
        };
        for entry in entries {
            let Value::Object(mut entry) = entry else {
                return Err("map entries must be messages".to_owned());
            };
            let k = match entry.remove("key") {
                Some(Value::String(k)) => k,
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => return Err("map entry without a key".to_owned()),
            };
            map.insert(k, entry.remove("value").unwrap_or(Value::Null));
        }
        return Ok(());
    }

    match fields.get_mut(&key) {
        Some(Value::Array(existing)) => match value {
            Value::Array(items) if from_list => existing.extend(items),
            value => existing.push(value),
        },
        Some(existing) => {
            let first = existing.take();
            let mut items = vec![first];
            match value {
                Value::Array(more) if from_list => items.extend(more),
                value => items.push(value),
            }
            *existing = Value::Array(items);
        }
        None => {
            let value = if from_list || !is_repeated(name) {
                value
            } else {
                Value::Array(vec![value])
            };
            fields.insert(key, value);
        }
    }
    Ok(())
}

/// Parses a text-format document into a JSON object with lowerCamelCase keys.
pub fn parse(text: &str) -> Result<Value> {
    let mut parser = Parser::new(text)?;
    let fields = parser.message(None)?;
    Ok(Value::Object(fields))
}

struct Writer<'a> {
    config: &'a WriterConfig,
    out: String,
}

impl Writer<'_> {
    fn indent(&mut self, depth: usize) {
        for _ in 0..depth * self.config.indent {
            self.out.push(' ');
        }
    }

    fn message(&mut self, fields: &Map<String, Value>, depth: usize) -> Result<()> {
        for (key, value) in fields.iter() {
            let name = snake_case(key);
            match value {
                Value::Null => {}
                Value::Object(entries) if is_map(&name) => {
                    for (k, v) in entries.iter() {
                        self.map_entry(&name, k, v, depth)?;
                    }
                }
                Value::Object(nested) => self.block(&name, nested, depth)?,
                Value::Array(items) => self.repeated(&name, items, depth)?,
                scalar => {
                    self.indent(depth);
                    self.out.push_str(&name);
                    self.out.push_str(": ");
                    write_scalar(&mut self.out, &name, scalar);
                    self.out.push('\n');
                }
            }
        }
        Ok(())
    }

    fn block(&mut self, name: &str, fields: &Map<String, Value>, depth: usize) -> Result<()> {
        self.indent(depth);
        self.out.push_str(name);
        self.out.push_str(" {\n");
        self.message(fields, depth + 1)?;
        self.indent(depth);
        self.out.push_str("}\n");
        Ok(())
    }

    fn map_entry(&mut self, name: &str, key: &str, value: &Value, depth: usize) -> Result<()> {
        self.indent(depth);
        self.out.push_str(name);
        self.out.push_str(" {\n");
        self.indent(depth + 1);
        self.out.push_str("key: ");
        write_string(&mut self.out, key);
        self.out.push('\n');
        match value {
            Value::Null => {}
            Value::Object(fields) => self.block("value", fields, depth + 1)?,
            Value::Array(_) => return config_err!(MalformedConfig, format!("{name}.{key}")),
            scalar => {
                self.indent(depth + 1);
                self.out.push_str("value: ");
                write_scalar(&mut self.out, "value", scalar);
                self.out.push('\n');
            }
        }
        self.indent(depth);
        self.out.push_str("}\n");
        Ok(())
    }

    fn repeated(&mut self, name: &str, items: &[Value], depth: usize) -> Result<()> {
        if items.iter().any(|v| v.is_array() || v.is_null()) {
            return config_err!(MalformedConfig, format!("{name}: nested or null list item"));
        }

        let all_messages = !items.is_empty() && items.iter().all(|v| v.is_object());
        if all_messages && is_repeated(name) {
            for item in items {
                if let Value::Object(fields) = item {
                    self.block(name, fields, depth)?;
                }
            }
            return Ok(());
        }

        self.indent(depth);
        self.out.push_str(name);
        if items.iter().any(|v| v.is_object()) {
            self.out.push_str(" [\n");
            for (i, item) in items.iter().enumerate() {
                self.indent(depth + 1);
                match item {
                    Value::Object(fields) => {
                        self.out.push_str("{\n");
                        self.message(fields, depth + 2)?;
                        self.indent(depth + 1);
                        self.out.push('}');
                    }
                    scalar => write_scalar(&mut self.out, name, scalar),
                }
                if i + 1 < items.len() {
                    self.out.push(',');
                }
                self.out.push('\n');
            }
            self.indent(depth);
            self.out.push_str("]\n");
        } else {
            self.out.push_str(": [");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    self.out.push_str(", ");
                }
                write_scalar(&mut self.out, name, item);
            }
            self.out.push_str("]\n");
        }
        Ok(())
    }
}

fn is_enum_value(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(s, "true" | "false" | "True" | "False" | "t" | "f")
}

fn write_scalar(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::String(s) if is_enum(name) && is_enum_value(s) => out.push_str(s),
        Value::String(s) => write_string(out, s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        // containers are handled by the caller
        Value::Null | Value::Array(_) | Value::Object(_) => {}
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Renders a JSON object with lowerCamelCase keys as text format.
pub fn write(value: &Value, config: &WriterConfig) -> Result<String> {
    let Value::Object(fields) = value else {
        return config_err!(MalformedConfig, "document must be an object".to_owned());
    };
    let mut writer = Writer {
        config,
        out: String::new(),
    };
    writer.message(fields, 0)?;
    Ok(writer.out)
}

/// Where the runtime keeps a pipeline's steps: `ensemble_scheduling { step [...] }`.
const SCHEDULING: &str = "ensembleScheduling";

/// Moves `ensembleScheduling.step` up to the bare `step` list of the
/// in-memory document.  The scheduling block is dropped once empty.
fn lift_steps(fields: &mut Map<String, Value>) {
    if fields.contains_key("step") {
        return;
    }
    let Some(Value::Object(scheduling)) = fields.get_mut(SCHEDULING) else {
        return;
    };
    let Some(steps) = scheduling.remove("step") else {
        return;
    };
    if scheduling.is_empty() {
        fields.remove(SCHEDULING);
    }
    fields.insert("step".to_owned(), steps);
}

/// The inverse of [`lift_steps`]: the bare `step` list goes back under
/// `ensembleScheduling`, in the position `step` held.
fn nest_steps(fields: Map<String, Value>) -> Map<String, Value> {
    if !fields.contains_key("step") {
        return fields;
    }
    let mut scheduling = match fields.get(SCHEDULING) {
        Some(Value::Object(existing)) => existing.clone(),
        _ => Map::new(),
    };
    let mut out = Map::with_capacity(fields.len());
    for (key, value) in fields {
        match key.as_str() {
            "step" => {
                scheduling.insert(key, value);
                out.insert(
                    SCHEDULING.to_owned(),
                    Value::Object(std::mem::take(&mut scheduling)),
                );
            }
            SCHEDULING => {}
            _ => {
                out.insert(key, value);
            }
        }
    }
    out
}

/// A runtime configuration as the JSON tree the text format is written
/// from, with pipeline steps nested the way the runtime reads them.
pub fn model_config_to_value(config: &ModelConfig) -> Result<Value> {
    match serde_json::to_value(config)? {
        Value::Object(fields) => Ok(Value::Object(nest_steps(fields))),
        other => Ok(other),
    }
}

/// Reads one model's runtime configuration from text format.
pub fn parse_model_config(text: &str) -> Result<ModelConfig> {
    let mut value = parse(text)?;
    if let Value::Object(fields) = &mut value {
        lift_steps(fields);
    }
    Ok(serde_json::from_value(value)?)
}

/// Renders one model's runtime configuration as text format.
pub fn write_model_config(config: &ModelConfig, writer_config: &WriterConfig) -> Result<String> {
    let value = model_config_to_value(config)?;
    write(&value, writer_config)
}
