//! Protobuf text-format message builder.
//!
//! Field values are typed; string values are escaped and control
//! characters are refused, so identity or uuid strings can never break
//! out of their literal.

use std::fmt::Write as _;

use crate::codec::hex_escape;
use crate::error::XrayError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldValue {
    Str(String),
    Uint(u64),
    Bytes(Vec<u8>),
    Message(TextMessage),
}

/// A text-format message under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextMessage {
    fields: Vec<(&'static str, FieldValue)>,
}

impl TextMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string field. Fails on control characters.
    pub fn string(mut self, name: &'static str, value: &str) -> Result<Self, XrayError> {
        if let Some(c) = value.chars().find(|c| c.is_control()) {
            return Err(XrayError::InvalidField {
                field: name,
                reason: format!("control character U+{:04X} not allowed", u32::from(c)),
            });
        }
        self.fields.push((name, FieldValue::Str(value.to_string())));
        Ok(self)
    }

    /// Append an unsigned integer field.
    pub fn uint(mut self, name: &'static str, value: u64) -> Self {
        self.fields.push((name, FieldValue::Uint(value)));
        self
    }

    /// Append a bytes field, rendered as `\xHH` escapes.
    pub fn bytes(mut self, name: &'static str, value: &[u8]) -> Self {
        self.fields.push((name, FieldValue::Bytes(value.to_vec())));
        self
    }

    /// Append a nested message field.
    pub fn message(mut self, name: &'static str, value: TextMessage) -> Self {
        self.fields.push((name, FieldValue::Message(value)));
        self
    }

    /// Render as protobuf text format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        for (name, value) in &self.fields {
            match value {
                FieldValue::Str(s) => {
                    let _ = writeln!(out, "{indent}{name}: \"{}\"", escape_str(s));
                }
                FieldValue::Uint(v) => {
                    let _ = writeln!(out, "{indent}{name}: {v}");
                }
                FieldValue::Bytes(b) => {
                    let _ = writeln!(out, "{indent}{name}: \"{}\"", hex_escape(b));
                }
                FieldValue::Message(m) => {
                    let _ = writeln!(out, "{indent}{name} {{");
                    m.render_into(out, depth + 1);
                    let _ = writeln!(out, "{indent}}}");
                }
            }
        }
    }
}

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}
