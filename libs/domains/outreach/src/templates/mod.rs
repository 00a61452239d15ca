//! Best-effort message template rendering.
//!
//! Templates use single-brace placeholders: `"Hi {name}, I came across {company}"`.
//! Literal braces are written doubled (`{{` and `}}`).
//!
//! [`render`] is total. When a template references a placeholder the context lacks,
//! or contains a stray brace, the original template comes back unchanged.

use crate::models::MessageTemplate;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Placeholder values for one recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    values: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Subject and body after substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
enum RenderError {
    #[error("placeholder '{0}' has no value")]
    MissingValue(String),

    #[error("unclosed '{{' at byte {0}")]
    Unclosed(usize),

    #[error("single '}}' at byte {0}")]
    StrayClose(usize),

    #[error("unsupported placeholder '{0}'")]
    Unsupported(String),
}

/// Fill `template` from `context`, or return `template` untouched if that is not possible.
pub fn render(template: &str, context: &RenderContext) -> String {
    match try_render(template, context) {
        Ok(rendered) => rendered,
        Err(e) => {
            debug!(error = %e, "Template left unrendered");
            template.to_string()
        }
    }
}

/// Render both halves of a message template.
pub fn render_message(template: &MessageTemplate, context: &RenderContext) -> RenderedMessage {
    RenderedMessage {
        subject: render(&template.subject, context),
        body: render(&template.body, context),
    }
}

fn try_render(template: &str, context: &RenderContext) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, next)| next == '{').is_some() {
                    out.push('{');
                    continue;
                }

                let mut key = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    key.push(next);
                }
                if !closed {
                    return Err(RenderError::Unclosed(pos));
                }
                if !is_identifier(&key) {
                    return Err(RenderError::Unsupported(key));
                }

                let value = context
                    .get(&key)
                    .ok_or_else(|| RenderError::MissingValue(key.clone()))?;
                out.push_str(value);
            }
            '}' => {
                if chars.next_if(|&(_, next)| next == '}').is_none() {
                    return Err(RenderError::StrayClose(pos));
                }
                out.push('}');
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

// Positional fields, attribute access and format specs are not supported.
fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
