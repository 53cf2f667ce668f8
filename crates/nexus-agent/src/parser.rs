//! Extracts tool calls from a complete model response.
//!
//! Two forms are accepted for every recognized tag:
//!
//! ```text
//! <web-search query="rust async" />
//! <create-file path="notes.md">
//! body text
//! </create-file>
//! ```
//!
//! Attributes become parameters. A body made only of `key="value"` lines
//! contributes those keys; any other body is passed whole as `content`.
//! Attributes win when both name the same key.

use std::sync::{Arc, LazyLock};

use nexus_core::{Parameters, ToolCall};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::vocabulary::DirectiveVocabulary;

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#) {
        Ok(regex) => regex,
        Err(err) => panic!("Failed to compile attribute regex: {err}"),
    }
});

static BODY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r#"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?:"(.*)"|'(.*)'|([^"'\s].*))$"#) {
        Ok(regex) => regex,
        Err(err) => panic!("Failed to compile body line regex: {err}"),
    }
});

static BODY_MULTILINE_START: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r#"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*"(.*)$"#) {
        Ok(regex) => regex,
        Err(err) => panic!("Failed to compile multi-line body regex: {err}"),
    }
});

/// A directive that could not be turned into a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The opening tag never reached `>`.
    #[error("Malformed <{tag}> opening tag at byte {offset}")]
    MalformedOpenTag {
        /// Directive tag
        tag: String,
        /// Byte offset of the `<`
        offset: usize,
    },
    /// No matching closing tag.
    #[error("Unterminated <{tag}> directive at byte {offset}")]
    Unterminated {
        /// Directive tag
        tag: String,
        /// Byte offset of the `<`
        offset: usize,
    },
}

/// Calls found in a response plus directives that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    /// Calls in order of appearance
    pub calls: Vec<ToolCall>,
    /// Directives that were skipped
    pub errors: Vec<ParseError>,
}

/// Parser for directive markup restricted to a vocabulary.
#[derive(Debug, Clone)]
pub struct ToolCallParser {
    vocabulary: Arc<DirectiveVocabulary>,
}

impl ToolCallParser {
    /// Create a parser recognizing the given tags.
    pub fn new(vocabulary: Arc<DirectiveVocabulary>) -> Self {
        Self { vocabulary }
    }

    /// Parse and log skipped directives.
    pub fn parse_calls(&self, text: &str) -> Vec<ToolCall> {
        let outcome = self.parse(text);
        for error in &outcome.errors {
            warn!("Skipping directive: {error}");
        }
        outcome.calls
    }

    /// Parse all directives in `text`.
    pub fn parse(&self, text: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut pos = 0;

        while let Some(relative) = text.get(pos..).and_then(|rest| rest.find('<')) {
            let start = pos + relative;
            let name = read_name(text, start + 1);
            if name.is_empty() || !self.vocabulary.contains(name) {
                pos = start + 1;
                continue;
            }
            let name_end = start + 1 + name.len();

            let Some(gt) = find_tag_end(text, name_end) else {
                outcome.errors.push(ParseError::MalformedOpenTag {
                    tag: name.to_owned(),
                    offset: start,
                });
                pos = name_end;
                continue;
            };

            let attributes = text.get(name_end..gt).unwrap_or_default();
            let trimmed = attributes.trim_end();
            if let Some(attributes) = trimmed.strip_suffix('/') {
                outcome.calls.push(build_call(name, attributes, None, outcome.calls.len()));
                pos = gt + 1;
                continue;
            }

            let Some((close_start, close_end)) = find_closing(text, gt + 1, name) else {
                outcome.errors.push(ParseError::Unterminated {
                    tag: name.to_owned(),
                    offset: start,
                });
                pos = gt + 1;
                continue;
            };

            let body = text.get(gt + 1..close_start).unwrap_or_default();
            outcome
                .calls
                .push(build_call(name, attributes, Some(body), outcome.calls.len()));
            pos = close_end;
        }

        outcome
    }
}

/// Read `[A-Za-z][A-Za-z0-9_-]*` starting at `from`.
fn read_name(text: &str, from: usize) -> &str {
    let rest = text.get(from..).unwrap_or_default();
    if !rest.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        return "";
    }
    let end = rest
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
        .unwrap_or(rest.len());
    if !rest
        .get(end..)
        .is_some_and(|after| after.starts_with(|ch: char| ch.is_whitespace() || ch == '/' || ch == '>'))
    {
        return "";
    }
    rest.get(..end).unwrap_or_default()
}

/// Quote state after `ch`: `"` and `'` open a value, the same character closes it.
pub(crate) const fn quote_after(quote: Option<char>, ch: char) -> Option<char> {
    match (quote, ch) {
        (None, '"' | '\'') => Some(ch),
        (Some(open), _) if open == ch => None,
        _ => quote,
    }
}

/// Byte offset of the `>` closing an opening tag, skipping quoted values.
fn find_tag_end(text: &str, from: usize) -> Option<usize> {
    let mut quote = None;
    for (offset, ch) in text.get(from..)?.char_indices() {
        if quote.is_none() {
            match ch {
                '>' => return Some(from + offset),
                '<' => return None,
                _ => {}
            }
        }
        quote = quote_after(quote, ch);
    }
    None
}

/// Locate the first `</name>` (whitespace allowed before `>`) after `from`.
fn find_closing(text: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let mut search = from;
    while let Some(relative) = text.get(search..)?.find(&needle) {
        let start = search + relative;
        let after = start + needle.len();
        let rest = text.get(after..)?;
        let trimmed = rest.trim_start();
        if trimmed.starts_with('>') {
            let end = after + (rest.len() - trimmed.len()) + 1;
            return Some((start, end));
        }
        search = after;
    }
    None
}

fn build_call(name: &str, attributes: &str, body: Option<&str>, index: usize) -> ToolCall {
    let mut parameters = body.map(parse_body).unwrap_or_default();
    parameters.extend(parse_attributes(attributes));
    ToolCall::new(name, parameters, index)
}

fn parse_attributes(attributes: &str) -> Parameters {
    ATTRIBUTE
        .captures_iter(attributes)
        .filter_map(|captures| {
            let key = captures.get(1)?.as_str().to_owned();
            let value = captures.get(2).or_else(|| captures.get(3))?.as_str();
            Some((key, Value::String(value.to_owned())))
        })
        .collect()
}

/// Structured `key=value` lines, or the whole body as `content`.
fn parse_body(body: &str) -> Parameters {
    if let Some(parameters) = parse_structured_body(body) {
        return parameters;
    }
    let mut parameters = Parameters::new();
    let content = body.trim();
    if !content.is_empty() {
        parameters.insert("content".to_owned(), Value::String(content.to_owned()));
    }
    parameters
}

fn parse_structured_body(body: &str) -> Option<Parameters> {
    let mut parameters = Parameters::new();
    let mut lines = body.lines();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(captures) = BODY_LINE.captures(line) {
            let key = captures.get(1)?.as_str().to_owned();
            let value = captures
                .get(2)
                .or_else(|| captures.get(3))
                .or_else(|| captures.get(4))
                .map_or("", |found| found.as_str());
            parameters.insert(key, Value::String(value.trim().to_owned()));
            continue;
        }

        // A quoted value that runs over several lines.
        let captures = BODY_MULTILINE_START.captures(line)?;
        let key = captures.get(1)?.as_str().to_owned();
        let mut value = captures.get(2).map_or("", |found| found.as_str()).to_owned();
        let mut closed = false;
        for next in lines.by_ref() {
            value.push('\n');
            if let Some(last) = next.trim_end().strip_suffix('"') {
                value.push_str(last);
                closed = true;
                break;
            }
            value.push_str(next);
        }
        if !closed {
            return None;
        }
        parameters.insert(key, Value::String(value));
    }

    Some(parameters)
}
