//! Output predicates: exact text, regex, and JSON-path extraction.
use super::runner::{bounded_snippet, ProcessOutput};
use crate::registry::{OutputMatcher, Stream};
use regex::Regex;
use serde_json::Value;

const EXCERPT_LINES: usize = 20;
const EXCERPT_BYTES: usize = 2_048;

/// Expected vs actual for an unmet expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: String,
    pub actual: String,
}

/// One step of a JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse `$.a.b[0]["c d"]` into segments.
pub fn parse_json_path(path: &str) -> Result<Vec<PathSegment>, String> {
    let rest = path
        .strip_prefix('$')
        .ok_or_else(|| format!("json path {path:?} must start with '$'"))?;
    let mut segments = Vec::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        match ch {
            '.' => {
                let mut key = String::new();
                while let Some((_, next)) = chars.peek() {
                    if *next == '.' || *next == '[' {
                        break;
                    }
                    key.push(*next);
                    chars.next();
                }
                if key.is_empty() {
                    return Err(format!("json path {path:?} has an empty key"));
                }
                segments.push(PathSegment::Key(key));
            }
            '[' => {
                let mut inner = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(next);
                }
                if !closed {
                    return Err(format!("json path {path:?} has an unclosed '['"));
                }
                let quoted = inner
                    .strip_prefix('"')
                    .and_then(|value| value.strip_suffix('"'));
                if let Some(key) = quoted {
                    segments.push(PathSegment::Key(key.to_string()));
                } else {
                    let index = inner
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| format!("json path {path:?} has a bad index {inner:?}"))?;
                    segments.push(PathSegment::Index(index));
                }
            }
            other => {
                return Err(format!(
                    "json path {path:?} has unexpected character {other:?}"
                ));
            }
        }
    }
    Ok(segments)
}

fn extract<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match segment {
        PathSegment::Key(key) => current.get(key.as_str()),
        PathSegment::Index(index) => current.get(*index),
    })
}

fn stream_text(output: &ProcessOutput, stream: Stream) -> &str {
    match stream {
        Stream::Stdout => &output.stdout,
        Stream::Stderr => &output.stderr,
    }
}

fn excerpt(text: &str) -> String {
    bounded_snippet(text, EXCERPT_LINES, EXCERPT_BYTES)
}

/// Apply an output matcher to collaborator output.
pub fn apply_matcher(matcher: &OutputMatcher, output: &ProcessOutput) -> Result<(), Mismatch> {
    match matcher {
        OutputMatcher::Exact {
            value,
            stream,
            trim,
        } => {
            let text = stream_text(output, *stream);
            let observed = if *trim { text.trim() } else { text };
            if observed == value {
                Ok(())
            } else {
                Err(Mismatch {
                    expected: format!("{stream} == {value:?}"),
                    actual: excerpt(observed),
                })
            }
        }
        OutputMatcher::Regex { pattern, stream } => {
            let text = stream_text(output, *stream);
            let regex = Regex::new(pattern).map_err(|err| Mismatch {
                expected: format!("valid regex {pattern:?}"),
                actual: err.to_string(),
            })?;
            if regex.is_match(text) {
                Ok(())
            } else {
                Err(Mismatch {
                    expected: format!("match for regex {pattern:?}"),
                    actual: excerpt(text),
                })
            }
        }
        OutputMatcher::JsonPath {
            path,
            equals,
            stream,
        } => {
            let text = stream_text(output, *stream);
            let segments = parse_json_path(path).map_err(|err| Mismatch {
                expected: "valid json path".to_string(),
                actual: err,
            })?;
            let document: Value = serde_json::from_str(text).map_err(|err| Mismatch {
                expected: format!("JSON output for {path}"),
                actual: format!("unparseable output ({err}): {}", excerpt(text)),
            })?;
            let Some(found) = extract(&document, &segments) else {
                return Err(Mismatch {
                    expected: format!("{path} present"),
                    actual: "missing".to_string(),
                });
            };
            match equals {
                Some(expected) if found != expected => Err(Mismatch {
                    expected: format!("{path} == {expected}"),
                    actual: found.to_string(),
                }),
                _ => Ok(()),
            }
        }
    }
}
