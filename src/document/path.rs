//! # Path Engine
//!
//! Parses dotted/bracketed path expressions and navigates a [`Value`] tree.
//!
//! Grammar:
//!
//! ```text
//! expr    := segment ("." segment)*
//! segment := identifier ("[" digits "]")*
//! ```
//!
//! `containers[0]` expands to a key step `containers` followed by an index step `0`.

use super::value::{Scalar, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Path engine failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Expression does not match the path grammar
    #[error("malformed path '{expr}': {reason}")]
    Malformed { expr: String, reason: String },
    /// Map key missing on a navigation step
    #[error("key '{key}' not found in map")]
    NotFound { key: String },
    /// Sequence index outside `[0, len)`
    #[error("array index {index} out of bounds (length: {len})")]
    IndexOutOfRange { index: usize, len: usize },
    /// Step kind does not fit the node it is applied to
    #[error("cannot apply {step} to a {found} node")]
    TypeMismatch { step: String, found: &'static str },
}

impl PathError {
    fn malformed(expr: &str, reason: impl Into<String>) -> Self {
        PathError::Malformed {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }

    fn mismatch(step: &PathStep, node: &Value) -> Self {
        PathError::TypeMismatch {
            step: step.describe(),
            found: node.kind(),
        }
    }
}

/// A parsed navigation atom
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl PathStep {
    fn describe(&self) -> String {
        match self {
            PathStep::Key(key) => format!("key '{key}'"),
            PathStep::Index(index) => format!("index [{index}]"),
        }
    }
}

/// A validated, non-empty sequence of path steps
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExpr {
    steps: Vec<PathStep>,
}

impl PathExpr {
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        parse(expr).map(|steps| Self { steps })
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Parent steps and the terminal step
    pub fn split_terminal(&self) -> (&[PathStep], &PathStep) {
        let (terminal, parents) = self
            .steps
            .split_last()
            .unwrap_or_else(|| unreachable!("parse never yields an empty path"));
        (parents, terminal)
    }
}

impl FromStr for PathExpr {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                PathStep::Key(key) if i == 0 => f.write_str(key)?,
                PathStep::Key(key) => write!(f, ".{key}")?,
                PathStep::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']')
}

/// Parse a path expression into navigation steps
pub fn parse(expr: &str) -> Result<Vec<PathStep>, PathError> {
    if expr.is_empty() {
        return Err(PathError::malformed(expr, "path cannot be empty"));
    }
    if let Some((pos, c)) = expr.char_indices().find(|(_, c)| !is_path_char(*c)) {
        return Err(PathError::malformed(
            expr,
            format!("invalid character '{c}' at position {pos}"),
        ));
    }

    let mut steps = Vec::new();
    for segment in expr.split('.') {
        parse_segment(expr, segment, &mut steps)?;
    }
    Ok(steps)
}

fn parse_segment(expr: &str, segment: &str, steps: &mut Vec<PathStep>) -> Result<(), PathError> {
    let (identifier, mut rest) = segment.split_at(segment.find('[').unwrap_or(segment.len()));

    if identifier.is_empty() {
        return Err(PathError::malformed(expr, "empty path segment"));
    }
    if identifier.contains(']') {
        return Err(PathError::malformed(expr, "unbalanced ']'"));
    }
    steps.push(PathStep::Key(identifier.to_string()));

    while !rest.is_empty() {
        let inner = rest.strip_prefix('[').ok_or_else(|| {
            PathError::malformed(expr, format!("unexpected '{rest}' after array index"))
        })?;
        let close = inner
            .find(']')
            .ok_or_else(|| PathError::malformed(expr, "unbalanced '['"))?;
        let digits = &inner[..close];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PathError::malformed(
                expr,
                format!("array index '{digits}' is not a number"),
            ));
        }
        let index = digits.parse::<usize>().map_err(|e| {
            PathError::malformed(expr, format!("array index '{digits}' is invalid: {e}"))
        })?;
        steps.push(PathStep::Index(index));
        rest = &inner[close + 1..];
    }

    Ok(())
}

/// Check an expression against the grammar without touching any document
pub fn validate(expr: &str) -> Result<(), PathError> {
    parse(expr).map(|_| ())
}

fn step_into<'a>(node: &'a Value, step: &PathStep) -> Result<&'a Value, PathError> {
    match (node, step) {
        (Value::Map(map), PathStep::Key(key)) => map
            .get(key)
            .ok_or_else(|| PathError::NotFound { key: key.clone() }),
        (Value::Sequence(items), PathStep::Index(index)) => {
            items.get(*index).ok_or(PathError::IndexOutOfRange {
                index: *index,
                len: items.len(),
            })
        }
        (node, step) => Err(PathError::mismatch(step, node)),
    }
}

fn step_into_mut<'a>(node: &'a mut Value, step: &PathStep) -> Result<&'a mut Value, PathError> {
    match (node, step) {
        (Value::Map(map), PathStep::Key(key)) => map
            .get_mut(key)
            .ok_or_else(|| PathError::NotFound { key: key.clone() }),
        (Value::Sequence(items), PathStep::Index(index)) => {
            let len = items.len();
            items
                .get_mut(*index)
                .ok_or(PathError::IndexOutOfRange { index: *index, len })
        }
        (node, step) => Err(PathError::mismatch(step, node)),
    }
}

/// Descend from `root` through every step
pub fn navigate<'a>(root: &'a Value, steps: &[PathStep]) -> Result<&'a Value, PathError> {
    steps.iter().try_fold(root, step_into)
}

/// Mutable variant of [`navigate`], used to locate the parent container
pub fn navigate_mut<'a>(root: &'a mut Value, steps: &[PathStep]) -> Result<&'a mut Value, PathError> {
    let mut current = root;
    for step in steps {
        current = step_into_mut(current, step)?;
    }
    Ok(current)
}

/// Replace the slot addressed by `terminal` inside `container`
///
/// With `image_tag_only`, a string slot keeps everything up to its tag separator
/// and only the tag is replaced. Any other slot is replaced verbatim by a string.
/// A missing key on a map is inserted.
pub fn set_value(
    container: &mut Value,
    terminal: &PathStep,
    new_value: &str,
    image_tag_only: bool,
) -> Result<(), PathError> {
    let slot = match (container, terminal) {
        (Value::Map(map), PathStep::Key(key)) => map
            .entry(key.clone())
            .or_insert(Value::Scalar(Scalar::Null)),
        (Value::Sequence(items), PathStep::Index(index)) => {
            let len = items.len();
            items
                .get_mut(*index)
                .ok_or(PathError::IndexOutOfRange { index: *index, len })?
        }
        (node, step) => return Err(PathError::mismatch(step, node)),
    };

    let replacement = match slot.as_str() {
        Some(current) if image_tag_only => replace_image_tag(current, new_value),
        _ => new_value.to_string(),
    };
    *slot = Value::string(replacement);
    Ok(())
}

/// Replace the tag portion of a container image reference
///
/// Everything after the last ':' is the current tag; the rest is kept as is.
/// Without a colon the new tag is appended. An untagged reference with a
/// registry port (`localhost:5000/app`) therefore loses its path: tag those
/// references explicitly.
pub fn replace_image_tag(reference: &str, tag: &str) -> String {
    match reference.rfind(':') {
        Some(colon) => format!("{}:{tag}", &reference[..colon]),
        None => format!("{reference}:{tag}"),
    }
}
