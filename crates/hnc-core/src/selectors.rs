//! Propagation-restriction selectors.
//!
//! Three annotations on a source object restrict where it propagates: a
//! label selector evaluated against destination-namespace labels (depth
//! labels included), a tree selector naming subtrees by their root, and a
//! boolean switch suppressing propagation entirely. Values are parsed at
//! admission and again on every propagation decision; a malformed value
//! observed at runtime means "propagate to no destination" so a typo never
//! overwrites user objects.

use crate::ThisError;
use hnc_api::{ObjectMeta, keys};
use std::collections::BTreeMap;

///
/// SelectorError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum SelectorError {
    #[error("invalid {key} annotation: {0}", key = keys::PROPAGATE_NONE)]
    InvalidNone(String),

    #[error("invalid {key} annotation: {0}", key = keys::PROPAGATE_SELECT)]
    InvalidSelect(String),

    #[error("invalid {key} annotation: {0}", key = keys::PROPAGATE_TREE_SELECT)]
    InvalidTreeSelect(String),
}

///
/// PropagationSelectors
/// The parsed restriction set of one source object.
///

#[derive(Clone, Debug, Default)]
pub struct PropagationSelectors {
    select: Option<LabelSelector>,
    tree: Option<TreeSelector>,
    none: bool,
}

impl PropagationSelectors {
    /// Parses the three annotations off `meta`. Absent annotations impose
    /// no restriction.
    pub fn parse(meta: &ObjectMeta) -> Result<Self, SelectorError> {
        let select = meta
            .annotation(keys::PROPAGATE_SELECT)
            .map(LabelSelector::parse)
            .transpose()?;

        let tree = meta
            .annotation(keys::PROPAGATE_TREE_SELECT)
            .map(TreeSelector::parse)
            .transpose()?;

        let none = match meta.annotation(keys::PROPAGATE_NONE) {
            None => false,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                other => return Err(SelectorError::InvalidNone(other.to_string())),
            },
        };

        Ok(Self { select, tree, none })
    }

    /// Whether propagation into a namespace with `dest_labels` is allowed.
    #[must_use]
    pub fn allows(&self, dest_labels: &BTreeMap<String, String>) -> bool {
        if self.none {
            return false;
        }
        if let Some(select) = &self.select {
            if !select.matches(dest_labels) {
                return false;
            }
        }
        if let Some(tree) = &self.tree {
            if !tree.matches(dest_labels) {
                return false;
            }
        }
        true
    }
}

/// Admission-time syntax check.
pub fn validate(meta: &ObjectMeta) -> Result<(), SelectorError> {
    PropagationSelectors::parse(meta).map(|_| ())
}

///
/// LabelSelector
/// Equality- and set-based requirements, all of which must hold.
///

#[derive(Clone, Debug)]
struct LabelSelector {
    requirements: Vec<Requirement>,
}

#[derive(Clone, Debug)]
enum Requirement {
    Eq(String, String),
    Exists(String),
    In(String, Vec<String>),
    NotEq(String, String),
    NotExists(String),
    NotIn(String, Vec<String>),
}

impl LabelSelector {
    fn parse(raw: &str) -> Result<Self, SelectorError> {
        let mut requirements = Vec::new();
        for clause in split_top_level(raw) {
            let clause = clause.trim();
            if clause.is_empty() {
                return Err(SelectorError::InvalidSelect("empty clause".to_string()));
            }
            requirements.push(Requirement::parse(clause)?);
        }
        if requirements.is_empty() {
            return Err(SelectorError::InvalidSelect("empty selector".to_string()));
        }
        Ok(Self { requirements })
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|req| req.matches(labels))
    }
}

impl Requirement {
    fn parse(clause: &str) -> Result<Self, SelectorError> {
        let invalid = |detail: &str| SelectorError::InvalidSelect(format!("'{clause}': {detail}"));

        if let Some((key, rest)) = split_operator(clause, " notin ") {
            return Ok(Self::NotIn(
                parse_key(key).ok_or_else(|| invalid("bad key"))?,
                parse_value_set(rest).ok_or_else(|| invalid("bad value set"))?,
            ));
        }
        if let Some((key, rest)) = split_operator(clause, " in ") {
            return Ok(Self::In(
                parse_key(key).ok_or_else(|| invalid("bad key"))?,
                parse_value_set(rest).ok_or_else(|| invalid("bad value set"))?,
            ));
        }
        if let Some((key, value)) = clause.split_once("!=") {
            return Ok(Self::NotEq(
                parse_key(key).ok_or_else(|| invalid("bad key"))?,
                value.trim().to_string(),
            ));
        }
        if let Some((key, value)) = clause.split_once("==").or_else(|| clause.split_once('=')) {
            return Ok(Self::Eq(
                parse_key(key).ok_or_else(|| invalid("bad key"))?,
                value.trim().to_string(),
            ));
        }
        if let Some(key) = clause.strip_prefix('!') {
            return Ok(Self::NotExists(
                parse_key(key).ok_or_else(|| invalid("bad key"))?,
            ));
        }
        Ok(Self::Exists(
            parse_key(clause).ok_or_else(|| invalid("bad key"))?,
        ))
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Eq(key, value) => labels.get(key) == Some(value),
            Self::Exists(key) => labels.contains_key(key),
            Self::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Self::NotEq(key, value) => labels.get(key) != Some(value),
            Self::NotExists(key) => !labels.contains_key(key),
            Self::NotIn(key, values) => !labels.get(key).is_some_and(|v| values.contains(v)),
        }
    }
}

///
/// TreeSelector
/// Comma-separated namespace names, each optionally negated. A destination
/// is inside the subtree of `ns` iff it carries the depth label for `ns`.
/// With any positive entry the destination must be inside one of the named
/// subtrees; negative entries always exclude.
///

#[derive(Clone, Debug)]
struct TreeSelector {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl TreeSelector {
    fn parse(raw: &str) -> Result<Self, SelectorError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for entry in raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                return Err(SelectorError::InvalidTreeSelect("empty entry".to_string()));
            }
            if let Some(name) = entry.strip_prefix('!') {
                exclude.push(
                    parse_key(name)
                        .ok_or_else(|| SelectorError::InvalidTreeSelect(entry.to_string()))?,
                );
            } else {
                include.push(
                    parse_key(entry)
                        .ok_or_else(|| SelectorError::InvalidTreeSelect(entry.to_string()))?,
                );
            }
        }

        Ok(Self { include, exclude })
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let in_subtree =
            |ns: &String| labels.contains_key(&keys::tree_depth_label(ns));

        if self.exclude.iter().any(in_subtree) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(in_subtree)
    }
}

fn parse_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() || key.contains(char::is_whitespace) || key.contains(',') {
        return None;
    }
    Some(key.to_string())
}

fn parse_value_set(raw: &str) -> Option<Vec<String>> {
    let inner = raw.trim().strip_prefix('(')?.strip_suffix(')')?;
    let values: Vec<String> = inner
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() { None } else { Some(values) }
}

fn split_operator<'a>(clause: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let idx = clause.find(op)?;
    Some((&clause[..idx], &clause[idx + op.len()..]))
}

/// Splits on commas that are not nested inside parentheses.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, c) in raw.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&raw[start..]);
    out
}
