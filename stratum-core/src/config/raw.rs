//! Raw Configuration and Interpolation
//!
//! Declarations carry their arguments as a [`RawConfig`]: a JSON value whose
//! string leaves may embed `${...}` interpolations. The engine needs two
//! things from it:
//!
//! 1. The references it contains, to derive dependency names at build time.
//! 2. An interpolated value, computed during a walk once the referenced
//!    vertices have been evaluated.
//!
//! # Interpolation Rules
//!
//! - A string that is exactly one interpolation takes the referenced value
//!   verbatim (a list stays a list).
//! - Otherwise each referenced value is rendered into the surrounding text.
//! - If any referenced value is [`UNKNOWN_VALUE`], the whole string becomes
//!   unknown.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Sentinel standing for a value that is only known after apply.
pub const UNKNOWN_VALUE: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// Check whether a value is the unknown sentinel.
pub fn is_unknown(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == UNKNOWN_VALUE)
}

/// The unknown sentinel as a value.
pub fn unknown() -> Value {
    Value::String(UNKNOWN_VALUE.to_string())
}

/// A variable reference embedded in an interpolation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// `var.NAME`
    Variable { name: String },
    /// `TYPE.NAME.ATTR`
    Resource {
        kind: String,
        name: String,
        attribute: String,
    },
    /// `module.NAME.OUTPUT`
    Module { module: String, output: String },
    /// `count.FIELD`
    Count { field: String },
    /// `path.FIELD`
    Path { field: String },
    /// `self.ATTR`
    SelfAttr { attribute: String },
}

impl Reference {
    /// Parse the text between `${` and `}`.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidReference {
            reference: text.to_string(),
            reason,
        };

        let parts: Vec<&str> = text.trim().split('.').collect();
        if parts.iter().any(|part| part.is_empty() || part.contains(char::is_whitespace)) {
            return Err(invalid("empty or malformed segment"));
        }

        match parts.as_slice() {
            ["var", name] => Ok(Self::Variable {
                name: (*name).to_string(),
            }),
            ["var", ..] => Err(invalid("expected var.NAME")),
            ["module", module, output] => Ok(Self::Module {
                module: (*module).to_string(),
                output: (*output).to_string(),
            }),
            ["module", ..] => Err(invalid("expected module.NAME.OUTPUT")),
            ["count", field] => Ok(Self::Count {
                field: (*field).to_string(),
            }),
            ["path", field] => Ok(Self::Path {
                field: (*field).to_string(),
            }),
            ["self", attribute] => Ok(Self::SelfAttr {
                attribute: (*attribute).to_string(),
            }),
            ["count" | "path" | "self", ..] => Err(invalid("expected exactly two segments")),
            [kind, name, attribute @ ..] if !attribute.is_empty() => Ok(Self::Resource {
                kind: (*kind).to_string(),
                name: (*name).to_string(),
                attribute: attribute.join("."),
            }),
            _ => Err(invalid("expected TYPE.NAME.ATTRIBUTE")),
        }
    }

    /// The name of the vertex this reference makes its holder depend on.
    pub fn dependency_name(&self) -> Option<String> {
        match self {
            Self::Variable { name } => Some(format!("var.{name}")),
            Self::Resource { kind, name, .. } => Some(format!("{kind}.{name}")),
            Self::Module { module, output } => Some(format!("module.{module}.output.{output}")),
            Self::Count { .. } | Self::Path { .. } | Self::SelfAttr { .. } => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable { name } => write!(f, "var.{name}"),
            Self::Resource {
                kind,
                name,
                attribute,
            } => write!(f, "{kind}.{name}.{attribute}"),
            Self::Module { module, output } => write!(f, "module.{module}.{output}"),
            Self::Count { field } => write!(f, "count.{field}"),
            Self::Path { field } => write!(f, "path.{field}"),
            Self::SelfAttr { attribute } => write!(f, "self.{attribute}"),
        }
    }
}

/// A piece of an interpolated string.
#[derive(Debug, PartialEq, Eq)]
enum Piece<'a> {
    Text(&'a str),
    Interpolation(&'a str),
}

fn pieces(input: &str) -> Result<Vec<Piece<'_>>, ConfigError> {
    let mut pieces = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        if start > 0 {
            pieces.push(Piece::Text(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::UnterminatedInterpolation(input.to_string()))?;
        pieces.push(Piece::Interpolation(after[..end].trim()));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }

    Ok(pieces)
}

/// Raw, uninterpolated configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawConfig(Value);

impl RawConfig {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Every well-formed reference, in order of first appearance.
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        visit_strings(&self.0, &mut |s| {
            if let Ok(parsed) = pieces(s) {
                for piece in parsed {
                    if let Piece::Interpolation(text) = piece {
                        if let Ok(reference) = Reference::parse(text) {
                            if !refs.contains(&reference) {
                                refs.push(reference);
                            }
                        }
                    }
                }
            }
        });
        refs
    }

    /// Dependency names derived from [`RawConfig::references`].
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.references().iter().filter_map(Reference::dependency_name) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Check that every interpolation is terminated and well-formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut result = Ok(());
        visit_strings(&self.0, &mut |s| {
            if result.is_err() {
                return;
            }
            result = pieces(s).and_then(|parsed| {
                parsed.into_iter().try_for_each(|piece| match piece {
                    Piece::Interpolation(text) => Reference::parse(text).map(drop),
                    Piece::Text(_) => Ok(()),
                })
            });
        });
        result
    }

    /// Produce the interpolated value, resolving references with `lookup`.
    pub fn interpolate<E, F>(&self, mut lookup: F) -> Result<Value, E>
    where
        E: From<ConfigError>,
        F: FnMut(&Reference) -> Result<Value, E>,
    {
        interpolate_value(&self.0, &mut lookup)
    }
}

impl From<Value> for RawConfig {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn visit_strings(value: &Value, visit: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => visit(s),
        Value::Array(items) => items.iter().for_each(|item| visit_strings(item, visit)),
        Value::Object(map) => map.values().for_each(|item| visit_strings(item, visit)),
        _ => {}
    }
}

fn interpolate_value<E, F>(value: &Value, lookup: &mut F) -> Result<Value, E>
where
    E: From<ConfigError>,
    F: FnMut(&Reference) -> Result<Value, E>,
{
    match value {
        Value::String(s) => interpolate_string(s, lookup),
        Value::Array(items) => items
            .iter()
            .map(|item| interpolate_value(item, lookup))
            .collect::<Result<Vec<_>, E>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), interpolate_value(item, lookup)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn interpolate_string<E, F>(input: &str, lookup: &mut F) -> Result<Value, E>
where
    E: From<ConfigError>,
    F: FnMut(&Reference) -> Result<Value, E>,
{
    let parsed = pieces(input)?;

    if let [Piece::Interpolation(text)] = parsed.as_slice() {
        return lookup(&Reference::parse(text)?);
    }

    let mut rendered = String::new();
    for piece in parsed {
        match piece {
            Piece::Text(text) => rendered.push_str(text),
            Piece::Interpolation(text) => {
                let value = lookup(&Reference::parse(text)?)?;
                if is_unknown(&value) {
                    return Ok(unknown());
                }
                match value {
                    Value::String(s) => rendered.push_str(&s),
                    other => rendered.push_str(&other.to_string()),
                }
            }
        }
    }
    Ok(Value::String(rendered))
}
