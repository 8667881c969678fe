//! # Export Planner
//!
//! Turns the raw filter bag submitted with an import or refresh into typed
//! [`FilterParams`] and decides, per requested format, whether the data is
//! fetched directly or through a server-side export.
//!
//! ## Raw Input
//!
//! Values arrive either as JSON natives or as form strings:
//!
//! | Key | Default | Accepted |
//! |-----|---------|----------|
//! | `include_questionnaire` | `true` | boolean |
//! | `fields_from_all_versions` | `true` | boolean |
//! | `group_sep` | `"/"` | string |
//! | `hierarchy_in_labels` | `true` | boolean |
//! | `multiple_select` | `"both"` | `both`, `summary`, `details` |
//! | `fields` | `[]` | list or comma separated string |
//! | `formats` | `["csv"]` | list or comma separated string |
//! | `query` | none | object or dict literal in either quote style |
//!
//! Booleans accept `true/false/yes/no/on/off/1/0` in any case.

use crate::resource::{FilterParams, MultipleSelect};
use crate::{Result, SyncError};
use bridge_traits::survey::ExportFormat;
use serde_json::{Map, Value};

/// Filter bag as submitted by the caller.
pub type RawFilterInput = Map<String, Value>;

/// How one requested format is materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatPlan {
    pub format: ExportFormat,
    pub needs_export: bool,
    pub params: FilterParams,
}

/// Everything an initial import creates.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPlan {
    pub include_questionnaire: bool,
    pub formats: Vec<FormatPlan>,
}

/// Plan each requested format against the filters in `raw`.
///
/// Duplicates are collapsed; `spss` and `spss_labels` name the same format.
///
/// # Errors
///
/// - `RemoteValidation` for a format outside csv, xls, geojson, spss, json
/// - `Validation` for a malformed filter value
pub fn plan(requested: &[String], raw: &RawFilterInput) -> Result<Vec<FormatPlan>> {
    let params = parse_filters(raw)?;
    let mut plans: Vec<FormatPlan> = Vec::with_capacity(requested.len());

    for name in requested {
        let format: ExportFormat = name.parse()?;
        if plans.iter().any(|p| p.format == format) {
            continue;
        }

        plans.push(FormatPlan {
            format,
            needs_export: format.requires_export(),
            params: params.clone(),
        });
    }

    Ok(plans)
}

/// Plan an initial import from the raw bag alone.
pub fn plan_import(raw: &RawFilterInput) -> Result<ImportPlan> {
    let include_questionnaire = include_questionnaire(raw)?;
    let formats = string_list(raw, "formats")?.unwrap_or_else(|| vec!["csv".to_string()]);

    Ok(ImportPlan {
        include_questionnaire,
        formats: plan(&formats, raw)?,
    })
}

/// `include_questionnaire` flag of a raw bag, `true` when absent.
pub fn include_questionnaire(raw: &RawFilterInput) -> Result<bool> {
    bool_field(raw, "include_questionnaire", true)
}

/// Parse the filter keys of a raw bag, applying defaults for absent keys.
pub fn parse_filters(raw: &RawFilterInput) -> Result<FilterParams> {
    apply_filter_edits(&FilterParams::default(), raw)
}

/// Overlay the filter keys present in `raw` on `base`.
///
/// Absent and null keys keep the value from `base`. An empty `query` or
/// `fields` clears it.
pub fn apply_filter_edits(base: &FilterParams, raw: &RawFilterInput) -> Result<FilterParams> {
    let group_sep = match raw.get("group_sep") {
        None | Some(Value::Null) => base.group_sep.clone(),
        Some(Value::String(sep)) if !sep.is_empty() => sep.clone(),
        Some(other) => {
            return Err(SyncError::Validation(format!(
                "group_sep must be a non-empty string (got {})",
                other
            )))
        }
    };

    let multiple_select = match raw.get("multiple_select") {
        None | Some(Value::Null) => base.multiple_select,
        Some(Value::String(mode)) => mode.parse::<MultipleSelect>()?,
        Some(other) => {
            return Err(SyncError::Validation(format!(
                "multiple_select must be a string (got {})",
                other
            )))
        }
    };

    Ok(FilterParams {
        fields_from_all_versions: bool_field(
            raw,
            "fields_from_all_versions",
            base.fields_from_all_versions,
        )?,
        group_sep,
        hierarchy_in_labels: bool_field(raw, "hierarchy_in_labels", base.hierarchy_in_labels)?,
        multiple_select,
        fields: string_list(raw, "fields")?.unwrap_or_else(|| base.fields.clone()),
        query: query_field(raw)?.unwrap_or_else(|| base.query.clone()),
    })
}

// ============================================================================
// Value Coercion
// ============================================================================

fn bool_field(raw: &RawFilterInput, key: &str, default: bool) -> Result<bool> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => as_bool(value).ok_or_else(|| {
            SyncError::Validation(format!("{} must be a boolean (got {})", key, value))
        }),
    }
}

/// Lenient boolean coercion for form values.
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn string_list(raw: &RawFilterInput, key: &str) -> Result<Option<Vec<String>>> {
    let items = match raw.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(SyncError::Validation(format!(
                    "{} entries must be strings (got {})",
                    key, other
                ))),
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|item| !item.is_empty())
            .collect(),
        Some(other) => {
            return Err(SyncError::Validation(format!(
                "{} must be a list or a comma separated string (got {})",
                key, other
            )))
        }
    };

    Ok(Some(items))
}

/// `None` when the key is absent, `Some(None)` when it clears the query.
fn query_field(raw: &RawFilterInput) -> Result<Option<Option<Map<String, Value>>>> {
    let parsed = match raw.get("query") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Some(None)),
        Some(Value::String(s)) => parse_dict_literal(s)?,
        Some(value) => value.clone(),
    };

    match parsed {
        Value::Object(map) if map.is_empty() => Ok(Some(None)),
        Value::Object(map) => Ok(Some(Some(map))),
        other => Err(SyncError::Validation(format!(
            "query must be an object (got {})",
            other
        ))),
    }
}

/// Parse a dict literal written with single or double quotes.
///
/// `True`, `False` and `None` outside strings map to their JSON spellings.
pub fn parse_dict_literal(input: &str) -> Result<Value> {
    let json = literal_to_json(input);
    serde_json::from_str(&json)
        .map_err(|e| SyncError::Validation(format!("query is not a valid dictionary: {}", e)))
}

fn literal_to_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => out.push('\\'),
                        },
                        '"' if quote == '\'' => out.push_str("\\\""),
                        q if q == quote => break,
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    _ => &word,
                });
            }
            other => out.push(other),
        }
    }

    out
}
