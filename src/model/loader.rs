//! Model file loading.
//!
//! Accepts a structured [`ModelSpec`] value directly, or a file path with
//! a `.json`, `.yml`, or `.yaml` extension (semantics identical across
//! formats). Parsing goes through `figment`'s format providers, the same
//! crate and idiom `config.rs` uses for application configuration, so the
//! core doesn't carry a second ad hoc parser.

use std::collections::BTreeMap;
use std::path::Path;

use figment::providers::{Format, Json, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::model::{CptRow, Model, RawVariable};

/// A single cell of a CPT row as it appears in a serialized document: an
/// outcome label (own or parent) or, in the last position, a probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableValue {
    Num(f64),
    Str(String),
}

/// One variable as it appears in a serialized model document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarSpec {
    pub outcomes: Vec<String>,
    #[serde(default)]
    pub parents: Option<Vec<String>>,
    #[serde(default)]
    pub table: Option<Vec<Vec<TableValue>>>,
}

/// The full serialized model document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub model: BTreeMap<String, VarSpec>,
}

/// Load and validate a model from a file path. The extension selects the
/// format provider; semantics are identical across `.json` / `.yml` /
/// `.yaml`.
pub fn load_model_file(path: impl AsRef<Path>, tolerance: f64) -> CoreResult<Model> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let figment = match ext.as_str() {
        "json" => Figment::new().merge(Json::file(path)),
        "yml" | "yaml" => Figment::new().merge(Yaml::file(path)),
        other => {
            return Err(CoreError::MalformedModel(format!(
                "unsupported model file extension '{other}' (expected .json, .yml, or .yaml)"
            )))
        }
    };

    let spec: ModelSpec = figment
        .extract()
        .map_err(|e| CoreError::MalformedModel(format!("failed to parse '{}': {e}", path.display())))?;

    build_model_from_spec(spec, tolerance)
}

/// Build a model directly from an in-memory [`ModelSpec`], e.g. one
/// constructed programmatically rather than read from disk.
pub fn build_model_from_spec(spec: ModelSpec, tolerance: f64) -> CoreResult<Model> {
    let mut raw = BTreeMap::new();
    for (var_name, var_spec) in spec.model {
        let parents = var_spec.parents.unwrap_or_default();
        let table = match var_spec.table {
            None => None,
            Some(rows) => Some(parse_rows(&var_name, &parents, rows)?),
        };
        raw.insert(
            var_name,
            RawVariable {
                outcomes: var_spec.outcomes,
                parents,
                table,
            },
        );
    }
    Model::build(spec.name, raw, tolerance)
}

fn parse_rows(var_name: &str, parents: &[String], rows: Vec<Vec<TableValue>>) -> CoreResult<Vec<CptRow>> {
    let expected_len = parents.len() + 2;
    let mut parsed = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() != expected_len {
            return Err(CoreError::MalformedTable {
                variable: var_name.to_string(),
                detail: format!(
                    "row has {} columns, expected {expected_len} (own outcome + {} parent outcomes + probability)",
                    row.len(),
                    parents.len()
                ),
            });
        }
        let mut cells = row.into_iter();
        let outcome = expect_str(var_name, cells.next().unwrap())?;
        let parent_outcomes = cells
            .by_ref()
            .take(parents.len())
            .map(|c| expect_str(var_name, c))
            .collect::<CoreResult<Vec<_>>>()?;
        let probability = expect_num(var_name, cells.next().unwrap())?;
        parsed.push(CptRow::new(outcome, parent_outcomes, probability));
    }
    Ok(parsed)
}

fn expect_str(var_name: &str, value: TableValue) -> CoreResult<String> {
    match value {
        TableValue::Str(s) => Ok(s),
        TableValue::Num(n) => Err(CoreError::MalformedTable {
            variable: var_name.to_string(),
            detail: format!("expected an outcome label, found number {n}"),
        }),
    }
}

fn expect_num(var_name: &str, value: TableValue) -> CoreResult<f64> {
    match value {
        TableValue::Num(n) => Ok(n),
        TableValue::Str(s) => Err(CoreError::MalformedTable {
            variable: var_name.to_string(),
            detail: format!("expected a probability, found label '{s}'"),
        }),
    }
}
