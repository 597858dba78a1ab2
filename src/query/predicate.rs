//! Predicate trees and their SQL rendering
//!
//! A `Predicate` is the store-neutral form of a compiled filter. Rendering
//! against a `Collection` produces a `WHERE` fragment over the document
//! table whose leaves are `asset_id IN (SELECT ...)` lookups into the
//! secondary tables.

use crate::index::collection::{Collection, CKS_LAYER};
use crate::model::AnnotationLayer;
use rusqlite::types::Value;

/// Where a tag lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope {
    /// The asset-level cks map
    Asset,
    /// Annotation tags in either layer
    Annotation,
}

/// Boolean filter over the assets of one collection
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// `asset_id >= id`
    AssetIdAtLeast(String),
    /// Some annotation of one of `class_ids` in one of `layers`
    ClassIn {
        layers: Vec<AnnotationLayer>,
        class_ids: Vec<i32>,
    },
    /// At least one annotation in one of `layers`
    HasAnnotations { layers: Vec<AnnotationLayer> },
    /// Some annotation in either layer has one of the cm `codes`
    CmIn { codes: Vec<i64> },
    /// Tag `key` exists (`value: None`) or equals `value`
    Tag {
        scope: TagScope,
        key: String,
        value: Option<String>,
    },
}

/// Rendered SQL with positional parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Predicate {
    /// Conjunction that collapses trivial cases
    pub fn and(mut clauses: Vec<Predicate>) -> Predicate {
        clauses.retain(|c| *c != Predicate::All);
        match clauses.len() {
            0 => Predicate::All,
            1 => clauses.remove(0),
            _ => Predicate::And(clauses),
        }
    }

    /// Disjunction that collapses a single clause
    pub fn or(mut clauses: Vec<Predicate>) -> Predicate {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Predicate::Or(clauses)
        }
    }

    pub fn to_sql(&self, collection: &Collection) -> SqlFragment {
        let mut params = Vec::new();
        let sql = self.render(collection, &mut params);
        SqlFragment { sql, params }
    }

    fn render(&self, c: &Collection, params: &mut Vec<Value>) -> String {
        match self {
            Predicate::All => "1".to_string(),
            Predicate::And(clauses) => join(clauses, " AND ", "1", c, params),
            Predicate::Or(clauses) => join(clauses, " OR ", "0", c, params),
            Predicate::Not(inner) => format!("NOT ({})", inner.render(c, params)),
            Predicate::AssetIdAtLeast(id) => {
                params.push(Value::Text(id.clone()));
                "asset_id >= ?".to_string()
            }
            Predicate::ClassIn { layers, class_ids } => {
                let ids = placeholders(params, class_ids.iter().map(|id| Value::Integer(*id as i64)));
                let layers = layer_list(params, layers);
                format!(
                    "asset_id IN (SELECT asset_id FROM {} WHERE class_id IN ({}) AND layer IN ({}))",
                    c.classes_table(),
                    ids,
                    layers
                )
            }
            Predicate::HasAnnotations { layers } => {
                let layers = layer_list(params, layers);
                format!(
                    "asset_id IN (SELECT asset_id FROM {} WHERE layer IN ({}))",
                    c.classes_table(),
                    layers
                )
            }
            Predicate::CmIn { codes } => {
                let codes = placeholders(params, codes.iter().map(|code| Value::Integer(*code)));
                format!(
                    "asset_id IN (SELECT asset_id FROM {} WHERE cm IN ({}))",
                    c.cm_table(),
                    codes
                )
            }
            Predicate::Tag { scope, key, value } => {
                let layer_clause = match scope {
                    TagScope::Asset => {
                        params.push(Value::Text(CKS_LAYER.to_string()));
                        "layer = ?".to_string()
                    }
                    TagScope::Annotation => format!("layer IN ({})", layer_list(params, &[])),
                };
                params.push(Value::Text(key.clone()));
                let value_clause = match value {
                    Some(value) => {
                        params.push(Value::Text(value.clone()));
                        " AND value = ?"
                    }
                    None => "",
                };
                format!(
                    "asset_id IN (SELECT asset_id FROM {} WHERE {} AND key = ?{})",
                    c.tags_table(),
                    layer_clause,
                    value_clause
                )
            }
        }
    }
}

fn join(
    clauses: &[Predicate],
    sep: &str,
    empty: &str,
    c: &Collection,
    params: &mut Vec<Value>,
) -> String {
    if clauses.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = clauses
        .iter()
        .map(|p| format!("({})", p.render(c, params)))
        .collect();
    parts.join(sep)
}

fn placeholders(params: &mut Vec<Value>, values: impl Iterator<Item = Value>) -> String {
    let mut marks = Vec::new();
    for value in values {
        params.push(value);
        marks.push("?");
    }
    if marks.is_empty() {
        // `IN ()` is valid in SQLite and matches nothing
        return String::new();
    }
    marks.join(", ")
}

/// Layer names as placeholders; an empty list means both layers
fn layer_list(params: &mut Vec<Value>, layers: &[AnnotationLayer]) -> String {
    let layers = if layers.is_empty() {
        AnnotationLayer::all()
    } else {
        layers
    };
    placeholders(
        params,
        layers.iter().map(|l| Value::Text(l.as_str().to_string())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_collapses() {
        assert_eq!(Predicate::and(vec![]), Predicate::All);
        assert_eq!(
            Predicate::and(vec![Predicate::All, Predicate::AssetIdAtLeast("a".into())]),
            Predicate::AssetIdAtLeast("a".into())
        );
    }

    #[test]
    fn test_render_params_in_order() {
        let c = Collection::new("b@t");
        let predicate = Predicate::and(vec![
            Predicate::ClassIn {
                layers: vec![AnnotationLayer::Prediction],
                class_ids: vec![1, 2],
            },
            Predicate::Tag {
                scope: TagScope::Asset,
                key: "city".into(),
                value: Some("paris".into()),
            },
        ]);

        let fragment = predicate.to_sql(&c);
        assert_eq!(
            fragment.params,
            vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Text("pred".into()),
                Value::Text("cks".into()),
                Value::Text("city".into()),
                Value::Text("paris".into()),
            ]
        );
        assert_eq!(fragment.sql.matches('?').count(), fragment.params.len());
        assert!(fragment.sql.contains("\"b@t/classes\""));
        assert!(fragment.sql.contains("\"b@t/tags\""));
    }

    #[test]
    fn test_not_and_empty_or() {
        let c = Collection::new("b@t");
        let fragment = Predicate::Not(Box::new(Predicate::CmIn { codes: vec![2] })).to_sql(&c);
        assert!(fragment.sql.starts_with("NOT (asset_id IN"));
        assert_eq!(Predicate::Or(vec![]).to_sql(&c).sql, "0");
        assert_eq!(Predicate::All.to_sql(&c).sql, "1");
    }
}
