//! Filter → predicate compilation
//!
//! Every dimension present in the filter contributes one AND clause; the
//! values inside a dimension are OR'ed.

use crate::query::filter::{AssetFilter, TagExpr};
use crate::query::predicate::{Predicate, TagScope};

/// Predicate selecting every asset that matches the filter (no anchor)
pub fn compile(filter: &AssetFilter) -> Predicate {
    let mut clauses = Vec::new();

    if !filter.class_ids.is_empty() {
        clauses.push(Predicate::ClassIn {
            layers: filter.layers.clone(),
            class_ids: filter.class_ids.clone(),
        });
    } else if !filter.layers.is_empty() {
        clauses.push(Predicate::HasAnnotations {
            layers: filter.layers.clone(),
        });
    }

    if !filter.include_cm.is_empty() {
        clauses.push(Predicate::CmIn {
            codes: filter.include_cm.iter().map(|cm| cm.code()).collect(),
        });
    }
    if !filter.exclude_cm.is_empty() {
        clauses.push(Predicate::Not(Box::new(Predicate::CmIn {
            codes: filter.exclude_cm.iter().map(|cm| cm.code()).collect(),
        })));
    }

    if !filter.cks.is_empty() {
        clauses.push(tag_clause(TagScope::Asset, &filter.cks));
    }
    if !filter.tags.is_empty() {
        clauses.push(tag_clause(TagScope::Annotation, &filter.tags));
    }

    Predicate::and(clauses)
}

/// Predicate selecting the page: the filter restricted to ids >= anchor
pub fn compile_page(filter: &AssetFilter) -> Predicate {
    let base = compile(filter);
    match &filter.anchor_asset_id {
        Some(anchor) => Predicate::and(vec![base, Predicate::AssetIdAtLeast(anchor.clone())]),
        None => base,
    }
}

fn tag_clause(scope: TagScope, exprs: &[TagExpr]) -> Predicate {
    Predicate::or(
        exprs
            .iter()
            .map(|expr| Predicate::Tag {
                scope,
                key: expr.key.clone(),
                value: expr.value.clone(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationLayer, ConfusionMatrix};

    #[test]
    fn test_empty_filter_matches_all() {
        assert_eq!(compile(&AssetFilter::all()), Predicate::All);
    }

    #[test]
    fn test_dimensions_are_anded_values_ored() {
        let filter = AssetFilter::builder()
            .class_ids([1, 2])
            .exclude_cm([ConfusionMatrix::Fp, ConfusionMatrix::Fn])
            .cks(["city:paris", "weather"])
            .build()
            .unwrap();

        let predicate = compile(&filter);
        let Predicate::And(clauses) = predicate else {
            panic!("expected a conjunction");
        };
        assert_eq!(clauses.len(), 3);
        assert_eq!(
            clauses[0],
            Predicate::ClassIn {
                layers: vec![],
                class_ids: vec![1, 2]
            }
        );
        assert_eq!(
            clauses[1],
            Predicate::Not(Box::new(Predicate::CmIn { codes: vec![2, 3] }))
        );
        assert!(matches!(&clauses[2], Predicate::Or(tags) if tags.len() == 2));
    }

    #[test]
    fn test_layers_without_classes() {
        let filter = AssetFilter::builder()
            .layers([AnnotationLayer::Prediction])
            .build()
            .unwrap();
        assert_eq!(
            compile(&filter),
            Predicate::HasAnnotations {
                layers: vec![AnnotationLayer::Prediction]
            }
        );
    }

    #[test]
    fn test_anchor_only_affects_page() {
        let filter = AssetFilter::builder().anchor("a3").build().unwrap();
        assert_eq!(compile(&filter), Predicate::All);
        assert_eq!(
            compile_page(&filter),
            Predicate::AssetIdAtLeast("a3".to_string())
        );
    }
}
