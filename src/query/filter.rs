//! Validated asset filter requests

use crate::model::{AnnotationLayer, ConfusionMatrix};
use crate::query::error::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Largest page a single query may return
pub const MAX_PAGE_SIZE: usize = 1000;

/// Page size when the caller gives none
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One tag-filter expression
///
/// `key` and `key:` test that the tag exists, `key:value` that it equals
/// `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagExpr {
    pub key: String,
    pub value: Option<String>,
}

impl TagExpr {
    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

impl FromStr for TagExpr {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (key, value) = match parts.as_slice() {
            [key] => (*key, None),
            [key, ""] => (*key, None),
            [key, value] => (*key, Some(value.to_string())),
            _ => {
                return Err(QueryError::InvalidFilter(format!(
                    "tag expression '{}' has more than one ':'",
                    s
                )))
            }
        };

        if key.is_empty() {
            return Err(QueryError::InvalidFilter(format!(
                "tag expression '{}' has an empty key",
                s
            )));
        }

        Ok(Self {
            key: key.to_string(),
            value,
        })
    }
}

impl std::fmt::Display for TagExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}:{}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

/// A validated asset query
#[derive(Debug, Clone, PartialEq)]
pub struct AssetFilter {
    pub offset: usize,
    /// Page size; 0 only counts
    pub limit: usize,
    pub class_ids: Vec<i32>,
    /// Layers the class match is restricted to (empty = both)
    pub layers: Vec<AnnotationLayer>,
    /// Page starts at the first asset id >= this
    pub anchor_asset_id: Option<String>,
    pub include_cm: Vec<ConfusionMatrix>,
    pub exclude_cm: Vec<ConfusionMatrix>,
    /// Filters on the asset-level cks map
    pub cks: Vec<TagExpr>,
    /// Filters on annotation tags (either layer)
    pub tags: Vec<TagExpr>,
}

impl AssetFilter {
    pub fn builder() -> AssetFilterBuilder {
        AssetFilterBuilder::default()
    }

    /// Filter matching every asset, first page
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
            class_ids: Vec::new(),
            layers: Vec::new(),
            anchor_asset_id: None,
            include_cm: Vec::new(),
            exclude_cm: Vec::new(),
            cks: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// Builder for `AssetFilter`; raw tag expressions are parsed in `build`
#[derive(Debug, Clone, Default)]
pub struct AssetFilterBuilder {
    offset: usize,
    limit: Option<usize>,
    class_ids: Vec<i32>,
    layers: Vec<AnnotationLayer>,
    anchor_asset_id: Option<String>,
    include_cm: Vec<ConfusionMatrix>,
    exclude_cm: Vec<ConfusionMatrix>,
    cks: Vec<String>,
    tags: Vec<String>,
}

impl AssetFilterBuilder {
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn class_ids(mut self, ids: impl IntoIterator<Item = i32>) -> Self {
        self.class_ids.extend(ids);
        self
    }

    pub fn layers(mut self, layers: impl IntoIterator<Item = AnnotationLayer>) -> Self {
        self.layers.extend(layers);
        self
    }

    /// Empty ids are ignored
    pub fn anchor(mut self, asset_id: impl Into<String>) -> Self {
        let asset_id = asset_id.into();
        self.anchor_asset_id = (!asset_id.is_empty()).then_some(asset_id);
        self
    }

    pub fn include_cm(mut self, codes: impl IntoIterator<Item = ConfusionMatrix>) -> Self {
        self.include_cm.extend(codes);
        self
    }

    pub fn exclude_cm(mut self, codes: impl IntoIterator<Item = ConfusionMatrix>) -> Self {
        self.exclude_cm.extend(codes);
        self
    }

    pub fn cks<S: Into<String>>(mut self, exprs: impl IntoIterator<Item = S>) -> Self {
        self.cks.extend(exprs.into_iter().map(Into::into));
        self
    }

    pub fn tags<S: Into<String>>(mut self, exprs: impl IntoIterator<Item = S>) -> Self {
        self.tags.extend(exprs.into_iter().map(Into::into));
        self
    }

    /// Validate and build the filter
    pub fn build(self) -> QueryResult<AssetFilter> {
        if !self.include_cm.is_empty() && !self.exclude_cm.is_empty() {
            return Err(QueryError::InvalidFilter(
                "include_cm and exclude_cm are mutually exclusive".to_string(),
            ));
        }

        let parse = |exprs: Vec<String>| -> QueryResult<Vec<TagExpr>> {
            exprs.iter().map(|e| e.parse()).collect()
        };

        let mut class_ids = self.class_ids;
        class_ids.sort_unstable();
        class_ids.dedup();

        let mut layers = self.layers;
        layers.sort_unstable();
        layers.dedup();

        Ok(AssetFilter {
            offset: self.offset,
            limit: self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
            class_ids,
            layers,
            anchor_asset_id: self.anchor_asset_id,
            include_cm: self.include_cm,
            exclude_cm: self.exclude_cm,
            cks: parse(self.cks)?,
            tags: parse(self.tags)?,
        })
    }
}
