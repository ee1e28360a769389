//! Label -> waste category lookup.

use std::collections::BTreeMap;

use crate::error::SorterError;
use crate::types::WasteCategory;

/// Total over the labels it was built with; anything else is an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryTable {
    map: BTreeMap<String, WasteCategory>,
}

impl CategoryTable {
    /// The stock seven-label table shipped with the default model.
    pub fn stock() -> Self {
        sorter_config::default_categories()
            .into_iter()
            .map(|(label, cat)| (label, WasteCategory::from(cat)))
            .collect()
    }

    pub fn insert(&mut self, label: impl Into<String>, category: WasteCategory) {
        self.map.insert(label.into(), category);
    }

    pub fn category(&self, label: &str) -> Result<WasteCategory, SorterError> {
        self.map
            .get(label)
            .copied()
            .ok_or_else(|| SorterError::UnmappedLabel(label.to_string()))
    }

    /// Fail on the first label the table does not cover.
    pub fn ensure_covers<'a>(
        &self,
        labels: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), SorterError> {
        for label in labels {
            self.category(label)?;
        }
        Ok(())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(String, WasteCategory)> for CategoryTable {
    fn from_iter<I: IntoIterator<Item = (String, WasteCategory)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}
