//! Static catalog of owned-fragrance candidates and niche references.
//!
//! # Responsibility
//! - Parse and validate the embedded catalog data once per process.
//! - Answer read-only lookups by id, family, house, note and price.
//!
//! # Invariants
//! - Ids are unique within each list.
//! - Load order is preserved; matchers rely on it for stable tie-breaking.
//! - Entries are never mutated after load. Clones share one allocation.

use crate::model::fragrance::{
    FragranceItem, FragranceRecord, Family, RecordError, ReferenceItem, ReferenceRecord,
};
use log::{error, info};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

const FRAGRANCES_JSON: &str = include_str!("../../data/fragrances.json");
const REFERENCES_JSON: &str = include_str!("../../data/references.json");

static BUILTIN: Lazy<Result<Catalog, CatalogError>> =
    Lazy::new(|| Catalog::from_json(FRAGRANCES_JSON, REFERENCES_JSON));

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to parse {kind} catalog: {message}")]
    Parse { kind: &'static str, message: String },
    #[error(transparent)]
    InvalidRecord(#[from] RecordError),
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },
}

#[derive(Debug)]
struct CatalogData {
    fragrances: Vec<FragranceItem>,
    references: Vec<ReferenceItem>,
    fragrance_index: HashMap<String, usize>,
    reference_index: HashMap<String, usize>,
}

/// Immutable, cheaply clonable catalog handle.
#[derive(Debug, Clone)]
pub struct Catalog {
    inner: Arc<CatalogData>,
}

impl Catalog {
    /// Catalog compiled into the binary.
    ///
    /// # Errors
    /// - Returns the load error when the embedded data is invalid.
    pub fn builtin() -> Result<Catalog, CatalogError> {
        (*BUILTIN).clone()
    }

    /// Parses both lists from JSON arrays of records.
    pub fn from_json(fragrances: &str, references: &str) -> Result<Catalog, CatalogError> {
        let fragrances: Vec<FragranceRecord> =
            serde_json::from_str(fragrances).map_err(|err| CatalogError::Parse {
                kind: "fragrance",
                message: err.to_string(),
            })?;
        let references: Vec<ReferenceRecord> =
            serde_json::from_str(references).map_err(|err| CatalogError::Parse {
                kind: "reference",
                message: err.to_string(),
            })?;
        Self::from_records(fragrances, references)
    }

    /// Validates raw records and builds the catalog.
    pub fn from_records(
        fragrances: Vec<FragranceRecord>,
        references: Vec<ReferenceRecord>,
    ) -> Result<Catalog, CatalogError> {
        let fragrances = fragrances
            .into_iter()
            .map(FragranceItem::new)
            .collect::<Result<Vec<_>, _>>()?;
        let references = references
            .into_iter()
            .map(ReferenceItem::new)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_items(fragrances, references)
    }

    /// Builds a catalog from already validated items.
    pub fn from_items(
        fragrances: Vec<FragranceItem>,
        references: Vec<ReferenceItem>,
    ) -> Result<Catalog, CatalogError> {
        let fragrance_index = index_by_id("fragrance", &fragrances, |item| &item.id)?;
        let reference_index = index_by_id("reference", &references, |item| &item.id)?;

        let catalog = Catalog {
            inner: Arc::new(CatalogData {
                fragrances,
                references,
                fragrance_index,
                reference_index,
            }),
        };
        info!(
            "event=catalog_load module=catalog status=ok fragrances={} references={}",
            catalog.fragrances().len(),
            catalog.references().len()
        );
        Ok(catalog)
    }

    pub fn fragrances(&self) -> &[FragranceItem] {
        &self.inner.fragrances
    }

    pub fn references(&self) -> &[ReferenceItem] {
        &self.inner.references
    }

    pub fn fragrance(&self, id: &str) -> Option<&FragranceItem> {
        self.inner
            .fragrance_index
            .get(id)
            .map(|&index| &self.inner.fragrances[index])
    }

    pub fn reference(&self, id: &str) -> Option<&ReferenceItem> {
        self.inner
            .reference_index
            .get(id)
            .map(|&index| &self.inner.references[index])
    }

    pub fn contains_fragrance(&self, id: &str) -> bool {
        self.inner.fragrance_index.contains_key(id)
    }

    pub fn fragrances_by_family(&self, family: Family) -> Vec<&FragranceItem> {
        self.fragrances()
            .iter()
            .filter(|item| item.family == family)
            .collect()
    }

    /// Case-insensitive match on the house name.
    pub fn fragrances_by_house(&self, house: &str) -> Vec<&FragranceItem> {
        let house = house.to_lowercase();
        self.fragrances()
            .iter()
            .filter(|item| item.house.to_lowercase() == house)
            .collect()
    }

    /// Items with any note containing `note`, case-insensitive.
    pub fn fragrances_by_note(&self, note: &str) -> Vec<&FragranceItem> {
        let note = note.to_lowercase();
        self.fragrances()
            .iter()
            .filter(|item| item.all_notes().any(|n| n.to_lowercase().contains(&note)))
            .collect()
    }

    pub fn references_by_family(&self, family: Family) -> Vec<&ReferenceItem> {
        self.references()
            .iter()
            .filter(|item| item.family == family)
            .collect()
    }

    /// References priced within `min..=max`.
    pub fn references_in_price_range(&self, min: f64, max: f64) -> Vec<&ReferenceItem> {
        self.references()
            .iter()
            .filter(|item| item.retail_price >= min && item.retail_price <= max)
            .collect()
    }

    /// Mean reference price rounded to a whole unit, 0 for an empty list.
    pub fn average_reference_price(&self) -> f64 {
        let references = self.references();
        if references.is_empty() {
            return 0.0;
        }
        let total: f64 = references.iter().map(|item| item.retail_price).sum();
        (total / references.len() as f64).round()
    }

    /// Summed retail price of the given fragrance ids. Unknown ids count as 0.
    pub fn collection_value<S: AsRef<str>>(&self, ids: &[S]) -> f64 {
        ids.iter()
            .filter_map(|id| self.fragrance(id.as_ref()))
            .map(|item| item.retail_price)
            .sum()
    }
}

fn index_by_id<T>(
    kind: &'static str,
    items: &[T],
    id_of: impl Fn(&T) -> &String,
) -> Result<HashMap<String, usize>, CatalogError> {
    let mut index = HashMap::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let id = id_of(item);
        if index.insert(id.clone(), position).is_some() {
            error!("event=catalog_load module=catalog status=error error_code=duplicate_id kind={kind}");
            return Err(CatalogError::DuplicateId {
                kind,
                id: id.clone(),
            });
        }
    }
    Ok(index)
}
