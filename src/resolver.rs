use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::backend::Backend;
use crate::error::{ImportError, Result};
use crate::mapper::FieldMapping;
use crate::models::{EntityType, Field, NormalizedRecord};

/// Tax id → patient id, built from one lookup and dropped with its job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    ids: HashMap<String, i64>,
}

impl ReferenceIndex {
    pub fn get(&self, tax_id: &str) -> Option<i64> {
        self.ids.get(tax_id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// A mapped `patient_id` column wins over `tax_id`; natural keys are only
/// consulted when it is absent.
pub fn uses_natural_key(entity: EntityType, mapping: &FieldMapping) -> bool {
    entity.references_patient()
        && !mapping.is_mapped(Field::PatientId)
        && mapping.is_mapped(Field::TaxId)
}

/// Translate every distinct tax id in `candidates` with a single backend call.
/// Any key left unmatched fails the job.
pub fn resolve<B: Backend + ?Sized>(
    backend: &B,
    entity: EntityType,
    candidates: &[NormalizedRecord],
    mapping: &FieldMapping,
) -> Result<Option<ReferenceIndex>> {
    if !uses_natural_key(entity, mapping) {
        return Ok(None);
    }

    let keys: Vec<String> = candidates
        .iter()
        .filter_map(|r| r.text(Field::TaxId))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();
    if keys.is_empty() {
        return Ok(Some(ReferenceIndex::default()));
    }

    debug!("Looking up {} distinct tax id(s)", keys.len());
    let found = backend
        .find_patients_by_tax_id(&keys)
        .map_err(|e| ImportError::Lookup(e.to_string()))?;
    let ids: HashMap<String, i64> = found.into_iter().map(|p| (p.tax_id, p.id)).collect();

    let missing: Vec<String> = keys.into_iter().filter(|k| !ids.contains_key(k)).collect();
    if !missing.is_empty() {
        return Err(ImportError::UnresolvedReference { missing });
    }
    let index = ReferenceIndex { ids };
    debug!("Resolved {} patient(s)", index.len());
    Ok(Some(index))
}
