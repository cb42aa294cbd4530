use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{normalize_name, CriterionId};
use super::service::ShortlistError;
use super::store::{ShortlistReader, ShortlistStore, StoreError};

/// Label fragments recognized as ranking rules, matched case-insensitively.
const RECOGNIZED_RULES: &[(&str, f64)] = &[("top 4%", 0.04), ("top 8%", 0.08)];

/// Ranking rule derived from a criterion label when the row is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriterionRule {
    /// Qualify applicants whose percentile rank is at most `fraction`.
    TopPercent { fraction: f64 },
    /// Label matched no known rule; selects nobody.
    Unrecognized,
}

impl CriterionRule {
    pub fn from_label(label: &str) -> Self {
        let normalized = normalize_name(label);
        RECOGNIZED_RULES
            .iter()
            .find(|(fragment, _)| normalized.contains(fragment))
            .map(|(_, fraction)| Self::TopPercent {
                fraction: *fraction,
            })
            .unwrap_or(Self::Unrecognized)
    }

    pub fn threshold(&self) -> Option<f64> {
        match self {
            Self::TopPercent { fraction } => Some(*fraction),
            Self::Unrecognized => None,
        }
    }
}

/// Shortlisting criterion with its rule resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub name: String,
    pub rule: CriterionRule,
}

impl Criterion {
    pub fn new(id: CriterionId, name: impl Into<String>) -> Self {
        let name = name.into();
        let rule = CriterionRule::from_label(&name);
        Self { id, name, rule }
    }

    pub fn summary(&self) -> CriterionSummary {
        CriterionSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionSummary {
    pub id: CriterionId,
    pub name: String,
}

/// Read-only view over `shortlisting_criteria`.
pub struct CriteriaCatalog<S> {
    store: Arc<S>,
}

impl<S> CriteriaCatalog<S>
where
    S: ShortlistStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn list_criteria(&self) -> Result<Vec<CriterionSummary>, StoreError> {
        let criteria = self.store.read(|reader| reader.criteria())?;
        debug!(count = criteria.len(), "loaded shortlisting criteria");
        Ok(criteria.iter().map(Criterion::summary).collect())
    }

    pub fn resolve_criterion(&self, id: CriterionId) -> Result<Criterion, ShortlistError> {
        self.store.read(|reader| resolve_within(reader, id))
    }
}

/// Resolves a criterion against an open reader so the lookup shares its transaction.
pub(crate) fn resolve_within<R>(reader: &mut R, id: CriterionId) -> Result<Criterion, ShortlistError>
where
    R: ShortlistReader + ?Sized,
{
    reader
        .criterion(id)?
        .ok_or(ShortlistError::UnknownCriterion(id))
}
