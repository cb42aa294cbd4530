use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::conflicts::{describe_conflicts, find_conflicts};
use super::criteria::{
    resolve_within, CriteriaCatalog, Criterion, CriterionRule, CriterionSummary,
};
use super::directory::JurisdictionDirectory;
use super::domain::{
    normalize_name, BlockConflict, BlockSelection, BlockSummary, CriterionId, Jurisdiction,
    JurisdictionCode, JurisdictionKind, JurisdictionSummary, NewShortlistBatch, ShortlistBatch,
    ShortlistBatchId, ShortlistOutcome, ShortlistRequest,
};
use super::query::ShortlistQueryService;
use super::ranking::{select_applicants, BlockScope};
use super::store::{ShortlistStore, ShortlistUnitOfWork, StoreError};

/// Facade composing the directory, catalog, ranking and persistence of shortlist batches.
pub struct ShortlistService<S> {
    store: Arc<S>,
    directory: JurisdictionDirectory<S>,
    catalog: CriteriaCatalog<S>,
    query: ShortlistQueryService<S>,
}

impl<S> ShortlistService<S>
where
    S: ShortlistStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            directory: JurisdictionDirectory::new(store.clone()),
            catalog: CriteriaCatalog::new(store.clone()),
            query: ShortlistQueryService::new(store.clone()),
            store,
        }
    }

    /// Create a batch, claim its blocks and persist the selected applicants atomically.
    ///
    /// The conflict check runs inside the same transaction as the writes, so a request
    /// that loses a race for a block fails with `BlocksAlreadyShortlisted`.
    pub fn create_shortlist_batch(
        &self,
        request: ShortlistRequest,
    ) -> Result<ShortlistOutcome, ShortlistError> {
        info!(
            name = %request.name,
            criterion_id = %request.criterion_id,
            blocks = request.block_names.len(),
            year = request.year,
            "creating shortlist batch"
        );

        let (block_names, duplicate_blocks) = distinct_block_names(&request.block_names);
        if !duplicate_blocks.is_empty() {
            warn!(
                duplicates = %duplicate_blocks.join(", "),
                "repeated block names dropped from request"
            );
        }
        let outcome = self
            .store
            .transact(|uow| create_within(uow, &request, &block_names))
            .map(|outcome| ShortlistOutcome {
                duplicate_blocks,
                ..outcome
            });

        match &outcome {
            Ok(outcome) => info!(
                batch_id = %outcome.batch_id,
                shortlisted = outcome.shortlisted_count,
                skipped = outcome.skipped_blocks.len(),
                "shortlist batch committed"
            ),
            Err(err) => warn!(error = %err, name = %request.name, "shortlist batch rolled back"),
        }
        outcome
    }

    pub fn all_states(&self) -> Result<Vec<JurisdictionSummary>, ShortlistError> {
        Ok(self.directory.list_states()?)
    }

    pub fn districts_by_state(
        &self,
        state_name: &str,
    ) -> Result<Vec<JurisdictionSummary>, ShortlistError> {
        Ok(self.directory.list_districts(state_name)?)
    }

    pub fn blocks_by_district(&self, district_name: &str) -> Result<Vec<BlockSummary>, ShortlistError> {
        Ok(self.directory.list_blocks(district_name)?)
    }

    pub fn criteria(&self) -> Result<Vec<CriterionSummary>, ShortlistError> {
        Ok(self.catalog.list_criteria()?)
    }

    pub fn resolve_criterion(&self, id: CriterionId) -> Result<Criterion, ShortlistError> {
        self.catalog.resolve_criterion(id)
    }

    pub fn shortlisted_count_for_blocks_and_year(
        &self,
        block_names: &[String],
        year: i32,
    ) -> Result<u64, ShortlistError> {
        Ok(self.query.count_shortlisted(block_names, year)?)
    }

    pub fn list_batches(&self) -> Result<Vec<ShortlistBatch>, ShortlistError> {
        Ok(self.store.read(|reader| reader.batches())?)
    }

    /// Mark a batch frozen so its blocks can be claimed again. Freezing twice is a no-op.
    pub fn freeze_batch(&self, batch_id: ShortlistBatchId) -> Result<ShortlistBatch, ShortlistError> {
        let batch = self.store.transact(|uow| -> Result<ShortlistBatch, ShortlistError> {
            let mut batch = uow
                .batch(batch_id)?
                .ok_or(ShortlistError::BatchNotFound(batch_id))?;
            if !batch.frozen {
                uow.set_frozen(batch_id, true)?;
                batch.frozen = true;
            }
            Ok(batch)
        })?;
        info!(batch_id = %batch_id, "shortlist batch frozen");
        Ok(batch)
    }

    /// Delete an active batch together with its scope and the selections it recorded.
    pub fn discard_batch(&self, batch_id: ShortlistBatchId) -> Result<(), ShortlistError> {
        self.store.transact(|uow| -> Result<(), ShortlistError> {
            let batch = uow
                .batch(batch_id)?
                .ok_or(ShortlistError::BatchNotFound(batch_id))?;
            if batch.frozen {
                return Err(ShortlistError::BatchFrozen(batch_id));
            }
            uow.delete_batch(batch_id)?;
            Ok(())
        })?;
        info!(batch_id = %batch_id, "shortlist batch discarded");
        Ok(())
    }
}

fn create_within(
    uow: &mut dyn ShortlistUnitOfWork,
    request: &ShortlistRequest,
    block_names: &[String],
) -> Result<ShortlistOutcome, ShortlistError> {
    let conflicts = find_conflicts(uow, block_names)?;
    if !conflicts.is_empty() {
        return Err(ShortlistError::BlocksAlreadyShortlisted { conflicts });
    }

    let batch_id = uow.insert_batch(&NewShortlistBatch {
        name: request.name.clone(),
        description: request.description.clone(),
        criterion_id: request.criterion_id,
        created_at: Utc::now(),
    })?;

    let directory = uow.jurisdictions()?;
    let mut blocks = Vec::with_capacity(block_names.len());
    let mut skipped_blocks = Vec::new();
    for block_name in block_names {
        let claimed_codes = block_codes_named(&directory, block_name);
        if claimed_codes.is_empty() {
            warn!(block = %block_name, "block name matched no jurisdiction; scope row skipped");
            skipped_blocks.push(block_name.clone());
        }
        for code in &claimed_codes {
            uow.insert_batch_jurisdiction(batch_id, code)?;
        }
        blocks.push(BlockSelection {
            block_name: block_name.clone(),
            claimed_codes,
            selected: Vec::new(),
        });
    }

    let criterion = resolve_within(uow, request.criterion_id)?;
    if criterion.rule == CriterionRule::Unrecognized {
        warn!(
            criterion = %criterion.name,
            "criterion label matches no ranking rule; no applicants selected"
        );
    }

    let mut shortlisted_count = 0;
    for block in &mut blocks {
        let scope = BlockScope::new(&request.state_name, &request.district_name, &block.block_name);
        let selected = select_applicants(uow, &scope, request.year, criterion.rule)?;
        for applicant_id in &selected {
            uow.insert_shortlist_info(batch_id, applicant_id)?;
        }
        info!(
            block = %block.block_name,
            selected = selected.len(),
            criterion = %criterion.name,
            "selected applicants for block"
        );
        shortlisted_count += selected.len();
        block.selected = selected;
    }

    Ok(ShortlistOutcome {
        batch_id,
        shortlisted_count,
        criterion_rule: criterion.rule,
        skipped_blocks,
        duplicate_blocks: Vec::new(),
        blocks,
    })
}

/// Trims candidate names and splits them into first spellings and dropped repeats.
fn distinct_block_names(raw: &[String]) -> (Vec<String>, Vec<String>) {
    let mut seen = BTreeSet::new();
    let mut distinct = Vec::new();
    let mut duplicates = Vec::new();
    for name in raw.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
        if seen.insert(normalize_name(name)) {
            distinct.push(name.to_string());
        } else {
            duplicates.push(name.to_string());
        }
    }
    (distinct, duplicates)
}

fn block_codes_named(directory: &[Jurisdiction], block_name: &str) -> Vec<JurisdictionCode> {
    let normalized = normalize_name(block_name);
    directory
        .iter()
        .filter(|jurisdiction| jurisdiction.kind == JurisdictionKind::Block)
        .filter(|jurisdiction| jurisdiction.name_matches(&normalized))
        .map(|jurisdiction| jurisdiction.code.clone())
        .collect()
}

/// Error raised by the shortlisting service.
#[derive(Debug, thiserror::Error)]
pub enum ShortlistError {
    #[error("{}", describe_conflicts(.conflicts))]
    BlocksAlreadyShortlisted { conflicts: Vec<BlockConflict> },
    #[error("unsupported shortlisting criterion {0}")]
    UnknownCriterion(CriterionId),
    #[error("shortlist batch {0} not found")]
    BatchNotFound(ShortlistBatchId),
    #[error("shortlist batch {0} is frozen and cannot be changed")]
    BatchFrozen(ShortlistBatchId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_block_names_trims_and_dedupes() {
        let raw = vec![
            " Alpha Block ".to_string(),
            "alpha block".to_string(),
            "".to_string(),
            "Beta Block".to_string(),
        ];
        let (distinct, duplicates) = distinct_block_names(&raw);
        assert_eq!(
            distinct,
            vec!["Alpha Block".to_string(), "Beta Block".to_string()]
        );
        assert_eq!(duplicates, vec!["alpha block".to_string()]);
    }

    #[test]
    fn conflict_message_lists_block_and_batch() {
        let err = ShortlistError::BlocksAlreadyShortlisted {
            conflicts: vec![BlockConflict {
                block_name: "Alpha Block".to_string(),
                batch_name: "2024 Pilot".to_string(),
            }],
        };
        let message = err.to_string();
        assert!(message.contains("Alpha Block (2024 Pilot)"), "{message}");
    }
}
