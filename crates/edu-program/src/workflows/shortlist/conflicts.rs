use std::collections::BTreeSet;

use super::domain::{normalize_name, BlockConflict, ClaimStatus, JurisdictionCode};
use super::store::{ShortlistReader, StoreError};

/// Candidate blocks already claimed by an active (non-frozen) batch.
///
/// Frozen batches are historical and never conflict.
pub(crate) fn find_conflicts<R>(
    reader: &mut R,
    candidate_block_names: &[String],
) -> Result<Vec<BlockConflict>, StoreError>
where
    R: ShortlistReader + ?Sized,
{
    let candidates: BTreeSet<String> = candidate_block_names
        .iter()
        .map(|name| normalize_name(name))
        .collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let conflicts = reader
        .claims(ClaimStatus::Active)?
        .into_iter()
        .filter(|claim| candidates.contains(&normalize_name(&claim.block_name)))
        .map(|claim| BlockConflict {
            block_name: claim.block_name,
            batch_name: claim.batch_name,
        })
        .collect();
    Ok(conflicts)
}

/// Codes of blocks held by at least one frozen batch.
pub(crate) fn frozen_block_codes<R>(reader: &mut R) -> Result<BTreeSet<JurisdictionCode>, StoreError>
where
    R: ShortlistReader + ?Sized,
{
    Ok(reader
        .claims(ClaimStatus::Frozen)?
        .into_iter()
        .map(|claim| claim.block_code)
        .collect())
}

pub(crate) fn describe_conflicts(conflicts: &[BlockConflict]) -> String {
    let listing = conflicts
        .iter()
        .map(|conflict| format!("{} ({})", conflict.block_name, conflict.batch_name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("shortlists already exist for blocks: {listing}; freeze or discard them first")
}
