use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::conflicts::frozen_block_codes;
use super::domain::{
    normalize_name, BlockSummary, Jurisdiction, JurisdictionCode, JurisdictionKind,
    JurisdictionSummary,
};
use super::store::{ShortlistStore, StoreError};

/// Read-only lookups over the state → education district → block hierarchy.
///
/// Unknown names match nothing and yield empty listings.
pub struct JurisdictionDirectory<S> {
    store: Arc<S>,
}

impl<S> JurisdictionDirectory<S>
where
    S: ShortlistStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn list_states(&self) -> Result<Vec<JurisdictionSummary>, StoreError> {
        let all = self.store.read(|reader| reader.jurisdictions())?;
        let states: Vec<JurisdictionSummary> = all
            .iter()
            .filter(|jurisdiction| jurisdiction.kind == JurisdictionKind::State)
            .map(JurisdictionSummary::from)
            .collect();
        debug!(count = states.len(), "listed states");
        Ok(states)
    }

    pub fn list_districts(&self, state_name: &str) -> Result<Vec<JurisdictionSummary>, StoreError> {
        let all = self.store.read(|reader| reader.jurisdictions())?;
        let districts: Vec<JurisdictionSummary> = children_of(
            &all,
            state_name,
            &JurisdictionKind::State,
            &JurisdictionKind::EducationDistrict,
        )
        .map(JurisdictionSummary::from)
        .collect();
        debug!(state_name, count = districts.len(), "listed districts");
        Ok(districts)
    }

    pub fn list_blocks(&self, district_name: &str) -> Result<Vec<BlockSummary>, StoreError> {
        let (all, frozen) = self.store.read(|reader| {
            let all = reader.jurisdictions()?;
            let frozen = frozen_block_codes(reader)?;
            Ok::<_, StoreError>((all, frozen))
        })?;

        let blocks: Vec<BlockSummary> = children_of(
            &all,
            district_name,
            &JurisdictionKind::EducationDistrict,
            &JurisdictionKind::Block,
        )
        .map(|block| block_summary(block, &frozen))
        .collect();
        debug!(district_name, count = blocks.len(), "listed blocks");
        Ok(blocks)
    }
}

fn block_summary(block: &Jurisdiction, frozen: &BTreeSet<JurisdictionCode>) -> BlockSummary {
    BlockSummary {
        code: block.code.clone(),
        name: block.name.clone(),
        is_frozen_block: frozen.contains(&block.code),
    }
}

/// Jurisdictions of `child_kind` whose parent is a `parent_kind` named `parent_name`.
fn children_of<'a>(
    all: &'a [Jurisdiction],
    parent_name: &str,
    parent_kind: &JurisdictionKind,
    child_kind: &'a JurisdictionKind,
) -> impl Iterator<Item = &'a Jurisdiction> + 'a {
    let normalized = normalize_name(parent_name);
    let parents: BTreeSet<&JurisdictionCode> = all
        .iter()
        .filter(|jurisdiction| &jurisdiction.kind == parent_kind)
        .filter(|jurisdiction| jurisdiction.name_matches(&normalized))
        .map(|jurisdiction| &jurisdiction.code)
        .collect();

    all.iter().filter(move |jurisdiction| {
        &jurisdiction.kind == child_kind
            && jurisdiction
                .parent_code
                .as_ref()
                .is_some_and(|parent| parents.contains(parent))
    })
}
