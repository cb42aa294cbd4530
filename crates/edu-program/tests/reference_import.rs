use std::time::Duration;

use edu_program::workflows::shortlist::{
    ImportError, JurisdictionDirectory, ReferenceDataImporter, ShortlistStore,
    SqliteShortlistStore, StoreError,
};

fn store() -> SqliteShortlistStore {
    SqliteShortlistStore::open_in_memory(Duration::from_secs(5)).expect("in-memory store")
}

#[test]
fn imports_bundled_reference_fixtures() {
    let store = store();
    let jurisdictions = ReferenceDataImporter::jurisdictions_from_path(
        concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/jurisdictions.csv"),
        &store,
    )
    .expect("jurisdictions import");
    let criteria = ReferenceDataImporter::criteria_from_path(
        concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/criteria.csv"),
        &store,
    )
    .expect("criteria import");
    assert_eq!(jurisdictions, 8);
    assert_eq!(criteria, 3);

    let store = std::sync::Arc::new(store);
    let directory = JurisdictionDirectory::new(store.clone());
    let blocks: Vec<String> = directory
        .list_blocks("DistY")
        .expect("blocks")
        .into_iter()
        .map(|block| block.name)
        .collect();
    assert_eq!(blocks, vec!["Delta Block", "Gamma Block"]);

    let rules: Vec<Option<f64>> = store
        .read::<_, StoreError, _>(|reader| reader.criteria())
        .expect("criteria read")
        .iter()
        .map(|criterion| criterion.rule.threshold())
        .collect();
    assert_eq!(rules, vec![Some(0.04), Some(0.08), None]);
}

#[test]
fn reimport_updates_rows_in_place() {
    let store = store();
    ReferenceDataImporter::criteria_from_reader("id,name\n7,Top 4% (Weighted)\n".as_bytes(), &store)
        .expect("first import");
    ReferenceDataImporter::criteria_from_reader("id,name\n7,Top 8% (Weighted)\n".as_bytes(), &store)
        .expect("second import");

    let criteria = store
        .read::<_, StoreError, _>(|reader| reader.criteria())
        .expect("criteria read");
    assert_eq!(criteria.len(), 1);
    assert_eq!(criteria[0].rule.threshold(), Some(0.08));
}

#[test]
fn malformed_applicant_rows_are_rejected_without_partial_writes() {
    let store = store();
    let csv = "applicant_id,year,state_code,district_code,block_code,score_a,score_b\n\
A-1,2024,S01,D01,B01,71.5,60\n\
A-2,twenty,S01,D01,B01,80,55\n";

    let err = ReferenceDataImporter::applicants_from_reader(csv.as_bytes(), &store)
        .expect_err("year must be numeric");
    assert!(matches!(err, ImportError::Csv(_)));

    let loaded = store
        .read::<_, StoreError, _>(|reader| reader.applicants_for_year(2024))
        .expect("applicants read");
    assert!(loaded.is_empty());
}
