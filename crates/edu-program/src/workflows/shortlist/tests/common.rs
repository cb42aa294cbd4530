use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use serde_json::Value;

use crate::workflows::shortlist::criteria::Criterion;
use crate::workflows::shortlist::domain::{
    Applicant, ApplicantId, CriterionId, Jurisdiction, JurisdictionCode, JurisdictionKind,
    ShortlistRequest,
};
use crate::workflows::shortlist::store::{ReferenceDataSink, SqliteShortlistStore};
use crate::workflows::shortlist::{shortlist_router, ShortlistService};

pub(super) const YEAR: i32 = 2024;
pub(super) const TOP_FOUR: CriterionId = CriterionId(1);
pub(super) const TOP_EIGHT: CriterionId = CriterionId(2);
pub(super) const INTERVIEW_PANEL: CriterionId = CriterionId(3);

fn node(code: &str, name: &str, kind: JurisdictionKind, parent: Option<&str>) -> Jurisdiction {
    Jurisdiction {
        code: JurisdictionCode(code.to_string()),
        name: name.to_string(),
        kind,
        parent_code: parent.map(|code| JurisdictionCode(code.to_string())),
    }
}

/// StateX holds DistX (Alpha Block, Beta Block) and DistY (Gamma Block).
pub(super) fn seeded_store() -> Arc<SqliteShortlistStore> {
    let store =
        SqliteShortlistStore::open_in_memory(Duration::from_secs(5)).expect("in-memory store");
    store
        .load_jurisdictions(&[
            node("S1", "StateX", JurisdictionKind::State, None),
            node("D1", "DistX", JurisdictionKind::EducationDistrict, Some("S1")),
            node("D2", "DistY", JurisdictionKind::EducationDistrict, Some("S1")),
            node(
                "R1",
                "Revenue Circle",
                JurisdictionKind::Other("REVENUE DISTRICT".to_string()),
                Some("S1"),
            ),
            node("B1", "Alpha Block", JurisdictionKind::Block, Some("D1")),
            node("B2", "Beta Block", JurisdictionKind::Block, Some("D1")),
            node("B3", "Gamma Block", JurisdictionKind::Block, Some("D2")),
        ])
        .expect("jurisdictions load");
    store
        .load_criteria(&[
            Criterion::new(TOP_FOUR, "Top 4% (Weighted)"),
            Criterion::new(TOP_EIGHT, "Top 8% (Weighted)"),
            Criterion::new(INTERVIEW_PANEL, "Interview Panel"),
        ])
        .expect("criteria load");
    Arc::new(store)
}

/// Adds `count` applicants to `block_code` with weighted scores `offset + 1 ..= offset + count`.
pub(super) fn seed_cohort(
    store: &SqliteShortlistStore,
    block_code: &str,
    prefix: &str,
    count: usize,
    offset: f64,
    year: i32,
) {
    let district = if block_code == "B3" { "D2" } else { "D1" };
    let applicants: Vec<Applicant> = (1..=count)
        .map(|index| {
            let score = offset + index as f64;
            Applicant {
                applicant_id: ApplicantId(format!("{prefix}-{index:03}")),
                year,
                state_code: JurisdictionCode("S1".to_string()),
                district_code: JurisdictionCode(district.to_string()),
                block_code: JurisdictionCode(block_code.to_string()),
                score_a: score,
                score_b: score,
            }
        })
        .collect();
    store.load_applicants(&applicants).expect("applicants load");
}

pub(super) fn build_service() -> (Arc<SqliteShortlistStore>, ShortlistService<SqliteShortlistStore>) {
    let store = seeded_store();
    seed_cohort(&store, "B1", "alpha", 100, 0.0, YEAR);
    let service = ShortlistService::new(store.clone());
    (store, service)
}

pub(super) fn request(name: &str, block_names: &[&str], criterion_id: CriterionId) -> ShortlistRequest {
    ShortlistRequest {
        name: name.to_string(),
        description: format!("{name} fixture"),
        criterion_id,
        block_names: block_names.iter().map(|name| name.to_string()).collect(),
        state_name: "StateX".to_string(),
        district_name: "DistX".to_string(),
        year: YEAR,
    }
}

pub(super) fn pilot_request() -> ShortlistRequest {
    request("2024 Pilot", &["Alpha Block"], TOP_FOUR)
}

pub(super) fn row_count(store: &SqliteShortlistStore, table: &str) -> i64 {
    store
        .with_connection(|connection| {
            connection.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        })
        .expect("count query")
}

pub(super) fn assert_untouched(store: &SqliteShortlistStore) {
    assert_eq!(row_count(store, "shortlist_batch"), 0);
    assert_eq!(row_count(store, "shortlist_batch_jurisdiction"), 0);
    assert_eq!(row_count(store, "shortlist_info"), 0);
}

/// Makes the insert of `applicant_id` into `shortlist_info` abort mid-transaction.
pub(super) fn fail_selection_of(store: &SqliteShortlistStore, applicant_id: &str) {
    store
        .with_connection(|connection| {
            connection.execute_batch(&format!(
                "CREATE TRIGGER fail_selection BEFORE INSERT ON shortlist_info
                 WHEN NEW.applicant_id = '{applicant_id}'
                 BEGIN SELECT RAISE(ABORT, 'injected selection failure'); END;"
            ))
        })
        .expect("trigger installs");
}

pub(super) fn clear_selection_failure(store: &SqliteShortlistStore) {
    store
        .with_connection(|connection| connection.execute_batch("DROP TRIGGER fail_selection;"))
        .expect("trigger drops");
}

pub(super) fn selected_ids(ids: &[ApplicantId]) -> Vec<&str> {
    ids.iter().map(|id| id.0.as_str()).collect()
}

pub(super) fn router_with_service(
    service: ShortlistService<SqliteShortlistStore>,
) -> axum::Router {
    shortlist_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body bytes");
    serde_json::from_slice(&body).expect("json body")
}
