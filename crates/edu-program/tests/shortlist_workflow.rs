use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use edu_program::workflows::shortlist::{
    shortlist_router, CriterionId, ReferenceDataImporter, ShortlistError, ShortlistRequest,
    ShortlistService, SqliteShortlistStore,
};
use tower::ServiceExt;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

/// 60 applicants per block of DistX and DistY, all with distinct scores.
fn applicants_csv(year: i32) -> String {
    let mut csv = String::from("applicant_id,year,state_code,district_code,block_code,score_a,score_b\n");
    let blocks = [("D01", "B01"), ("D01", "B02"), ("D02", "B03"), ("D02", "B04")];
    for (block_index, (district, block)) in blocks.iter().enumerate() {
        for index in 0..60 {
            let score = (index * blocks.len() + block_index) as f64;
            csv.push_str(&format!(
                "{block}-{index:02},{year},S01,{district},{block},{score},{score}\n"
            ));
        }
    }
    csv
}

fn seed(store: &SqliteShortlistStore) {
    ReferenceDataImporter::jurisdictions_from_path(fixture("jurisdictions.csv"), store)
        .expect("jurisdictions");
    ReferenceDataImporter::criteria_from_path(fixture("criteria.csv"), store).expect("criteria");
    ReferenceDataImporter::applicants_from_reader(applicants_csv(2024).as_bytes(), store)
        .expect("applicants");
}

fn request(name: &str, district: &str, blocks: &[&str]) -> ShortlistRequest {
    ShortlistRequest {
        name: name.to_string(),
        description: String::new(),
        criterion_id: CriterionId(2),
        block_names: blocks.iter().map(|block| block.to_string()).collect(),
        state_name: "StateX".to_string(),
        district_name: district.to_string(),
        year: 2024,
    }
}

struct TempDatabase(PathBuf);

impl TempDatabase {
    fn new(label: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        Self(std::env::temp_dir().join(format!(
            "edu-program-{label}-{}-{nanos}.db",
            std::process::id()
        )))
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

#[test]
fn end_to_end_batch_lifecycle_on_imported_data() {
    let store = Arc::new(
        SqliteShortlistStore::open_in_memory(Duration::from_secs(5)).expect("store"),
    );
    seed(&store);
    let service = ShortlistService::new(store);

    // 240 applicants, threshold 0.08: ranks 0..=19 qualify, five per block.
    let outcome = service
        .create_shortlist_batch(request("Spring intake", "DistX", &["Alpha Block", "Beta Block"]))
        .expect("batch created");
    assert_eq!(outcome.shortlisted_count, 10);
    assert!(outcome.blocks.iter().all(|block| block.selected.len() == 5));

    let count = service
        .shortlisted_count_for_blocks_and_year(
            &["Alpha Block".to_string(), "Beta Block".to_string()],
            2024,
        )
        .expect("count");
    assert_eq!(count, 10);

    let err = service
        .create_shortlist_batch(request("Overlap", "DistX", &["Beta Block"]))
        .expect_err("beta is claimed");
    assert!(matches!(err, ShortlistError::BlocksAlreadyShortlisted { .. }));

    service.freeze_batch(outcome.batch_id).expect("freeze");
    let blocks = service.blocks_by_district("DistX").expect("blocks");
    assert!(blocks.iter().all(|block| block.is_frozen_block));

    service
        .create_shortlist_batch(request("Overlap", "DistX", &["Beta Block"]))
        .expect("beta released");
    assert_eq!(service.list_batches().expect("batches").len(), 2);
}

#[test]
fn overlapping_concurrent_requests_admit_exactly_one() {
    let database = TempDatabase::new("overlap");
    let first = SqliteShortlistStore::open(&database.0, Duration::from_secs(5)).expect("store");
    seed(&first);
    let second = SqliteShortlistStore::open(&database.0, Duration::from_secs(5)).expect("store");

    let services = [
        Arc::new(ShortlistService::new(Arc::new(first))),
        Arc::new(ShortlistService::new(Arc::new(second))),
    ];
    let barrier = Arc::new(Barrier::new(services.len()));

    let results: Vec<Result<_, ShortlistError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = services
            .iter()
            .enumerate()
            .map(|(index, service)| {
                let barrier = barrier.clone();
                scope.spawn(move || {
                    barrier.wait();
                    service.create_shortlist_batch(request(
                        &format!("Racer {index}"),
                        "DistX",
                        &["Alpha Block", "Beta Block"],
                    ))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect()
    });

    let admitted = results.iter().filter(|result| result.is_ok()).count();
    let conflicted = results
        .iter()
        .filter(|result| matches!(result, Err(ShortlistError::BlocksAlreadyShortlisted { .. })))
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(conflicted, 1);

    let batches = services[0].list_batches().expect("batches");
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].blocks.len(), 2);
}

#[test]
fn disjoint_concurrent_requests_both_succeed() {
    let database = TempDatabase::new("disjoint");
    let first = SqliteShortlistStore::open(&database.0, Duration::from_secs(5)).expect("store");
    seed(&first);
    let service = Arc::new(ShortlistService::new(Arc::new(first)));

    let results: Vec<Result<_, ShortlistError>> = std::thread::scope(|scope| {
        let west = scope.spawn(|| {
            service.create_shortlist_batch(request("West", "DistX", &["Alpha Block"]))
        });
        let east = scope.spawn(|| {
            service.create_shortlist_batch(request("East", "DistY", &["Gamma Block"]))
        });
        vec![
            west.join().expect("west completes"),
            east.join().expect("east completes"),
        ]
    });

    assert!(results.iter().all(Result::is_ok), "{results:?}");
    assert_eq!(service.list_batches().expect("batches").len(), 2);
}

#[tokio::test]
async fn write_waiting_on_a_held_lock_leaves_the_runtime_free() {
    let database = TempDatabase::new("held-lock");
    let store =
        SqliteShortlistStore::open(&database.0, Duration::from_millis(1_500)).expect("store");
    seed(&store);
    let router = shortlist_router(Arc::new(ShortlistService::new(Arc::new(store))));

    let holder = rusqlite::Connection::open(&database.0).expect("second connection");
    holder
        .execute_batch("BEGIN IMMEDIATE;")
        .expect("write lock taken");

    let freeze = tokio::spawn(
        router.oneshot(
            Request::post("/api/v1/shortlist/batches/1/freeze")
                .body(Body::empty())
                .expect("request"),
        ),
    );

    let started = Instant::now();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let waited = started.elapsed();
    assert!(
        waited < Duration::from_millis(500),
        "timer fired after {waited:?} while the freeze waited for the lock"
    );

    holder.execute_batch("ROLLBACK;").expect("write lock released");
    let response = freeze
        .await
        .expect("task joins")
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
