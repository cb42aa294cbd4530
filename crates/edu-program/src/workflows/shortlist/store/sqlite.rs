use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use super::schema;
use super::{
    Deadline, ReferenceDataSink, ShortlistReader, ShortlistStore, ShortlistUnitOfWork, StoreError,
};
use crate::workflows::shortlist::criteria::Criterion;
use crate::workflows::shortlist::domain::{
    Applicant, ApplicantId, ApplicantRecord, BlockClaim, ClaimStatus, CriterionId, Jurisdiction,
    JurisdictionCode, JurisdictionKind, NewShortlistBatch, ShortlistBatch, ShortlistBatchId,
};

const IN_MEMORY_PATH: &str = ":memory:";

/// SQLite-backed store. One connection is shared behind a mutex; write transactions use
/// `BEGIN IMMEDIATE` so the conflict check and the writes hold the write lock together.
pub struct SqliteShortlistStore {
    connection: Mutex<Connection>,
    transaction_timeout: Duration,
}

impl SqliteShortlistStore {
    pub fn open<P: AsRef<Path>>(path: P, transaction_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file_backed = path != Path::new(IN_MEMORY_PATH);
        let connection = Connection::open(path)?;
        debug!(path = %path.display(), file_backed, "opened shortlist store");
        Self::initialize(connection, transaction_timeout, file_backed)
    }

    pub fn open_in_memory(transaction_timeout: Duration) -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()?;
        Self::initialize(connection, transaction_timeout, false)
    }

    fn initialize(
        connection: Connection,
        transaction_timeout: Duration,
        file_backed: bool,
    ) -> Result<Self, StoreError> {
        connection.busy_timeout(transaction_timeout)?;
        schema::configure_connection(&connection, file_backed)?;
        schema::ensure_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            transaction_timeout,
        })
    }

    pub fn transaction_timeout(&self) -> Duration {
        self.transaction_timeout
    }

    /// Direct connection access for maintenance tasks outside the workflow.
    pub fn with_connection<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let connection = self.lock()?;
        Ok(work(&*connection)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }
}

impl ShortlistStore for SqliteShortlistStore {
    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ShortlistReader) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut connection = self.lock()?;
        let tx = connection.transaction().map_err(StoreError::from)?;
        let mut session = SqliteSession {
            connection: &tx,
            deadline: Deadline::start(self.transaction_timeout),
        };
        work(&mut session)
    }

    fn transact<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ShortlistUnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut connection = self.lock()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let deadline = Deadline::start(self.transaction_timeout);

        let outcome = {
            let mut session = SqliteSession {
                connection: &tx,
                deadline,
            };
            work(&mut session).and_then(|value| {
                deadline.check()?;
                Ok(value)
            })
        };

        match outcome {
            Ok(value) => {
                tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback failed; connection drop will discard the transaction");
                }
                Err(err)
            }
        }
    }
}

impl ReferenceDataSink for SqliteShortlistStore {
    fn load_jurisdictions(&self, rows: &[Jurisdiction]) -> Result<usize, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut statement = tx.prepare(
                "
                INSERT INTO jurisdiction(code, name, kind, parent_code)
                VALUES(?1, ?2, ?3, ?4)
                ON CONFLICT(code) DO UPDATE SET
                  name=excluded.name,
                  kind=excluded.kind,
                  parent_code=excluded.parent_code
                ",
            )?;
            for row in rows {
                statement.execute(params![
                    &row.code.0,
                    &row.name,
                    row.kind.label(),
                    row.parent_code.as_ref().map(|code| code.0.as_str()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn load_criteria(&self, rows: &[Criterion]) -> Result<usize, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut statement = tx.prepare(
                "
                INSERT INTO shortlisting_criteria(id, name)
                VALUES(?1, ?2)
                ON CONFLICT(id) DO UPDATE SET name=excluded.name
                ",
            )?;
            for row in rows {
                statement.execute(params![row.id.0, &row.name])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn load_applicants(&self, rows: &[Applicant]) -> Result<usize, StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut statement = tx.prepare(
                "
                INSERT INTO applicant_primary_info(
                  applicant_id, year, state_code, district_code, block_code, score_a, score_b
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(applicant_id) DO UPDATE SET
                  year=excluded.year,
                  state_code=excluded.state_code,
                  district_code=excluded.district_code,
                  block_code=excluded.block_code,
                  score_a=excluded.score_a,
                  score_b=excluded.score_b
                ",
            )?;
            for row in rows {
                statement.execute(params![
                    &row.applicant_id.0,
                    row.year,
                    &row.state_code.0,
                    &row.district_code.0,
                    &row.block_code.0,
                    row.score_a,
                    row.score_b,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }
}

struct SqliteSession<'c> {
    connection: &'c Connection,
    deadline: Deadline,
}

impl SqliteSession<'_> {
    fn load_batches(&self, only: Option<ShortlistBatchId>) -> Result<Vec<ShortlistBatch>, StoreError> {
        let mut statement = self.connection.prepare_cached(
            "
            SELECT id, name, description, criterion_id, frozen_yn, created_at
            FROM shortlist_batch
            WHERE ?1 IS NULL OR id = ?1
            ORDER BY id
            ",
        )?;
        let rows = statement.query_map(params![only.map(|id| id.0)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, DateTime<Utc>>(5)?,
            ))
        })?;
        let raw = rows.collect::<Result<Vec<_>, _>>()?;

        let mut scope = self.connection.prepare_cached(
            "
            SELECT shortlist_batch_id, juris_code
            FROM shortlist_batch_jurisdiction
            WHERE ?1 IS NULL OR shortlist_batch_id = ?1
            ORDER BY shortlist_batch_id, juris_code
            ",
        )?;
        let scope_rows = scope.query_map(params![only.map(|id| id.0)], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut blocks: BTreeMap<i64, Vec<JurisdictionCode>> = BTreeMap::new();
        for entry in scope_rows {
            let (batch_id, code) = entry?;
            blocks.entry(batch_id).or_default().push(JurisdictionCode(code));
        }

        raw.into_iter()
            .map(|(id, name, description, criterion_id, frozen, created_at)| {
                Ok(ShortlistBatch {
                    id: ShortlistBatchId(id),
                    name,
                    description,
                    criterion_id: CriterionId(criterion_id),
                    frozen: parse_flag("shortlist_batch", &frozen)?,
                    created_at,
                    blocks: blocks.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }
}

impl ShortlistReader for SqliteSession<'_> {
    fn jurisdictions(&mut self) -> Result<Vec<Jurisdiction>, StoreError> {
        self.deadline.check()?;
        let mut statement = self.connection.prepare_cached(
            "SELECT code, name, kind, parent_code FROM jurisdiction ORDER BY name, code",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(Jurisdiction {
                code: JurisdictionCode(row.get(0)?),
                name: row.get(1)?,
                kind: JurisdictionKind::parse(&row.get::<_, String>(2)?),
                parent_code: row.get::<_, Option<String>>(3)?.map(JurisdictionCode),
            })
        })?;
        let jurisdictions = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(jurisdictions)
    }

    fn criteria(&mut self) -> Result<Vec<Criterion>, StoreError> {
        self.deadline.check()?;
        let mut statement = self
            .connection
            .prepare_cached("SELECT id, name FROM shortlisting_criteria ORDER BY id")?;
        let rows = statement.query_map([], |row| {
            Ok(Criterion::new(
                CriterionId(row.get(0)?),
                row.get::<_, String>(1)?,
            ))
        })?;
        let criteria = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(criteria)
    }

    fn criterion(&mut self, id: CriterionId) -> Result<Option<Criterion>, StoreError> {
        self.deadline.check()?;
        let criterion = self
            .connection
            .query_row(
                "SELECT id, name FROM shortlisting_criteria WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(Criterion::new(
                        CriterionId(row.get(0)?),
                        row.get::<_, String>(1)?,
                    ))
                },
            )
            .optional()?;
        Ok(criterion)
    }

    fn claims(&mut self, status: ClaimStatus) -> Result<Vec<BlockClaim>, StoreError> {
        self.deadline.check()?;
        let mut statement = self.connection.prepare_cached(
            "
            SELECT sbj.juris_code, block.name, sb.id, sb.name
            FROM shortlist_batch_jurisdiction AS sbj
            JOIN jurisdiction AS block ON sbj.juris_code = block.code
            JOIN shortlist_batch AS sb ON sbj.shortlist_batch_id = sb.id
            WHERE sb.frozen_yn = ?1
            ORDER BY block.name, sb.id
            ",
        )?;
        let rows = statement.query_map(params![status.frozen_flag()], |row| {
            Ok(BlockClaim {
                block_code: JurisdictionCode(row.get(0)?),
                block_name: row.get(1)?,
                batch_id: ShortlistBatchId(row.get(2)?),
                batch_name: row.get(3)?,
            })
        })?;
        let claims = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(claims)
    }

    fn applicants_for_year(&mut self, year: i32) -> Result<Vec<ApplicantRecord>, StoreError> {
        self.deadline.check()?;
        let mut statement = self.connection.prepare_cached(
            "
            SELECT api.applicant_id, api.year, state.name, district.name, block.name,
                   api.score_a, api.score_b
            FROM applicant_primary_info AS api
            LEFT JOIN jurisdiction AS state ON api.state_code = state.code
            LEFT JOIN jurisdiction AS district ON api.district_code = district.code
            LEFT JOIN jurisdiction AS block ON api.block_code = block.code
            WHERE api.year = ?1
            ORDER BY api.rowid
            ",
        )?;
        let rows = statement.query_map(params![year], |row| {
            Ok(ApplicantRecord {
                applicant_id: ApplicantId(row.get(0)?),
                year: row.get(1)?,
                state_name: row.get(2)?,
                district_name: row.get(3)?,
                block_name: row.get(4)?,
                score_a: row.get(5)?,
                score_b: row.get(6)?,
            })
        })?;
        let applicants = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(applicants)
    }

    fn shortlisted_block_names(&mut self, year: i32) -> Result<Vec<Option<String>>, StoreError> {
        self.deadline.check()?;
        let mut statement = self.connection.prepare_cached(
            "
            SELECT block.name
            FROM shortlist_info AS si
            JOIN applicant_primary_info AS api ON si.applicant_id = api.applicant_id
            LEFT JOIN jurisdiction AS block ON api.block_code = block.code
            WHERE api.year = ?1
            ",
        )?;
        let rows = statement.query_map(params![year], |row| row.get::<_, Option<String>>(0))?;
        let names = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn batches(&mut self) -> Result<Vec<ShortlistBatch>, StoreError> {
        self.deadline.check()?;
        self.load_batches(None)
    }

    fn batch(&mut self, id: ShortlistBatchId) -> Result<Option<ShortlistBatch>, StoreError> {
        self.deadline.check()?;
        Ok(self.load_batches(Some(id))?.into_iter().next())
    }
}

impl ShortlistUnitOfWork for SqliteSession<'_> {
    fn insert_batch(&mut self, batch: &NewShortlistBatch) -> Result<ShortlistBatchId, StoreError> {
        self.deadline.check()?;
        self.connection.execute(
            "
            INSERT INTO shortlist_batch(name, description, criterion_id, frozen_yn, created_at)
            VALUES(?1, ?2, ?3, 'N', ?4)
            ",
            params![
                &batch.name,
                &batch.description,
                batch.criterion_id.0,
                batch.created_at
            ],
        )?;
        Ok(ShortlistBatchId(self.connection.last_insert_rowid()))
    }

    fn insert_batch_jurisdiction(
        &mut self,
        batch_id: ShortlistBatchId,
        code: &JurisdictionCode,
    ) -> Result<(), StoreError> {
        self.deadline.check()?;
        self.connection.execute(
            "INSERT INTO shortlist_batch_jurisdiction(shortlist_batch_id, juris_code) VALUES(?1, ?2)",
            params![batch_id.0, &code.0],
        )?;
        Ok(())
    }

    fn insert_shortlist_info(
        &mut self,
        batch_id: ShortlistBatchId,
        applicant_id: &ApplicantId,
    ) -> Result<(), StoreError> {
        self.deadline.check()?;
        self.connection.execute(
            "INSERT INTO shortlist_info(applicant_id, shortlisted_yn, shortlist_batch_id) VALUES(?1, 'Y', ?2)",
            params![&applicant_id.0, batch_id.0],
        )?;
        Ok(())
    }

    fn set_frozen(&mut self, batch_id: ShortlistBatchId, frozen: bool) -> Result<(), StoreError> {
        self.deadline.check()?;
        let flag = if frozen { "Y" } else { "N" };
        self.connection.execute(
            "UPDATE shortlist_batch SET frozen_yn = ?1 WHERE id = ?2",
            params![flag, batch_id.0],
        )?;
        Ok(())
    }

    fn delete_batch(&mut self, batch_id: ShortlistBatchId) -> Result<(), StoreError> {
        self.deadline.check()?;
        self.connection.execute(
            "DELETE FROM shortlist_info WHERE shortlist_batch_id = ?1",
            params![batch_id.0],
        )?;
        self.connection.execute(
            "DELETE FROM shortlist_batch_jurisdiction WHERE shortlist_batch_id = ?1",
            params![batch_id.0],
        )?;
        self.connection.execute(
            "DELETE FROM shortlist_batch WHERE id = ?1",
            params![batch_id.0],
        )?;
        Ok(())
    }
}

fn parse_flag(table: &'static str, raw: &str) -> Result<bool, StoreError> {
    match raw {
        "Y" => Ok(true),
        "N" => Ok(false),
        other => Err(StoreError::CorruptRow {
            table,
            detail: format!("unexpected flag value '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteShortlistStore {
        SqliteShortlistStore::open_in_memory(Duration::from_secs(5)).expect("in-memory store")
    }

    fn batch_row(name: &str) -> NewShortlistBatch {
        NewShortlistBatch {
            name: name.to_string(),
            description: "fixture".to_string(),
            criterion_id: CriterionId(1),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn transact_commits_on_ok() {
        let store = store();
        let id = store
            .transact::<_, StoreError, _>(|uow| uow.insert_batch(&batch_row("kept")))
            .expect("insert commits");

        let stored = store
            .read::<_, StoreError, _>(|reader| reader.batch(id))
            .expect("read succeeds")
            .expect("batch present");
        assert_eq!(stored.name, "kept");
        assert!(!stored.frozen);
    }

    #[test]
    fn transact_rolls_back_on_err() {
        let store = store();
        let result = store.transact::<(), StoreError, _>(|uow| {
            uow.insert_batch(&batch_row("discarded"))?;
            Err(StoreError::Unavailable("forced".to_string()))
        });
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        let batches = store
            .read::<_, StoreError, _>(|reader| reader.batches())
            .expect("read succeeds");
        assert!(batches.is_empty());
    }

    #[test]
    fn expired_deadline_rolls_back() {
        let store = SqliteShortlistStore::open_in_memory(Duration::ZERO).expect("store");
        let result = store.transact::<(), StoreError, _>(|uow| {
            std::thread::sleep(Duration::from_millis(2));
            uow.insert_batch(&batch_row("late"))?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::TimedOut(_))));
    }

    #[test]
    fn corrupt_flag_is_reported() {
        assert!(parse_flag("shortlist_batch", "Y").expect("valid"));
        assert!(matches!(
            parse_flag("shortlist_batch", "maybe"),
            Err(StoreError::CorruptRow { .. })
        ));
    }

    #[test]
    fn jurisdiction_kinds_round_trip_through_labels() {
        let store = store();
        store
            .load_jurisdictions(&[
                Jurisdiction {
                    code: JurisdictionCode("B1".to_string()),
                    name: "Alpha Block".to_string(),
                    kind: JurisdictionKind::Block,
                    parent_code: Some(JurisdictionCode("D1".to_string())),
                },
                Jurisdiction {
                    code: JurisdictionCode("D1".to_string()),
                    name: "DistX".to_string(),
                    kind: JurisdictionKind::EducationDistrict,
                    parent_code: None,
                },
            ])
            .expect("child before parent is accepted");

        let all = store
            .read::<_, StoreError, _>(|reader| reader.jurisdictions())
            .expect("read");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, JurisdictionKind::Block);
        assert_eq!(all[1].kind, JurisdictionKind::EducationDistrict);
    }
}
