use rusqlite::Connection;

pub(super) const SCHEMA_VERSION: &str = "1";

pub(super) fn configure_connection(connection: &Connection, file_backed: bool) -> rusqlite::Result<()> {
    connection.pragma_update(None, "foreign_keys", "ON")?;
    if file_backed {
        let mode: String =
            connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(%mode, "sqlite journal mode configured");
        connection.pragma_update(None, "synchronous", "NORMAL")?;
    }
    Ok(())
}

// criterion_id carries no foreign key: an unknown criterion must surface as
// UnknownCriterion after the batch row is written, not as a constraint failure.
pub(super) fn ensure_schema(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS jurisdiction (
          code TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          kind TEXT NOT NULL,
          parent_code TEXT REFERENCES jurisdiction(code) DEFERRABLE INITIALLY DEFERRED
        );

        CREATE TABLE IF NOT EXISTS shortlisting_criteria (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS applicant_primary_info (
          applicant_id TEXT PRIMARY KEY,
          year INTEGER NOT NULL,
          state_code TEXT NOT NULL,
          district_code TEXT NOT NULL,
          block_code TEXT NOT NULL,
          score_a REAL NOT NULL,
          score_b REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS shortlist_batch (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          description TEXT NOT NULL DEFAULT '',
          criterion_id INTEGER NOT NULL,
          frozen_yn TEXT NOT NULL DEFAULT 'N' CHECK (frozen_yn IN ('Y', 'N')),
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS shortlist_batch_jurisdiction (
          shortlist_batch_id INTEGER NOT NULL REFERENCES shortlist_batch(id),
          juris_code TEXT NOT NULL REFERENCES jurisdiction(code),
          PRIMARY KEY (shortlist_batch_id, juris_code)
        );

        CREATE TABLE IF NOT EXISTS shortlist_info (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          applicant_id TEXT NOT NULL,
          shortlisted_yn TEXT NOT NULL DEFAULT 'Y' CHECK (shortlisted_yn IN ('Y', 'N')),
          shortlist_batch_id INTEGER REFERENCES shortlist_batch(id)
        );

        CREATE INDEX IF NOT EXISTS idx_jurisdiction_parent ON jurisdiction(parent_code);
        CREATE INDEX IF NOT EXISTS idx_applicant_year ON applicant_primary_info(year);
        CREATE INDEX IF NOT EXISTS idx_sbj_code ON shortlist_batch_jurisdiction(juris_code);
        CREATE INDEX IF NOT EXISTS idx_shortlist_info_applicant ON shortlist_info(applicant_id);
        CREATE INDEX IF NOT EXISTS idx_shortlist_info_batch ON shortlist_info(shortlist_batch_id);
        ",
    )?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
