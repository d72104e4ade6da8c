//! libSQL-backed matter store.
//!
//! The table is a materialized view of the CSV source: every load parses and
//! validates the whole file first, then swaps the table contents inside one
//! transaction. Outside of a load the connection runs with `query_only` set,
//! so query text can read the table but never modify it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::config::StoreConfig;
use crate::envelope::{Locator, RecordView, ResponseEnvelope, json_value};
use crate::error::{QueryFault, StoreError};
use crate::record::MatterRecord;
use crate::schema::TableSchema;
use crate::seed;
use crate::statement::screen_query;

/// Default locator base placed in front of the object-type tag.
pub const DEFAULT_LOCATOR_BASE: &str = "/objects";

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub source: PathBuf,
    /// Data rows read from the source, duplicates included.
    pub rows_read: usize,
    /// Rows in the table after the load committed.
    pub rows_stored: u64,
    pub open_matters: usize,
}

pub struct MatterStore {
    db: Option<libsql::Database>,
    conn: Option<libsql::Connection>,
    schema: TableSchema,
    locator: Locator,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for MatterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatterStore")
            .field("table", &self.schema.table)
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MatterStore {
    /// Open (creating if absent) an on-disk store at `db_path`.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io(parent, e))?;
        }

        let db = libsql::Builder::new_local(db_path).build().await?;
        let store = Self::init(db, Some(db_path.to_path_buf())).await?;
        tracing::debug!(path = %db_path.display(), "Opened matter store");
        Ok(store)
    }

    /// Open a throwaway store that lives only as long as this handle.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:").build().await?;
        Self::init(db, None).await
    }

    /// Open the configured database and apply the configured locator base.
    pub async fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self::open(&config.db_path)
            .await?
            .with_locator_base(&config.locator_base))
    }

    /// Open `db_path` and load `source` into it in one step.
    pub async fn load_from(
        source: impl AsRef<Path>,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::open(db_path).await?;
        store.load(source).await?;
        Ok(store)
    }

    async fn init(db: libsql::Database, path: Option<PathBuf>) -> Result<Self, StoreError> {
        let schema = TableSchema::matters();
        let conn = db.connect()?;
        conn.execute_batch(&schema.create_table_sql()).await?;
        conn.execute_batch("PRAGMA query_only = 1").await?;

        Ok(Self {
            db: Some(db),
            conn: Some(conn),
            schema,
            locator: Locator::new(DEFAULT_LOCATOR_BASE, schema.object_type),
            path,
        })
    }

    pub fn with_locator_base(mut self, base: &str) -> Self {
        self.locator = Locator::new(base, self.schema.object_type);
        self
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn object_type(&self) -> &str {
        self.locator.object_type()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Release the storage handle. Later operations fail with
    /// [`StoreError::StoreClosed`].
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!(path = ?self.path, "Closed matter store");
        }
        self.db = None;
    }

    fn connection(&self) -> Result<&libsql::Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::StoreClosed)
    }

    /// Replace the table contents with the rows of `source`.
    ///
    /// Rows sharing an `Id` collapse to the last one read. On any error the
    /// previous contents are left in place.
    pub async fn load(&mut self, source: impl AsRef<Path>) -> Result<LoadSummary, StoreError> {
        let source = source.as_ref();
        let conn = self.connection()?;
        let records = read_source(source).await?;

        conn.execute_batch("PRAGMA query_only = 0").await?;
        let replaced = replace_rows(conn, &self.schema, &records).await;
        conn.execute_batch("PRAGMA query_only = 1").await?;
        replaced?;

        let mut latest: BTreeMap<&str, &MatterRecord> = BTreeMap::new();
        for record in &records {
            latest.insert(record.id.as_str(), record);
        }
        let summary = LoadSummary {
            source: source.to_path_buf(),
            rows_read: records.len(),
            rows_stored: self.row_count().await?,
            open_matters: latest.values().filter(|r| r.is_open()).count(),
        };

        tracing::info!(
            source = %source.display(),
            rows_read = summary.rows_read,
            rows_stored = summary.rows_stored,
            open_matters = summary.open_matters,
            "Loaded matters"
        );
        Ok(summary)
    }

    /// Load the configured source, writing the sample export first when the
    /// source is missing and seeding is enabled.
    pub async fn load_configured(
        &mut self,
        config: &StoreConfig,
    ) -> Result<LoadSummary, StoreError> {
        if config.seed_if_missing {
            seed::write_sample_csv(&config.source_path, false).await?;
        }
        self.load(&config.source_path).await
    }

    /// Run select-style `query` and shape the rows into a response envelope.
    ///
    /// The first result column is taken as the record id for the locator,
    /// whichever column the query put there. Anything but a single
    /// `SELECT`/`WITH`/`VALUES` statement is refused before it runs.
    pub async fn execute(&self, query: &str) -> Result<ResponseEnvelope, StoreError> {
        let conn = self.connection()?;
        tracing::debug!(query, "Executing matter query");

        let query_error = |source: QueryFault| StoreError::Query {
            query: query.to_string(),
            source,
        };
        screen_query(query).map_err(query_error)?;
        conn.execute_batch("PRAGMA query_only = 1").await?;

        let result = self.collect_rows(conn, query).await;
        if !conn.is_autocommit() {
            let _ = conn.execute("ROLLBACK", ()).await;
            tracing::warn!(query, "Matter query left a transaction open, rolled back");
            return Err(query_error(QueryFault::OpenTransaction));
        }
        let records = result.map_err(|e| query_error(QueryFault::Engine(e)))?;

        tracing::debug!(total_size = records.len(), "Matter query complete");
        Ok(ResponseEnvelope::new(records))
    }

    async fn collect_rows(
        &self,
        conn: &libsql::Connection,
        query: &str,
    ) -> Result<Vec<RecordView>, libsql::Error> {
        let mut rows = conn.query(query, ()).await?;
        let column_count = rows.column_count();
        let columns: Vec<String> = (0..column_count)
            .map(|idx| rows.column_name(idx).unwrap_or_default().to_string())
            .collect();

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..column_count {
                values.push(json_value(row.get_value(idx)?));
            }

            let first = values.first().cloned().unwrap_or(Value::Null);
            let mut view = RecordView::new(self.locator.attributes_for(&first));
            for (name, value) in columns.iter().zip(values) {
                view.push_field(name.as_str(), value);
            }
            records.push(view);
        }
        Ok(records)
    }

    pub async fn row_count(&self) -> Result<u64, StoreError> {
        let conn = self.connection()?;
        let row = conn
            .query(&format!("SELECT COUNT(*) FROM {}", self.schema.table), ())
            .await?
            .next()
            .await?;
        let count = match row {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Fetch one typed record by primary key.
    pub async fn get(&self, id: &str) -> Result<Option<MatterRecord>, StoreError> {
        let conn = self.connection()?;
        let row = conn
            .query(&self.schema.select_by_key_sql(), libsql::params![id])
            .await?
            .next()
            .await?;
        row.map(|row| row_to_matter_record(&row, &self.schema))
            .transpose()
    }

    /// All stored records ordered by primary key.
    pub async fn records(&self) -> Result<Vec<MatterRecord>, StoreError> {
        let conn = self.connection()?;
        let sql = format!(
            "{} ORDER BY {}",
            self.schema.select_all_sql(),
            self.schema.primary_key()
        );
        let mut rows = conn.query(&sql, ()).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_matter_record(&row, &self.schema)?);
        }
        Ok(out)
    }
}

fn row_to_matter_record(
    row: &libsql::Row,
    schema: &TableSchema,
) -> Result<MatterRecord, StoreError> {
    let mut values = Vec::with_capacity(schema.column_count());
    for idx in 0..schema.column_count() {
        let value = match row.get_value(idx as i32)? {
            libsql::Value::Text(s) => s,
            libsql::Value::Null => String::new(),
            libsql::Value::Integer(i) => i.to_string(),
            libsql::Value::Real(f) => f.to_string(),
            libsql::Value::Blob(_) => String::new(),
        };
        values.push(value);
    }
    MatterRecord::from_values(values).ok_or_else(|| StoreError::malformed(0, "stored row width"))
}

/// Parse and validate every row of `source` before anything is written.
async fn read_source(source: &Path) -> Result<Vec<MatterRecord>, StoreError> {
    let bytes = tokio::fs::read(source)
        .await
        .map_err(|e| StoreError::from_io(source, e))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let schema = TableSchema::matters();
    let header = reader.headers().map_err(|e| csv_error(1, e))?;
    if header.len() != schema.column_count() {
        return Err(StoreError::malformed(
            1,
            format!(
                "header names {} columns, schema requires {} starting with '{}'",
                header.len(),
                schema.column_count(),
                schema.primary_key()
            ),
        ));
    }

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let fallback_line = idx as u64 + 2;
        let row = result.map_err(|e| csv_error(fallback_line, e))?;
        let line = row.position().map_or(fallback_line, |p| p.line());
        let record = MatterRecord::from_csv_row(line, &row)?;
        for (column, value) in record.unparseable_dates() {
            tracing::warn!(line, column, value, "Unrecognized date value, stored verbatim");
        }
        records.push(record);
    }
    Ok(records)
}

fn csv_error(fallback_line: u64, err: csv::Error) -> StoreError {
    let line = err.position().map_or(fallback_line, |p| p.line());
    StoreError::malformed(line, err.to_string())
}

async fn replace_rows(
    conn: &libsql::Connection,
    schema: &TableSchema,
    records: &[MatterRecord],
) -> Result<(), StoreError> {
    if !conn.is_autocommit() {
        tracing::warn!("Rolling back a transaction left open on the store connection");
        conn.execute("ROLLBACK", ()).await?;
    }
    conn.execute("BEGIN", ()).await?;
    let replace_result = async {
        conn.execute(&format!("DELETE FROM {}", schema.table), ())
            .await?;
        let upsert = schema.upsert_sql();
        for record in records {
            conn.execute(&upsert, libsql::params_from_iter(record.values()))
                .await?;
        }
        Ok::<(), StoreError>(())
    }
    .await;

    match replace_result {
        Ok(()) => {
            conn.execute("COMMIT", ()).await?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestStore {
        store: MatterStore,
        dir: tempfile::TempDir,
    }

    impl TestStore {
        fn source(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, contents).expect("write source");
            path
        }
    }

    async fn setup_store() -> TestStore {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MatterStore::open(dir.path().join("matters_test.db"))
            .await
            .expect("store should open");
        TestStore { store, dir }
    }

    const HEADER: &str = "Id,Name,Client,ClientName,RT,RTName,CaseType,Status,Stage,SubStage,Open,Closed,Asst,Attorney,AsstName";

    #[tokio::test]
    async fn open_creates_table_before_any_load() {
        let fixture = setup_store().await;
        assert_eq!(fixture.store.row_count().await.expect("count"), 0);
        let envelope = fixture
            .store
            .execute("SELECT Id FROM litify_pm__Matter__c")
            .await
            .expect("query empty table");
        assert_eq!(envelope, ResponseEnvelope::empty());
    }

    #[tokio::test]
    async fn header_names_are_not_checked_only_their_count() {
        let mut fixture = setup_store().await;
        let source = fixture.source(
            "renamed.csv",
            &format!("{HEADER}\nm-1,A,,B,,PI,PI AUTO,Open,Intake,,1/2/24,,,Casey Lee,\n"),
        );
        let summary = fixture.store.load(&source).await.expect("load");
        assert_eq!(summary.rows_read, 1);
        assert_eq!(summary.rows_stored, 1);
        assert_eq!(summary.open_matters, 1);

        let record = fixture.store.get("m-1").await.expect("get").expect("row");
        assert_eq!(record.attorney_name, "Casey Lee");
        assert_eq!(record.closed_date, "");
    }

    #[tokio::test]
    async fn short_row_fails_without_touching_table() {
        let mut fixture = setup_store().await;
        let good = fixture.source(
            "good.csv",
            &format!("{HEADER}\nm-1,A,,B,,PI,PI AUTO,Open,Intake,,1/2/24,,,Casey Lee,\n"),
        );
        fixture.store.load(&good).await.expect("first load");

        let bad = fixture.source(
            "bad.csv",
            &format!(
                "{HEADER}\nm-2,A,,B,,PI,PI AUTO,Open,Intake,,1/2/24,,,Casey Lee,\nm-3,short\n"
            ),
        );
        let err = fixture.store.load(&bad).await.expect_err("short row");
        let StoreError::MalformedRecord { line, .. } = err else {
            panic!("expected MalformedRecord, got {err:?}");
        };
        assert_eq!(line, 3);

        let ids: Vec<String> = fixture
            .store
            .records()
            .await
            .expect("records")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["m-1".to_string()]);
    }

    #[tokio::test]
    async fn missing_source_is_not_found() {
        let mut fixture = setup_store().await;
        let missing = fixture.dir.path().join("nope.csv");
        let err = fixture.store.load(&missing).await.expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_source_is_malformed() {
        let mut fixture = setup_store().await;
        let source = fixture.source("empty.csv", "");
        let err = fixture.store.load(&source).await.expect_err("empty");
        assert!(matches!(err, StoreError::MalformedRecord { line: 1, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn modifying_query_text_is_a_query_error() {
        let mut fixture = setup_store().await;
        let source = fixture.source(
            "one.csv",
            &format!("{HEADER}\nm-1,A,,B,,PI,PI AUTO,Open,Intake,,1/2/24,,,Casey Lee,\n"),
        );
        fixture.store.load(&source).await.expect("load");

        for statement in [
            "DELETE FROM litify_pm__Matter__c",
            "DROP TABLE litify_pm__Matter__c",
        ] {
            let err = fixture
                .store
                .execute(statement)
                .await
                .expect_err("writes must fail");
            let StoreError::Query { query, .. } = err else {
                panic!("expected Query error for {statement}");
            };
            assert_eq!(query, statement);
        }
        assert_eq!(fixture.store.row_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn pragma_text_cannot_lift_read_only_mode() {
        let mut fixture = setup_store().await;
        let source = fixture.source(
            "one.csv",
            &format!("{HEADER}\nm-1,A,,B,,PI,PI AUTO,Open,Intake,,1/2/24,,,Casey Lee,\n"),
        );
        fixture.store.load(&source).await.expect("load");

        for statement in [
            "PRAGMA query_only = 0",
            "SELECT 1; PRAGMA query_only = 0",
            "ATTACH DATABASE ':memory:' AS side",
        ] {
            let err = fixture
                .store
                .execute(statement)
                .await
                .expect_err("session control must fail");
            assert!(
                matches!(
                    err,
                    StoreError::Query {
                        source: QueryFault::NotReadOnly { .. } | QueryFault::MultipleStatements,
                        ..
                    }
                ),
                "got {err:?}"
            );
        }

        let err = fixture
            .store
            .execute("DELETE FROM litify_pm__Matter__c")
            .await
            .expect_err("still read-only");
        assert!(matches!(err, StoreError::Query { .. }), "got {err:?}");
        assert_eq!(fixture.store.row_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn transaction_control_text_leaves_reload_working() {
        let mut fixture = setup_store().await;
        let source = fixture.source(
            "one.csv",
            &format!("{HEADER}\nm-1,A,,B,,PI,PI AUTO,Open,Intake,,1/2/24,,,Casey Lee,\n"),
        );
        fixture.store.load(&source).await.expect("load");

        for statement in ["BEGIN", "BEGIN IMMEDIATE", "SAVEPOINT s1"] {
            let err = fixture
                .store
                .execute(statement)
                .await
                .expect_err("transaction control must fail");
            assert!(matches!(err, StoreError::Query { .. }), "got {err:?}");
        }

        let summary = fixture.store.load(&source).await.expect("reload after BEGIN");
        assert_eq!(summary.rows_stored, 1);
        let envelope = fixture
            .store
            .execute("SELECT Id FROM litify_pm__Matter__c")
            .await
            .expect("select after reload");
        assert_eq!(envelope.total_size, 1);
    }

    #[tokio::test]
    async fn closed_store_rejects_every_operation() {
        let mut fixture = setup_store().await;
        fixture.store.close();
        assert!(fixture.store.is_closed());

        let source = fixture.source("x.csv", HEADER);
        assert!(matches!(
            fixture.store.load(&source).await,
            Err(StoreError::StoreClosed)
        ));
        assert!(matches!(
            fixture.store.execute("SELECT 1").await,
            Err(StoreError::StoreClosed)
        ));
        assert!(matches!(
            fixture.store.get("m-1").await,
            Err(StoreError::StoreClosed)
        ));
    }

    #[tokio::test]
    async fn reopened_store_keeps_loaded_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("persist.db");
        let source = dir.path().join("one.csv");
        std::fs::write(
            &source,
            format!("{HEADER}\nm-1,A,,B,,PI,PI AUTO,Open,Intake,,1/2/24,,,Casey Lee,\n"),
        )
        .expect("write source");

        let mut store = MatterStore::load_from(&source, &db_path)
            .await
            .expect("load_from");
        store.close();

        let reopened = MatterStore::open(&db_path).await.expect("reopen");
        assert_eq!(reopened.row_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn locator_base_is_configurable() {
        let mut store = MatterStore::open_in_memory()
            .await
            .expect("memory store")
            .with_locator_base("/services/data/v58.0/sobjects/");
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("one.csv");
        std::fs::write(
            &source,
            format!("{HEADER}\nm-1,A,,B,,PI,PI AUTO,Open,Intake,,1/2/24,,,Casey Lee,\n"),
        )
        .expect("write source");
        store.load(&source).await.expect("load");

        let envelope = store
            .execute("SELECT Id FROM litify_pm__Matter__c")
            .await
            .expect("query");
        assert_eq!(
            envelope.records[0].attributes.url,
            "/services/data/v58.0/sobjects/litify_pm__Matter__c/m-1"
        );
    }
}
