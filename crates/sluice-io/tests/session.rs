//! End-to-end write-session scenarios against recording fakes.

use std::fs::File;
use std::io::Read;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde_json::json;
use sluice_core::types::Dialect;
use sluice_core::{ConfiguredCatalog, Message, StageRef};
use sluice_io::session::WriteSession;
use sluice_io::spool::SpooledGzip;
use sluice_io::stage::Stager;
use sluice_io::warehouse::Warehouse;

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Default)]
struct RecordingWarehouse {
    statements: Mutex<Vec<String>>,
}

impl RecordingWarehouse {
    fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn execute(&self, statement: &str) -> Result<()> {
        self.statements.lock().unwrap().push(normalize(statement));
        Ok(())
    }

    async fn execute_transaction(&self, statements: &[String]) -> Result<()> {
        let mut recorded = self.statements.lock().unwrap();
        recorded.push("BEGIN".to_string());
        recorded.extend(statements.iter().map(|s| normalize(s)));
        recorded.push("COMMIT".to_string());
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// Pretends to be the object-storage stager: captures each staged CSV's
/// decompressed content and hands back a deterministic S3 reference.
#[derive(Default)]
struct RecordingStager {
    staged: Mutex<Vec<String>>,
    unstaged: Mutex<Vec<String>>,
}

impl RecordingStager {
    fn staged_csvs(&self) -> Vec<Vec<Vec<String>>> {
        self.staged
            .lock()
            .unwrap()
            .iter()
            .map(|content| {
                content
                    .lines()
                    .map(|line| line.split(',').map(str::to_string).collect())
                    .collect()
            })
            .collect()
    }

    fn unstaged_keys(&self) -> Vec<String> {
        self.unstaged.lock().unwrap().clone()
    }
}

#[async_trait]
impl Stager for RecordingStager {
    async fn stage(&self, gzip: &SpooledGzip) -> Result<StageRef> {
        let mut decoder = GzDecoder::new(File::open(&gzip.path)?);
        let mut content = String::new();
        decoder.read_to_string(&mut content)?;

        let mut staged = self.staged.lock().unwrap();
        let key = format!("stage/{}.csv.gz", staged.len());
        staged.push(content);

        Ok(StageRef::S3 {
            url: format!("s3://bucket/{key}"),
            key,
            iam_role: "arn:aws:iam::0:role/loader".to_string(),
        })
    }

    async fn unstage(&self, stage: &StageRef) -> Result<()> {
        self.unstaged.lock().unwrap().push(match stage {
            StageRef::S3 { key, .. } => key.clone(),
            StageRef::Local { path } => path.display().to_string(),
        });
        Ok(())
    }
}

fn users_catalog(sync_mode: &str, schema: serde_json::Value) -> ConfiguredCatalog {
    serde_json::from_value(json!({
        "streams": [{
            "stream": {"name": "users", "namespace": "s", "json_schema": schema},
            "primary_key": [["id"]],
            "destination_sync_mode": sync_mode
        }]
    }))
    .unwrap()
}

fn record(data: serde_json::Value) -> Message {
    serde_json::from_value(json!({
        "type": "RECORD",
        "record": {"stream": "users", "data": data, "emitted_at": 0}
    }))
    .unwrap()
}

fn state(blob: serde_json::Value) -> Message {
    serde_json::from_value(json!({"type": "STATE", "state": blob})).unwrap()
}

async fn start_session(
    catalog: &ConfiguredCatalog,
) -> (WriteSession, Arc<RecordingWarehouse>, Arc<RecordingStager>) {
    let warehouse = Arc::new(RecordingWarehouse::default());
    let stager = Arc::new(RecordingStager::default());
    let session = WriteSession::start(
        catalog,
        warehouse.clone(),
        stager.clone(),
        Dialect::Redshift,
    )
    .await
    .unwrap();
    (session, warehouse, stager)
}

fn last_32_of_sha256(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[digest.len() - 32..].to_string()
}

#[tokio::test]
async fn append_dedup_stages_dedups_and_upserts_one_record() {
    let catalog = users_catalog(
        "append_dedup",
        json!({"properties": {"id": {"type": "string"}, "name": {"type": "string", "maxLength": 13}}}),
    );
    let (mut session, warehouse, stager) = start_session(&catalog).await;

    // Initialization realized the final table, the staging schema, and the peer.
    let initialization = warehouse.statements();
    assert!(initialization[0].starts_with("CREATE TABLE IF NOT EXISTS s.users ("));
    assert!(initialization.contains(&"CREATE SCHEMA IF NOT EXISTS _airbyte_s".to_string()));
    assert!(initialization
        .iter()
        .any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS _airbyte_s.users (") && s.contains("BACKUP NO")));

    let emitted = session
        .process(record(json!({"id": "u1", "name": "Ada"})))
        .await
        .unwrap();
    assert!(emitted.is_none());

    let emitted = session.process(state(json!({"cursor": 1}))).await.unwrap();
    assert!(matches!(emitted, Some(Message::State { .. })));

    // The flush loaded staging, deduplicated it, and ran the upsert batch.
    let statements = warehouse.statements();
    let flush: Vec<&String> = statements
        .iter()
        .skip(initialization.len())
        .collect();
    assert_eq!(flush[0], "BEGIN");
    assert!(flush[1].starts_with("COPY _airbyte_s.users FROM 's3://bucket/stage/0.csv.gz'"));
    assert!(flush[2].contains("PARTITION BY _airbyte_ab_id ORDER BY _airbyte_emitted_at DESC"));
    assert!(flush[2].contains("FROM _airbyte_s.users"));
    assert!(flush[3].starts_with("DELETE FROM s.users USING _airbyte_s.users AS staging"));
    assert!(flush[4].starts_with("INSERT INTO s.users SELECT * FROM _airbyte_s.users"));
    assert_eq!(flush[5], "TRUNCATE TABLE _airbyte_s.users");
    assert_eq!(flush[6], "COMMIT");

    // The staged CSV carried the synthesized identity and emission time.
    let csvs = stager.staged_csvs();
    assert_eq!(csvs.len(), 1);
    assert_eq!(
        csvs[0][0],
        vec!["id", "name", "_airbyte_ab_id", "_airbyte_emitted_at"]
    );
    assert_eq!(
        csvs[0][1],
        vec![
            "u1".to_string(),
            "Ada".to_string(),
            last_32_of_sha256("u1"),
            "1970-01-01T00:00:00".to_string(),
        ]
    );

    assert_eq!(stager.unstaged_keys(), vec!["stage/0.csv.gz"]);

    session.finish().await.unwrap();
}

#[tokio::test]
async fn nested_tables_flush_parent_before_child() {
    let catalog = users_catalog(
        "append",
        json!({"properties": {
            "id": {"type": "string"},
            "address": {"type": "object", "properties": {"street": {"type": "string"}}}
        }}),
    );
    let (mut session, warehouse, stager) = start_session(&catalog).await;
    let initialization_len = warehouse.statements().len();

    session
        .process(record(json!({"id": "u1", "address": {"street": "1 Elm"}})))
        .await
        .unwrap();
    session.process(state(json!({"cursor": 1}))).await.unwrap();

    let statements = warehouse.statements();
    let loads: Vec<&String> = statements
        .iter()
        .skip(initialization_len)
        .filter(|s| s.starts_with("COPY"))
        .collect();
    assert_eq!(loads.len(), 2);
    assert!(loads[0].starts_with("COPY s.users FROM"));
    assert!(loads[1].starts_with("COPY s.users_address FROM"));

    // The child row points at the parent row's identity.
    let csvs = stager.staged_csvs();
    let parent_identity = last_32_of_sha256("u1");
    assert_eq!(csvs[0][1][2], parent_identity);
    assert_eq!(csvs[1][0][3], "_airbyte_users_id");
    assert_eq!(csvs[1][1][3], parent_identity);

    session.finish().await.unwrap();
}

#[tokio::test]
async fn overwrite_truncates_at_initialization_and_loads_like_append() {
    let catalog = users_catalog("overwrite", json!({"properties": {"id": {"type": "string"}}}));
    let (mut session, warehouse, _stager) = start_session(&catalog).await;

    let initialization = warehouse.statements();
    assert!(initialization[0].starts_with("CREATE TABLE IF NOT EXISTS s.users ("));
    assert_eq!(initialization[1], "TRUNCATE TABLE s.users");
    assert!(!initialization.iter().any(|s| s.contains("_airbyte_s")));

    session.process(record(json!({"id": "u1"}))).await.unwrap();
    session.process(state(json!({"cursor": 1}))).await.unwrap();

    let statements = warehouse.statements();
    let flush: Vec<&String> = statements.iter().skip(initialization.len()).collect();
    assert_eq!(flush.len(), 3);
    assert_eq!(flush[0], "BEGIN");
    assert!(flush[1].starts_with("COPY s.users FROM"));
    assert_eq!(flush[2], "COMMIT");

    session.finish().await.unwrap();
}

#[tokio::test]
async fn duplicate_identities_ride_to_staging_for_deduplication() {
    let catalog = users_catalog(
        "append_dedup",
        json!({"properties": {"id": {"type": "string"}, "name": {"type": "string"}}}),
    );
    let (mut session, warehouse, stager) = start_session(&catalog).await;

    session.process(record(json!({"id": "u1", "name": "Ada"}))).await.unwrap();
    session.process(record(json!({"id": "u1", "name": "Ada Lovelace"}))).await.unwrap();
    session.process(state(json!({"cursor": 1}))).await.unwrap();

    // Both rows reached staging with the same identity; the warehouse-side
    // dedup and upsert reconcile them.
    let csvs = stager.staged_csvs();
    assert_eq!(csvs[0].len(), 3);
    assert_eq!(csvs[0][1][2], csvs[0][2][2]);

    let statements = warehouse.statements();
    assert!(statements.iter().any(|s| s.contains("WHERE rn > 1")));
    assert!(statements
        .iter()
        .any(|s| s.starts_with("INSERT INTO s.users SELECT * FROM _airbyte_s.users")));

    session.finish().await.unwrap();
}

#[tokio::test]
async fn identical_states_emit_once_but_flush_each_time() {
    let catalog = users_catalog("append", json!({"properties": {"id": {"type": "string"}}}));
    let (mut session, warehouse, _stager) = start_session(&catalog).await;
    let initialization_len = warehouse.statements().len();

    session.process(record(json!({"id": "u1"}))).await.unwrap();
    let first = session.process(state(json!({"cursor": 7}))).await.unwrap();
    assert!(first.is_some());

    session.process(record(json!({"id": "u2"}))).await.unwrap();
    let second = session.process(state(json!({"cursor": 7}))).await.unwrap();
    assert!(second.is_none());

    // Both checkpoints flushed their preceding records.
    let loads = warehouse
        .statements()
        .iter()
        .skip(initialization_len)
        .filter(|s| s.starts_with("COPY"))
        .count();
    assert_eq!(loads, 2);

    // A different state is emitted again.
    let third = session.process(state(json!({"cursor": 8}))).await.unwrap();
    assert!(third.is_some());

    session.finish().await.unwrap();
}

#[tokio::test]
async fn empty_flushes_touch_neither_stager_nor_warehouse() {
    let catalog = users_catalog("append", json!({"properties": {"id": {"type": "string"}}}));
    let (mut session, warehouse, stager) = start_session(&catalog).await;
    let initialization_len = warehouse.statements().len();

    session.process(state(json!({"cursor": 1}))).await.unwrap();
    session.finish().await.unwrap();

    assert_eq!(warehouse.statements().len(), initialization_len);
    assert!(stager.staged_csvs().is_empty());
}

#[tokio::test]
async fn records_for_unknown_streams_abort_the_session() {
    let catalog = users_catalog("append", json!({"properties": {"id": {"type": "string"}}}));
    let (mut session, _warehouse, _stager) = start_session(&catalog).await;

    let message: Message = serde_json::from_value(json!({
        "type": "RECORD",
        "record": {"stream": "orders", "data": {"id": 1}, "emitted_at": 0}
    }))
    .unwrap();
    assert!(session.process(message).await.is_err());
}

#[tokio::test]
async fn streams_without_namespace_fail_to_start() {
    let catalog: ConfiguredCatalog = serde_json::from_value(json!({
        "streams": [{
            "stream": {"name": "users", "json_schema": {"properties": {"id": {"type": "string"}}}},
            "destination_sync_mode": "append"
        }]
    }))
    .unwrap();

    let warehouse = Arc::new(RecordingWarehouse::default());
    let stager = Arc::new(RecordingStager::default());
    let result = WriteSession::start(&catalog, warehouse, stager, Dialect::Redshift).await;
    assert!(result.is_err());
}
