use super::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.page_size, 4096);
    assert_eq!(cfg.buffer_pool_pages, 256);
    assert!(cfg.wal_enabled);
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Storage("corruption".into());
    assert!(format!("{err}").contains("storage"));
}

#[test]
fn recordbatch_consistency() {
    let rb = RecordBatch {
        columns: vec!["id".into()],
        rows: vec![Row::new(vec![Value::Int64(1)])],
    };
    assert_eq!(rb.columns.len(), 1);
    assert_eq!(rb.rows[0].values.len(), 1);
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}

#[test]
fn config_default_group_commit_window_is_one_ms() {
    let cfg = Config::default();
    assert_eq!(cfg.wal_group_window_ms, 1);
    assert_eq!(cfg.statement_cache_capacity, 256);
    assert!(cfg.default_timeout.is_none());
}

#[test]
fn new_error_variants_format_cleanly() {
    assert!(format!("{}", DbError::CacheFull("no victim".into())).contains("cache full"));
    assert!(format!("{}", DbError::Timeout("deadline".into())).contains("timed out"));
    assert!(format!("{}", DbError::RecoveryRequired("dirty wal".into())).contains("recovery"));
}
