mod common;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use epimetrics_core::acquisition::OfflineFetcher;
use epimetrics_core::{DataStore, PipelineError};
use tempfile::tempdir;

#[test]
fn store_starts_empty_and_serves_rebuilt_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let local = common::write_fixture(dir.path())?;
    let config = common::local_config(dir.path(), local);

    let store = DataStore::new();
    assert!(store.current().is_none());

    let built = store.rebuild(&config, &OfflineFetcher)?;
    let current = store.current().expect("snapshot after rebuild");
    assert!(Arc::ptr_eq(&built, &current));
    assert_eq!(current.table.height(), current.report.rows);

    store.clear();
    assert!(store.current().is_none());
    Ok(())
}

#[test]
fn failed_rebuild_keeps_previous_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let local = common::write_fixture(dir.path())?;
    let config = common::local_config(dir.path(), local);

    let store = DataStore::new();
    let first = store.rebuild(&config, &OfflineFetcher)?;

    let broken = common::local_config(dir.path(), PathBuf::from("/nonexistent/owid.csv"));
    assert!(store.rebuild(&broken, &OfflineFetcher).is_err());

    let err = store
        .rebuild_with(|| Err(PipelineError::EmptyTable { stage: "cleaning" }))
        .expect_err("build failed");
    assert!(matches!(err, PipelineError::EmptyTable { .. }));

    let current = store.current().expect("previous snapshot kept");
    assert!(Arc::ptr_eq(&first, &current));
    Ok(())
}
