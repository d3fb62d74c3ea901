//! Integration tests for transaction lifecycle and the connection facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use spindle::{Connection, Error, Statement, TransactionState, Value};
use spindle_client::backends::{MemoryDatabase, Request};
use spindle_client::DatabaseError;

const UPDATE: &str = "UPDATE singers SET active = true WHERE id = @id";

fn setup() -> (MemoryDatabase, Connection<MemoryDatabase>) {
    let db = MemoryDatabase::new();
    db.put_update_count(UPDATE, 1);
    let conn = Connection::new(db.clone());
    (db, conn)
}

#[tokio::test(start_paused = true)]
async fn test_commit_then_reuse_fails() {
    let (_db, conn) = setup();
    let tx = conn.begin_transaction().await.expect("begin");
    tx.execute(UPDATE).await.expect("update");
    let timestamp = tx.commit().await.expect("commit");

    assert_eq!(tx.commit_timestamp(), Some(timestamp));
    assert_eq!(tx.state(), TransactionState::Committed);
    assert!(matches!(tx.execute(UPDATE).await, Err(Error::AlreadyCompleted)));
    assert!(matches!(tx.commit().await, Err(Error::AlreadyCompleted)));
    assert!(matches!(tx.rollback().await, Err(Error::AlreadyCompleted)));
}

#[tokio::test(start_paused = true)]
async fn test_rollback_discards_work() {
    let (db, conn) = setup();
    let tx = conn.begin_transaction().await.expect("begin");
    tx.execute(UPDATE).await.expect("update");
    tx.rollback().await.expect("rollback");

    assert_eq!(tx.state(), TransactionState::RolledBack);
    assert!(db.committed().is_empty());
    assert!(db.requests().contains(&Request::Rollback { attempt_id: 1 }));
    assert_eq!(conn.metrics().rollbacks, 1);
    assert!(matches!(tx.rollback().await, Err(Error::AlreadyCompleted)));
}

#[tokio::test(start_paused = true)]
async fn test_statement_error_keeps_transaction_usable() {
    let (db, conn) = setup();
    db.put_error("DELETE FROM missing WHERE true", DatabaseError::not_found("table missing"));
    let tx = conn.begin_transaction().await.expect("begin");

    let err = tx.execute("DELETE FROM missing WHERE true").await.expect_err("fails");
    assert_eq!(err.database_error(), Some(&DatabaseError::not_found("table missing")));
    assert_eq!(tx.state(), TransactionState::Active);

    tx.execute(UPDATE).await.expect("still usable");
    tx.commit().await.expect("commit");
}

#[tokio::test(start_paused = true)]
async fn test_begin_error_is_reported() {
    let (db, conn) = setup();
    db.set_begin_error(Some(DatabaseError::new(
        spindle_client::ErrorCode::Unavailable,
        "server is draining",
    )));
    let err = conn.begin_transaction().await.expect_err("begin fails");
    assert!(matches!(err, Error::Database(_)));
}

#[tokio::test(start_paused = true)]
async fn test_begin_error_during_retry_fails_transaction() {
    let (db, conn) = setup();
    let tx = conn.begin_transaction().await.expect("begin");
    tx.execute(UPDATE).await.expect("update");

    db.set_begin_error(Some(DatabaseError::new(
        spindle_client::ErrorCode::Unavailable,
        "server is draining",
    )));
    db.abort_next_commit();
    let err = tx.commit().await.expect_err("cannot begin a new attempt");
    assert!(matches!(err, Error::Database(_)));
    assert_eq!(tx.state(), TransactionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_transaction_is_rolled_back() {
    let (db, conn) = setup();
    let tx = conn.begin_transaction().await.expect("begin");
    tx.execute(UPDATE).await.expect("update");
    drop(tx);
    tokio::task::yield_now().await;

    assert!(db.requests().contains(&Request::Rollback { attempt_id: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_command_binds_parameters() {
    let (db, conn) = setup();
    let tx = conn.begin_transaction().await.expect("begin");
    let count = tx.command(UPDATE).bind("id", 1i64).execute_update().await.expect("update");
    assert_eq!(count, 1);

    let sent = db.requests().into_iter().find_map(|r| match r {
        Request::Execute { statement, .. } => Some(statement),
        _ => None,
    });
    assert_eq!(sent, Some(Statement::new(UPDATE).bind("id", 1i64)));
}

#[tokio::test(start_paused = true)]
async fn test_replay_sends_same_parameters() {
    let (db, conn) = setup();
    let tx = conn.begin_transaction().await.expect("begin");
    tx.execute(Statement::new(UPDATE).bind("id", Value::Int(9))).await.expect("update");
    db.abort_next_commit();
    tx.commit().await.expect("commit");

    let replayed = db.requests().into_iter().find_map(|r| match r {
        Request::Execute { attempt_id: 2, statement } => Some(statement),
        _ => None,
    });
    assert_eq!(replayed.and_then(|s| s.param("id").cloned()), Some(Value::Int(9)));
}

#[tokio::test(start_paused = true)]
async fn test_auto_commit_execute_retries() {
    let (db, conn) = setup();
    db.abort_next_commit();
    assert_eq!(conn.execute(UPDATE).await.expect("execute"), 1);
    assert_eq!(db.committed().len(), 1);
    assert_eq!(conn.metrics().retries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_in_transaction_restarts_after_concurrent_modification() {
    let (db, conn) = setup();
    let runs = Arc::new(AtomicUsize::new(0));

    let count = conn
        .run_in_transaction(|tx| {
            let db = db.clone();
            let runs = Arc::clone(&runs);
            async move {
                let run = runs.fetch_add(1, Ordering::SeqCst);
                let count = tx.execute(UPDATE).await?;
                if run == 0 {
                    db.put_update_count(UPDATE, 2);
                    db.abort_next_commit();
                }
                Ok(count)
            }
        })
        .await
        .expect("second run commits");

    assert_eq!(count, 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(db.committed().len(), 1);
    assert_eq!(conn.metrics().concurrent_modifications, 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_in_transaction_returns_other_errors() {
    let (db, conn) = setup();
    let err = conn
        .run_in_transaction(|tx| async move {
            tx.execute(UPDATE).await?;
            Err::<(), _>(Error::invalid_parameter("rejected by application"))
        })
        .await
        .expect_err("body fails");

    assert!(matches!(err, Error::InvalidParameter(_)));
    assert!(db.committed().is_empty());
    assert!(db.requests().contains(&Request::Rollback { attempt_id: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_max_retry_count_can_be_lowered_mid_transaction() {
    let (db, conn) = setup();
    let tx = conn.begin_transaction().await.expect("begin");
    tx.execute(UPDATE).await.expect("update");
    tx.set_max_internal_retry_count(0).await.expect("set");

    db.abort_next_commit();
    let err = tx.commit().await.expect_err("no retries allowed");
    assert!(matches!(err, Error::RetryBudgetExhausted { retries: 0, .. }));
}
