#![allow(clippy::unwrap_used)]

use spindle_core::{Mutation, Row, Statement, Value};

use super::*;
use crate::engine::{ClientError, ErrorCode, RowStream, TransactionAttempt};

fn int_row(i: i64) -> Row {
    Row::new(vec![Value::Int(i)])
}

#[tokio::test]
async fn execute_returns_registered_count() {
    let db = MemoryDatabase::new();
    db.put_update_count("UPDATE t SET x = 1", 4);

    let attempt = db.begin_transaction().await.unwrap();
    assert_eq!(attempt.execute(&Statement::new("UPDATE t SET x = 1")).await.unwrap(), 4);
}

#[tokio::test]
async fn unregistered_statement_is_invalid_argument() {
    let db = MemoryDatabase::new();
    let attempt = db.begin_transaction().await.unwrap();
    let err = attempt.execute(&Statement::new("UPDATE nope")).await.unwrap_err();
    let ClientError::Database(err) = err else { panic!("expected database error") };
    assert_eq!(err.code, ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn aborted_attempt_stays_aborted() {
    let db = MemoryDatabase::new();
    db.put_update_count("UPDATE t SET x = 1", 1);
    db.abort_next_statement();

    let attempt = db.begin_transaction().await.unwrap();
    let stmt = Statement::new("UPDATE t SET x = 1");
    assert!(attempt.execute(&stmt).await.unwrap_err().is_aborted());
    assert!(attempt.execute(&stmt).await.unwrap_err().is_aborted());
    assert!(attempt.commit(&[]).await.unwrap_err().is_aborted());

    // A fresh attempt is unaffected.
    let fresh = db.begin_transaction().await.unwrap();
    assert_eq!(fresh.execute(&stmt).await.unwrap(), 1);
}

#[tokio::test]
async fn batch_stops_at_first_failure() {
    let db = MemoryDatabase::new();
    db.put_update_count("INSERT a", 1);
    db.put_error("INSERT b", DatabaseError::already_exists("b exists"));
    db.put_update_count("INSERT c", 1);

    let attempt = db.begin_transaction().await.unwrap();
    let outcome = attempt
        .execute_batch(&[
            Statement::new("INSERT a"),
            Statement::new("INSERT b"),
            Statement::new("INSERT c"),
        ])
        .await
        .unwrap();
    assert_eq!(outcome.row_counts, vec![1]);
    assert_eq!(outcome.error, Some(DatabaseError::already_exists("b exists")));
    assert!(!outcome.is_complete());
}

#[tokio::test]
async fn stream_snapshot_ignores_later_changes() {
    let db = MemoryDatabase::new();
    db.put_query_rows("SELECT x FROM t", vec![int_row(1), int_row(2)]);

    let attempt = db.begin_transaction().await.unwrap();
    let mut stream = attempt.execute_streaming(&Statement::new("SELECT x FROM t")).await.unwrap();
    db.put_query_rows("SELECT x FROM t", vec![int_row(9)]);

    assert_eq!(stream.next().await.unwrap(), Some(int_row(1)));
    assert_eq!(stream.next().await.unwrap(), Some(int_row(2)));
    assert_eq!(stream.next().await.unwrap(), None);
    assert_eq!(stream.next().await.unwrap(), None);
}

#[tokio::test]
async fn stream_abort_after_rows() {
    let db = MemoryDatabase::new();
    db.put_query_rows("SELECT x FROM t", vec![int_row(1), int_row(2)]);
    db.abort_stream_after("SELECT x FROM t", 1);

    let attempt = db.begin_transaction().await.unwrap();
    let mut stream = attempt.execute_streaming(&Statement::new("SELECT x FROM t")).await.unwrap();
    assert_eq!(stream.next().await.unwrap(), Some(int_row(1)));
    assert!(stream.next().await.unwrap_err().is_aborted());
    assert!(attempt.commit(&[]).await.unwrap_err().is_aborted());

    // The injected abort is consumed by the first execution only.
    let fresh = db.begin_transaction().await.unwrap();
    let mut stream = fresh.execute_streaming(&Statement::new("SELECT x FROM t")).await.unwrap();
    assert_eq!(stream.next().await.unwrap(), Some(int_row(1)));
    assert_eq!(stream.next().await.unwrap(), Some(int_row(2)));
}

#[tokio::test]
async fn stream_error_after_rows() {
    let db = MemoryDatabase::new();
    let error = DatabaseError::new(ErrorCode::OutOfRange, "overflow");
    db.put_statement_result(
        "SELECT x FROM t",
        StatementResult::RowsThenError { rows: vec![int_row(1)], error: error.clone() },
    );

    let attempt = db.begin_transaction().await.unwrap();
    let mut stream = attempt.execute_streaming(&Statement::new("SELECT x FROM t")).await.unwrap();
    assert_eq!(stream.next().await.unwrap(), Some(int_row(1)));
    assert_eq!(stream.next().await.unwrap_err(), ClientError::Database(error));
}

#[tokio::test]
async fn commit_records_mutations_and_timestamps() {
    let db = MemoryDatabase::new();
    let first = db.begin_transaction().await.unwrap();
    let mutation = Mutation::insert("t").with_columns(["x"]).with_row(vec![Value::Int(1)]);
    let ts1 = first.commit(std::slice::from_ref(&mutation)).await.unwrap();

    let second = db.begin_transaction().await.unwrap();
    let ts2 = second.commit(&[]).await.unwrap();
    assert!(ts2 > ts1);

    let committed = db.committed();
    assert_eq!(committed.len(), 2);
    assert_eq!(committed[0].mutations, vec![mutation]);

    let err = first.commit(&[]).await.unwrap_err();
    assert_eq!(err.as_database_error().map(|e| e.code), Some(ErrorCode::FailedPrecondition));
}

#[tokio::test]
async fn commit_aborts_are_queued() {
    let db = MemoryDatabase::new();
    db.abort_commits(2);
    for _ in 0..2 {
        let attempt = db.begin_transaction().await.unwrap();
        assert!(attempt.commit(&[]).await.unwrap_err().is_aborted());
    }
    let attempt = db.begin_transaction().await.unwrap();
    assert!(attempt.commit(&[]).await.is_ok());
    assert_eq!(db.begin_count(), 3);
}

#[tokio::test]
async fn request_log_records_attempts() {
    let db = MemoryDatabase::new();
    db.put_update_count("DELETE t", 0);
    let attempt = db.begin_transaction().await.unwrap();
    attempt.execute(&Statement::new("DELETE t")).await.unwrap();
    attempt.rollback().await.unwrap();

    let requests = db.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.attempt_id() == attempt.id()));
    assert!(matches!(requests[2], Request::Rollback { .. }));

    db.clear_requests();
    assert!(db.requests().is_empty());
}

#[tokio::test]
async fn begin_error_is_reported() {
    let db = MemoryDatabase::new();
    db.set_begin_error(Some(DatabaseError::new(ErrorCode::Unavailable, "down")));
    assert!(db.begin_transaction().await.is_err());
    db.set_begin_error(None);
    assert!(db.begin_transaction().await.is_ok());
}
