//! Executor integration tests against the scripted provider.

use serde_json::{Value as JsonValue, json};
use sqlcall::db::{
    ConnectionProvider, ExecutionMode, QueryExecutor, QueryOptions, ScriptedProvider,
};
use sqlcall::models::{
    QueryParams, RawPayload, Row, RowSet, SqlParameter, SqlValue, StatementResult, WriteSummary,
};
use sqlcall::DbError;

fn row(value: JsonValue) -> Row {
    match value {
        JsonValue::Object(map) => map,
        _ => panic!("row must be an object"),
    }
}

fn setup() -> (ScriptedProvider, QueryExecutor<ScriptedProvider>) {
    let provider = ScriptedProvider::new();
    let executor = QueryExecutor::new(provider.clone());
    (provider, executor)
}

#[tokio::test]
async fn test_call_with_zero_parameters() {
    let (provider, executor) = setup();
    provider.push(RawPayload::write(WriteSummary::default()));

    let envelope = executor.call("sp_role_readlist", &[], None).await.unwrap();

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].sql, "CALL sp_role_readlist();");
    assert!(requests[0].values.is_empty());
    assert!(envelope.output_parameters.is_empty());
}

#[tokio::test]
async fn test_permission_create_scenario() {
    let (provider, executor) = setup();
    provider.push(RawPayload::new(vec![
        StatementResult::Rows(RowSet::from_rows(vec![row(
            json!({"name": "Admin", "description": "Full access"}),
        )])),
        StatementResult::WriteAck(WriteSummary::new(1, 0)),
    ]));

    let params = [
        SqlParameter::input("p_name", "Admin"),
        SqlParameter::input("description", "Full access"),
    ];
    let envelope = executor
        .call("sp_permission_create", &params, None)
        .await
        .unwrap();

    assert_eq!(
        envelope.data_sets,
        vec![vec![row(json!({"name": "Admin", "description": "Full access"}))]]
    );
    assert!(envelope.output_parameters.is_empty());

    // no follow-up SELECT without OUT parameters
    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].sql, "CALL sp_permission_create(?, ?);");
    assert_eq!(
        requests[0].values,
        vec![SqlValue::from("Admin"), SqlValue::from("Full access")]
    );
    assert_eq!(requests[0].mode, ExecutionMode::Prepared);
}

#[tokio::test]
async fn test_out_parameters_have_one_entry_each() {
    let (provider, executor) = setup();
    provider.push(RawPayload::new(vec![
        StatementResult::Rows(RowSet::from_rows(vec![row(json!({"name": "read"}))])),
        StatementResult::WriteAck(WriteSummary::default()),
    ]));
    provider.push(RawPayload::rows(vec![row(json!({
        "@total": 12,
        "@result": r#"{"success":true,"msg":"ok","errorLogId":0,"recordCount":1}"#
    }))]));

    let params = [
        SqlParameter::input("offsetRows", 0),
        SqlParameter::input("fetchRows", 10),
        SqlParameter::output("total"),
        SqlParameter::output("result"),
    ];
    let envelope = executor
        .call("sp_permission_readlist", &params, None)
        .await
        .unwrap();

    assert_eq!(envelope.output_parameters.len(), 2);
    assert_eq!(envelope.output_as::<i64>("total").unwrap(), 12);
    let result: JsonValue = envelope.output_json("@result").unwrap();
    assert_eq!(result["recordCount"], json!(1));
    assert_eq!(envelope.data_sets.len(), 1);

    let requests = provider.requests();
    assert_eq!(
        requests[0].sql,
        "CALL sp_permission_readlist(?, ?, @total, @result);"
    );
    assert_eq!(requests[1].sql, "SELECT @total, @result;");
    assert_eq!(requests[0].connection_id, requests[1].connection_id);
}

#[tokio::test]
async fn test_out_parameter_missing_from_row_is_null() {
    let (provider, executor) = setup();
    provider.push(RawPayload::write(WriteSummary::default()));
    provider.push(RawPayload::default());

    let envelope = executor
        .call("sp_x", &[SqlParameter::output("msg")], None)
        .await
        .unwrap();

    assert_eq!(envelope.output("msg"), Some(&JsonValue::Null));
}

#[tokio::test]
async fn test_unset_in_parameter_binds_null() {
    let (provider, executor) = setup();

    executor
        .call(
            "sp_permission_update",
            &[SqlParameter::input("id", 3), SqlParameter::unset("description")],
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        provider.requests()[0].values,
        vec![SqlValue::Int(3), SqlValue::Null]
    );
}

#[tokio::test]
async fn test_call_rejects_bad_procedure_name_before_driver() {
    let (provider, executor) = setup();

    let err = executor
        .call("sp_x; DROP TABLE permission", &[], None)
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::InvalidInput { .. }));
    assert_eq!(provider.checkouts(), 0);
}

#[tokio::test]
async fn test_multi_statement_rejected_before_driver() {
    let (provider, executor) = setup();

    for sql in [
        "DELETE FROM permission; DROP TABLE permission;",
        "SELECT 1; SELECT 2; SELECT 3",
        // conservative: terminators inside literals count too
        "SELECT ';';",
    ] {
        let err = executor
            .query(sql, &QueryParams::new(), QueryOptions::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, DbError::MultiStatementNotAllowed { .. }),
            "expected guard failure for {sql}"
        );
    }

    assert_eq!(provider.checkouts(), 0);
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_single_trailing_terminator_allowed() {
    let (provider, executor) = setup();
    provider.push(RawPayload::rows(vec![row(json!({"one": 1}))]));

    let envelope = executor
        .query("SELECT 1 AS one;", &QueryParams::new(), QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(envelope.rows().len(), 1);
}

#[tokio::test]
async fn test_multi_statement_script_keeps_order_and_last_summary() {
    let (provider, executor) = setup();
    provider.push(RawPayload::new(vec![
        StatementResult::Rows(RowSet::from_rows(vec![row(json!({"total": 2}))])),
        StatementResult::Rows(RowSet::from_rows(vec![
            row(json!({"name": "a"})),
            row(json!({"name": "b"})),
        ])),
        StatementResult::WriteAck(WriteSummary::new(2, 0)),
    ]));

    let params = QueryParams::from([("role".to_string(), SqlValue::from("admin"))]);
    let envelope = executor
        .query(
            "SELECT COUNT(*) AS total FROM permission; SELECT name FROM permission; \
             UPDATE permission SET role = :role;",
            &params,
            QueryOptions::multi_statement(),
        )
        .await
        .unwrap();

    assert_eq!(envelope.data_sets.len(), 2);
    assert_eq!(envelope.data_sets[0][0]["total"], json!(2));
    assert_eq!(envelope.data_sets[1].len(), 2);
    assert_eq!(envelope.last_write_summary, Some(WriteSummary::new(2, 0)));

    let requests = provider.requests();
    assert_eq!(requests[0].mode, ExecutionMode::MultiStatement);
    assert!(requests[0].sql.ends_with("UPDATE permission SET role = ?;"));
    assert_eq!(requests[0].values, vec![SqlValue::from("admin")]);
}

#[tokio::test]
async fn test_two_writes_keep_only_the_later_summary() {
    let (provider, executor) = setup();
    provider.push(RawPayload::new(vec![
        StatementResult::WriteAck(WriteSummary::new(5, 100)),
        StatementResult::WriteAck(WriteSummary::new(1, 101)),
    ]));

    let envelope = executor
        .query(
            "INSERT INTO a VALUES (1); INSERT INTO b VALUES (2);",
            &QueryParams::new(),
            QueryOptions::multi_statement(),
        )
        .await
        .unwrap();

    assert!(envelope.data_sets.is_empty());
    assert_eq!(envelope.affected_rows(), Some(1));
    assert_eq!(envelope.last_insert_id(), Some(101));
}

#[tokio::test]
async fn test_empty_result_is_one_empty_table() {
    let (_provider, executor) = setup();

    let envelope = executor
        .query(
            "SELECT * FROM permission WHERE 1 = 0",
            &QueryParams::new(),
            QueryOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(envelope.data_sets, vec![Vec::<Row>::new()]);
    assert!(envelope.rows().is_empty());
}

#[tokio::test]
async fn test_exists_true_and_false() {
    let (provider, executor) = setup();
    let params = QueryParams::from([("name".to_string(), SqlValue::from("X"))]);
    let sql = "SELECT 1 FROM permission WHERE name = :name";

    provider.push(RawPayload::rows(vec![row(json!({"1": 1}))]));
    assert!(executor.exists(sql, &params, None).await.unwrap());

    provider.push(RawPayload::rows(Vec::new()));
    assert!(!executor.exists(sql, &params, None).await.unwrap());

    // a write acknowledgement is not a row
    provider.push(RawPayload::write(WriteSummary::new(1, 0)));
    assert!(!executor.exists(sql, &params, None).await.unwrap());

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].sql, "SELECT 1 FROM permission WHERE name = ?");
}

#[tokio::test]
async fn test_exists_rejects_scripts() {
    let (provider, executor) = setup();

    let err = executor
        .exists("SELECT 1; SELECT 2;", &QueryParams::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::MultiStatementNotAllowed { .. }));
    assert_eq!(provider.checkouts(), 0);
}

#[tokio::test]
async fn test_missing_placeholder_value_binds_null() {
    let (provider, executor) = setup();

    executor
        .query(
            "UPDATE permission SET description = :description WHERE id = :id",
            &QueryParams::from([("id".to_string(), SqlValue::Int(9))]),
            QueryOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        provider.requests()[0].values,
        vec![SqlValue::Null, SqlValue::Int(9)]
    );
}

#[tokio::test]
async fn test_caller_connection_is_reused() {
    let (provider, executor) = setup();
    let mut conn = executor.acquire_connection().await.unwrap();

    executor
        .query(
            "START TRANSACTION",
            &QueryParams::new(),
            QueryOptions::on(&mut conn),
        )
        .await
        .unwrap();
    executor
        .call("sp_permission_delete", &[SqlParameter::input("id", 1)], Some(&mut conn))
        .await
        .unwrap();
    executor
        .exists("SELECT 1", &QueryParams::new(), Some(&mut conn))
        .await
        .unwrap();
    executor.release_connection(conn).await.unwrap();

    assert_eq!(provider.connects(), 1);
    assert_eq!(provider.checkouts(), 0);
    assert_eq!(provider.releases(), 1);
    let ids: Vec<usize> = provider
        .requests()
        .iter()
        .map(|r| r.connection_id)
        .collect();
    assert_eq!(ids, vec![1, 1, 1]);
}

#[tokio::test]
async fn test_each_call_borrows_its_own_pooled_connection() {
    let (provider, executor) = setup();

    executor.call("sp_a", &[], None).await.unwrap();
    executor.call("sp_b", &[], None).await.unwrap();

    assert_eq!(provider.checkouts(), 2);
    let requests = provider.requests();
    assert_ne!(requests[0].connection_id, requests[1].connection_id);
}

#[tokio::test]
async fn test_driver_errors_propagate_unchanged() {
    let (provider, executor) = setup();
    provider.push_error(DbError::execution(
        "Duplicate entry 'Admin' for key 'name'",
        Some("23000".to_string()),
        "Check constraints",
    ));

    let err = executor
        .call("sp_permission_create", &[SqlParameter::input("p_name", "Admin")], None)
        .await
        .unwrap_err();

    assert_eq!(err.sql_state(), Some("23000"));
    assert!(err.to_string().contains("Duplicate entry"));
}

#[tokio::test]
async fn test_connection_failure_is_connection_error() {
    let (provider, executor) = setup();
    provider.fail_next_connection(DbError::connection("refused", "Start the server"));

    let err = executor
        .query("SELECT 1", &QueryParams::new(), QueryOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Connection { .. }));
    assert!(err.is_retryable());
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_shutdown_closes_provider() {
    let (provider, executor) = setup();

    executor.shutdown().await;

    assert!(provider.is_closed());
    assert!(provider.checkout().await.is_err());
}

#[tokio::test]
async fn test_release_after_keeps_operation_error() {
    let (provider, executor) = setup();
    provider.push_error(DbError::execution(
        "Lost connection to MySQL server during query",
        Some("HY000".to_string()),
        "Check server connectivity",
    ));
    provider.fail_next_release(DbError::execution(
        "broken pipe",
        None,
        "Reconnect",
    ));

    let mut conn = executor.acquire_connection().await.unwrap();
    let result = executor.call("sp_x", &[], Some(&mut conn)).await;
    let err = executor.release_after(conn, result).await.unwrap_err();

    assert_eq!(err.sql_state(), Some("HY000"));
    assert!(err.to_string().contains("Lost connection"));
    assert_eq!(provider.releases(), 1);
}

#[tokio::test]
async fn test_release_after_reports_close_failure_on_success() {
    let (provider, executor) = setup();
    provider.fail_next_release(DbError::connection("close failed", "Reconnect"));

    let mut conn = executor.acquire_connection().await.unwrap();
    let result = executor
        .query("SELECT 1", &QueryParams::new(), QueryOptions::on(&mut conn))
        .await;
    let err = executor.release_after(conn, result).await.unwrap_err();

    assert!(matches!(err, DbError::Connection { .. }));
}

#[tokio::test]
async fn test_release_after_passes_result_through() {
    let (provider, executor) = setup();
    provider.push(RawPayload::rows(vec![row(json!({"one": 1}))]));

    let mut conn = executor.acquire_connection().await.unwrap();
    let result = executor
        .query("SELECT 1 AS one", &QueryParams::new(), QueryOptions::on(&mut conn))
        .await;
    let envelope = executor.release_after(conn, result).await.unwrap();

    assert_eq!(envelope.rows()[0]["one"], json!(1));
    assert_eq!(provider.releases(), 1);
}
