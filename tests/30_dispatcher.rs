mod common;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use workbench_gateway::platform::StaticDirectory;

use common::{post_document, post_gql, workbench_login, MockWorkbench, TestGateway};

async fn setup(hooks: Option<&str>) -> Result<(MockWorkbench, TestGateway)> {
    let mock = MockWorkbench::start().await?;
    let mut config = common::test_config()?;
    config.workbench = Some(common::workbench_config(&mock.url, hooks));
    let directory = Arc::new(StaticDirectory::from_yaml(common::DIRECTORY)?);
    let gateway = common::spawn_workbench_gateway(config, directory).await?;
    Ok((mock, gateway))
}

/// Remote id of the connection the gateway created for `key`
fn remote_id(mock: &MockWorkbench, key: &str) -> Result<String> {
    let description = format!("gateway:{}", key);
    mock.connections()
        .into_iter()
        .find(|(_, config)| config["description"] == description.as_str())
        .map(|(id, _)| id)
        .context("connection not created")
}

fn error_code(reply: &Value) -> Option<&str> {
    reply["errors"][0]["extensions"]["code"].as_str()
}

#[tokio::test]
async fn disabled_operations_never_reach_workbench() -> Result<()> {
    let (mock, gateway) = setup(None).await?;
    let client = reqwest::Client::new();
    mock.clear_operations();

    for op in ["createConnection", "updateConnection", "deleteConnection", "copyConnectionFromNode"] {
        let reply = post_gql(&client, &gateway, op, json!({ "config": {} }), None).await?;
        assert_eq!(error_code(&reply), Some("OPERATION_DISABLED"), "{}", op);
    }
    assert!(mock.operations().is_empty());
    Ok(())
}

#[tokio::test]
async fn server_config_hides_custom_connections() -> Result<()> {
    let (_mock, gateway) = setup(None).await?;
    let client = reqwest::Client::new();

    let reply = post_gql(&client, &gateway, "serverConfig", json!({}), None).await?;
    assert_eq!(reply["data"]["serverConfig"]["supportsCustomConnections"], false);
    assert_eq!(reply["data"]["serverConfig"]["productName"], "mock workbench");
    Ok(())
}

#[tokio::test]
async fn unknown_operations_pass_through_untouched() -> Result<()> {
    let (mock, gateway) = setup(None).await?;
    let client = reqwest::Client::new();

    let reply = post_gql(&client, &gateway, "navRefreshNode", json!({ "nodePath": "a/b" }), None).await?;
    assert_eq!(reply["data"]["echo"]["operation"], "navRefreshNode");
    assert_eq!(reply["data"]["echo"]["variables"]["nodePath"], "a/b");
    assert_eq!(mock.operations().last().map(String::as_str), Some("navRefreshNode"));
    Ok(())
}

#[tokio::test]
async fn integral_floats_are_coerced_and_fractions_rejected() -> Result<()> {
    let (mock, gateway) = setup(None).await?;
    let client = reqwest::Client::new();

    let vars = json!({ "connectionId": "c1", "filter": { "offset": 10.0, "limit": 200.0, "sort": "asc" } });
    post_gql(&client, &gateway, "asyncReadDataFromContainer", vars, None).await?;
    let forwarded = mock.last_variables("asyncReadDataFromContainer").context("not forwarded")?;
    assert_eq!(forwarded["filter"]["offset"], json!(10));
    assert!(forwarded["filter"]["offset"].is_i64());
    assert_eq!(forwarded["filter"]["limit"], json!(200));
    assert_eq!(forwarded["filter"]["sort"], "asc");

    mock.clear_operations();
    let vars = json!({ "connectionId": "c1", "filter": { "offset": 2.5 } });
    let reply = post_gql(&client, &gateway, "asyncReadDataFromContainer", vars, None).await?;
    assert_eq!(error_code(&reply), Some("BAD_USER_INPUT"));
    assert!(mock.operations().is_empty());
    Ok(())
}

#[tokio::test]
async fn audited_execute_and_masked_results() -> Result<()> {
    let hooks = common::mock_hooks().await?;
    let (mock, gateway) = setup(Some(&hooks)).await?;
    let client = reqwest::Client::new();

    let (session, _) = workbench_login(&client, &gateway, &gateway.token("alice", "user")).await?;
    let connection = remote_id(&mock, "S1:default:alice")?;
    mock.clear_operations();

    let rejected = post_gql(
        &client,
        &gateway,
        "asyncSqlExecuteQuery",
        json!({ "connectionId": connection, "sql": "DROP TABLE orders" }),
        Some(&session),
    )
    .await?;
    assert_eq!(error_code(&rejected), Some("SQL_REJECTED"));
    assert!(mock.operations().is_empty());

    let accepted = post_gql(
        &client,
        &gateway,
        "asyncSqlExecuteQuery",
        json!({ "connectionId": connection, "sql": "select email from customers" }),
        Some(&session),
    )
    .await?;
    assert_eq!(accepted["data"]["taskInfo"]["id"], "task-1");

    let results = post_gql(
        &client,
        &gateway,
        "getSqlExecuteTaskResults",
        json!({ "taskId": "task-1" }),
        Some(&session),
    )
    .await?;
    let rows = &results["data"]["result"]["results"];
    assert_eq!(rows.as_array().map(Vec::len), Some(1));
    assert_eq!(rows[0]["masked"], true);
    assert_eq!(rows[0]["dbServiceId"], "S1");
    Ok(())
}

#[tokio::test]
async fn inline_sql_is_audited() -> Result<()> {
    let hooks = common::mock_hooks().await?;
    let (mock, gateway) = setup(Some(&hooks)).await?;
    let client = reqwest::Client::new();

    let (session, _) = workbench_login(&client, &gateway, &gateway.token("alice", "user")).await?;
    let connection = remote_id(&mock, "S1:default:alice")?;
    mock.clear_operations();

    let query = format!(
        r#"mutation asyncSqlExecuteQuery {{ asyncSqlExecuteQuery(projectId: "p", connectionId: "{}", contextId: "c", sql: "DROP TABLE orders") {{ id }} }}"#,
        connection
    );
    let reply = post_document(&client, &gateway, "asyncSqlExecuteQuery", &query, json!({}), Some(&session)).await?;
    assert_eq!(error_code(&reply), Some("SQL_REJECTED"));

    // Inline arguments take precedence over a harmless variable of the same name
    let query = "mutation run($c: ID!, $q: String!) { asyncSqlExecuteQuery(connectionId: $c, sql: $q) { id } }";
    let vars = json!({ "c": connection, "q": "drop table orders", "sql": "select 1" });
    let reply = post_document(&client, &gateway, "run", query, vars, Some(&session)).await?;
    assert_eq!(error_code(&reply), Some("SQL_REJECTED"));

    let reply = post_document(
        &client,
        &gateway,
        "run",
        "mutation run { asyncSqlExecuteQuery(projectId: \"p\") { id } }",
        json!({}),
        Some(&session),
    )
    .await?;
    assert_eq!(error_code(&reply), Some("BAD_USER_INPUT"));

    assert!(mock.operations().is_empty());
    Ok(())
}

#[tokio::test]
async fn policy_follows_the_executed_field() -> Result<()> {
    let (mock, gateway) = setup(None).await?;
    let client = reqwest::Client::new();
    mock.clear_operations();

    let renamed = "mutation innocuous { createConnection(config: { host: \"evil\" }) { id } }";
    let reply = post_document(&client, &gateway, "innocuous", renamed, json!({}), None).await?;
    assert_eq!(error_code(&reply), Some("OPERATION_DISABLED"));

    let aliased = "mutation serverConfig { serverConfig: deleteConnection(id: \"c1\") }";
    let reply = post_document(&client, &gateway, "serverConfig", aliased, json!({}), None).await?;
    assert_eq!(error_code(&reply), Some("OPERATION_DISABLED"));

    let hidden = "query q { ...Admin } fragment Admin on Query { updateConnection(config: {}) { id } }";
    let reply = post_document(&client, &gateway, "q", hidden, json!({}), None).await?;
    assert_eq!(error_code(&reply), Some("OPERATION_DISABLED"));

    let reply = post_document(&client, &gateway, "q", "query q { serverConfig(", json!({}), None).await?;
    assert_eq!(error_code(&reply), Some("GRAPHQL_PARSE_FAILED"));

    assert!(mock.operations().is_empty());
    Ok(())
}

#[tokio::test]
async fn unavailable_audit_rejects_query() -> Result<()> {
    let closed = common::closed_port_url()?;
    let (mock, gateway) = setup(Some(&closed)).await?;
    let client = reqwest::Client::new();

    let (session, _) = workbench_login(&client, &gateway, &gateway.token("alice", "user")).await?;
    let connection = remote_id(&mock, "S1:default:alice")?;
    mock.clear_operations();

    let reply = post_gql(
        &client,
        &gateway,
        "asyncSqlExecuteQuery",
        json!({ "connectionId": connection, "sql": "select 1" }),
        Some(&session),
    )
    .await?;
    assert_eq!(error_code(&reply), Some("AUDIT_UNAVAILABLE"));
    assert!(mock.operations().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_masking_never_releases_data() -> Result<()> {
    let closed = common::closed_port_url()?;
    let (_mock, gateway) = setup(Some(&closed)).await?;
    let client = reqwest::Client::new();

    let reply = post_gql(&client, &gateway, "getSqlExecuteTaskResults", json!({ "taskId": "task-1" }), None).await?;
    assert_eq!(error_code(&reply), Some("MASKING_FAILED"));
    assert!(reply.get("data").map_or(true, Value::is_null));
    assert!(!reply.to_string().contains("ada@example.com"));
    Ok(())
}

#[tokio::test]
async fn logout_through_workbench_drops_cached_session() -> Result<()> {
    let (_mock, gateway) = setup(None).await?;
    let client = reqwest::Client::new();
    let token = gateway.token("alice", "user");

    let (session, _) = workbench_login(&client, &gateway, &token).await?;
    let (_, again) = workbench_login(&client, &gateway, &token).await?;
    assert_eq!(again["data"]["reused"], true);

    let reply = post_gql(&client, &gateway, "authLogout", json!({}), Some(&session)).await?;
    assert_eq!(reply["data"]["authLogout"], true);

    let (fresh, body) = workbench_login(&client, &gateway, &token).await?;
    assert_eq!(body["data"]["reused"], false);
    assert_ne!(fresh, session);
    Ok(())
}
