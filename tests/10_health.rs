mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn health_reports_memory_mode_without_workbench() -> Result<()> {
    let gateway = common::spawn_gateway(common::test_config()?).await?;

    let res = reqwest::get(gateway.url("/health")).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "memory");
    assert_eq!(body["data"]["workbench"], "disabled");
    assert_eq!(body["data"]["targets"], 0);
    Ok(())
}

#[tokio::test]
async fn workbench_registers_itself_with_detected_version() -> Result<()> {
    let mock = common::MockWorkbench::start().await?;
    let mut config = common::test_config()?;
    config.workbench = Some(common::workbench_config(&mock.url, None));
    let gateway = common::spawn_gateway(config).await?;
    let client = reqwest::Client::new();

    let health: Value = client.get(gateway.url("/health")).send().await?.json().await?;
    assert_eq!(health["data"]["workbench"], "enabled");
    assert_eq!(health["data"]["targets"], 1);

    let res = client
        .get(gateway.url("/api/gateway/targets"))
        .bearer_auth(gateway.admin_token())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let targets = body["data"].as_array().expect("target list");
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["name"], "workbench");
    assert_eq!(targets[0]["version"], common::WORKBENCH_VERSION);
    assert_eq!(targets[0]["prefixes"][0], "/sql_query");
    Ok(())
}

#[tokio::test]
async fn unreachable_workbench_registers_unknown_version() -> Result<()> {
    let mut config = common::test_config()?;
    config.workbench = Some(common::workbench_config(&common::closed_port_url()?, None));
    let gateway = common::spawn_gateway(config).await?;

    let body: Value = reqwest::Client::new()
        .get(gateway.url("/api/gateway/targets"))
        .bearer_auth(gateway.admin_token())
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"][0]["version"], "unknown");
    Ok(())
}
