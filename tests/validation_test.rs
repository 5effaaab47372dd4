//! Validator contract tests: ceilings, per-action field rules, SSRF policy.

use orbitald::workflow::validate::{validate_submission, validate_value, ValidationError};
use orbitald::workflow::{Step, MAX_BODY_BYTES, MAX_STEPS};
use serde_json::json;

fn steps_body(steps: serde_json::Value) -> serde_json::Value {
    json!({ "workflow": { "steps": steps } })
}

// ── Ceilings ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn oversize_body_rejected_before_parsing() {
    // Not even valid JSON — the size check must fire first.
    let raw = vec![b'{'; MAX_BODY_BYTES + 100];
    match validate_submission(&raw).await {
        Err(ValidationError::PayloadTooLarge { .. }) => {}
        other => panic!("expected PayloadTooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn step_count_ceiling_is_cited() {
    let steps: Vec<_> = (0..MAX_STEPS + 1)
        .map(|_| json!({"action": "screenshot"}))
        .collect();
    let err = validate_value(&steps_body(json!(steps))).await.unwrap_err();
    assert_eq!(err.field_path(), "workflow.steps");
    assert!(
        err.detail().contains(&MAX_STEPS.to_string()),
        "message should cite the bound: {}",
        err.detail()
    );
}

#[tokio::test]
async fn empty_steps_rejected() {
    let err = validate_value(&steps_body(json!([]))).await.unwrap_err();
    assert_eq!(err.field_path(), "workflow.steps");
}

#[tokio::test]
async fn missing_workflow_rejected() {
    let err = validate_value(&json!({"options": {}})).await.unwrap_err();
    assert_eq!(err.field_path(), "workflow");
}

// ── Per-action structural rules ──────────────────────────────────────────────

#[tokio::test]
async fn each_action_rejects_missing_required_fields() {
    // (step json, expected offending field suffix)
    let cases = [
        (json!({"action": "goto"}), "url"),
        (json!({"action": "wait"}), "duration"),
        (json!({"action": "wait", "duration": 60001}), "duration"),
        (json!({"action": "wait", "duration": -5}), "duration"),
        (json!({"action": "click"}), "selector"),
        (json!({"action": "type", "selector": "#a"}), "value"),
        (json!({"action": "type", "value": "x"}), "selector"),
        (json!({"action": "waitForSelector"}), "selector"),
        (json!({"action": "screenshot", "fullPage": "yes"}), "fullPage"),
        (json!({"action": "evaluate"}), "script"),
        (json!({"action": "hover", "selector": "#a"}), "action"),
        (json!({"selector": "#a"}), "action"),
    ];
    for (step, field) in cases {
        let err = validate_value(&steps_body(json!([step.clone()])))
            .await
            .expect_err(&format!("{step} should fail"));
        assert_eq!(
            err.field_path(),
            format!("workflow.steps.0.{field}"),
            "wrong field for {step}"
        );
    }
}

#[tokio::test]
async fn valid_steps_become_typed() {
    let body = steps_body(json!([
        {"action": "goto", "url": "http://example.com"},
        {"action": "wait", "duration": 0},
        {"action": "waitForDownload"},
        {"action": "screenshot"}
    ]));
    let desc = validate_value(&body).await.expect("valid submission");
    assert_eq!(desc.workflow.steps[2], Step::WaitForDownload);
    assert_eq!(desc.workflow.steps[3], Step::Screenshot { full_page: None });
}

// ── SSRF policy ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn internal_targets_always_rejected() {
    for url in [
        "file:///etc/passwd",
        "http://127.0.0.1/admin",
        "http://10.0.0.1/",
        "http://172.16.5.5/",
        "http://192.168.1.10/",
        "http://169.254.169.254/latest/meta-data",
        "http://127.0.0.\t1/admin",
        "http://224.0.0.5/",
        "http://240.1.2.3/",
        "http://0.0.0.0/",
    ] {
        let body = steps_body(json!([{"action": "goto", "url": url}]));
        let err = validate_value(&body)
            .await
            .expect_err(&format!("{url} should be rejected"));
        assert_eq!(err.field_path(), "workflow.steps.0.url", "for {url}");
    }
}

#[tokio::test]
async fn public_literal_target_accepted() {
    let body = steps_body(json!([{"action": "goto", "url": "http://93.184.216.34/"}]));
    assert!(validate_value(&body).await.is_ok());
}

#[tokio::test]
async fn options_validated_before_steps() {
    // Bad options and a bad step: options are checked first, so the
    // options failure is the one reported.
    let body = json!({
        "workflow": {"steps": [{"action": "nope"}]},
        "options": {"timeout": 50}
    });
    let err = validate_value(&body).await.unwrap_err();
    assert_eq!(err.field_path(), "options.timeout");
}
