//! End-to-end tests for the callback-completion protocol, flow-action
//! updates, and user-action signalling.

mod common;

use common::TestApp;
use serde_json::Value;
use sidekick_api::domain::flow::{FLOW_STATUS_IN_PROGRESS, FLOW_STATUS_PAUSED};
use sidekick_api::domain::flow_action::REQUEST_KIND_FREE_FORM;
use sidekick_api::storage::Storage;

#[tokio::test]
async fn test_complete_callback_action_persists_result() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    let (_flow, action) = app.seed_flow_with_action(&workspace_id).await;

    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/flow_actions/{}/complete",
            action.id
        )))
        .json(&serde_json::json!({ "userResponse": { "content": "test response" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["actionStatus"], "complete");

    let result: Value = serde_json::from_str(body["actionResult"].as_str().unwrap()).unwrap();
    assert_eq!(
        result,
        serde_json::json!({
            "TargetWorkflowId": "flow_1",
            "Content": "test response",
            "Approved": null,
            "Choice": "",
            "Params": null,
        })
    );

    // a re-read observes the same completed state
    let body: Value = app
        .client
        .get(app.api(&format!("/workspaces/{workspace_id}/flow/flow_1/actions")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let actions = body["actions"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["actionStatus"], "complete");
}

#[tokio::test]
async fn test_complete_rejects_blank_free_form_response() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    let (_flow, action) = app.seed_flow_with_action(&workspace_id).await;

    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/flow_actions/{}/complete",
            action.id
        )))
        .json(&serde_json::json!({ "userResponse": { "content": "  \n\t  " } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "User response cannot be empty");

    // the action is unchanged
    let stored = app
        .storage
        .get_flow_action(&workspace_id, &action.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_pending());
    assert!(stored.action_result.is_empty());
}

#[tokio::test]
async fn test_complete_requires_human_callback_pending() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    app.seed_flow(&workspace_id, "flow_1", FLOW_STATUS_IN_PROGRESS)
        .await;

    // not a human action
    let mut action = app
        .seed_callback_action(&workspace_id, "flow_1", "fa_machine", REQUEST_KIND_FREE_FORM)
        .await;
    action.is_human_action = false;
    app.storage.persist_flow_action(action).await.unwrap();

    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/flow_actions/fa_machine/complete"
        )))
        .json(&serde_json::json!({ "userResponse": { "content": "x" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "only human actions can be completed");

    // missing action
    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/flow_actions/fa_missing/complete"
        )))
        .json(&serde_json::json!({ "userResponse": { "content": "x" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Flow action not found");
}

#[tokio::test]
async fn test_complete_twice_hits_pending_check() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    let (_flow, action) = app.seed_flow_with_action(&workspace_id).await;

    let complete = || {
        let url = app.api(&format!(
            "/workspaces/{workspace_id}/flow_actions/{}/complete",
            action.id
        ));
        let client = app.client.clone();
        async move {
            client
                .post(url)
                .json(&serde_json::json!({ "userResponse": { "content": "ok" } }))
                .send()
                .await
                .unwrap()
        }
    };

    assert_eq!(complete().await.status(), 200);

    let response = complete().await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Flow action status is not pending");
}

#[tokio::test]
async fn test_completing_action_unpauses_flow() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    app.seed_flow(&workspace_id, "flow_1", FLOW_STATUS_PAUSED).await;
    let action = app
        .seed_callback_action(&workspace_id, "flow_1", "fa_1", REQUEST_KIND_FREE_FORM)
        .await;

    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/flow_actions/{}/complete",
            action.id
        )))
        .json(&serde_json::json!({ "userResponse": { "content": "go" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = app
        .client
        .get(app.api(&format!("/workspaces/{workspace_id}/flows/flow_1")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "in_progress");
}

#[tokio::test]
async fn test_update_rejects_approval_decision() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    let (_flow, action) = app.seed_flow_with_action(&workspace_id).await;

    let response = app
        .client
        .put(app.api(&format!(
            "/workspaces/{workspace_id}/flow_actions/{}",
            action.id
        )))
        .json(&serde_json::json!({ "userResponse": { "approved": true, "content": "ok" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Updates cannot include approval decision - use POST to complete the action"
    );
}

#[tokio::test]
async fn test_repeated_updates_never_change_status_or_result() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    let (_flow, action) = app.seed_flow_with_action(&workspace_id).await;

    for content in ["draft one", "draft two"] {
        let response = app
            .client
            .put(app.api(&format!(
                "/workspaces/{workspace_id}/flow_actions/{}",
                action.id
            )))
            .json(&serde_json::json!({ "userResponse": { "content": content } }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["actionStatus"], "pending");
        assert_eq!(body["actionResult"], "");
    }
}

#[tokio::test]
async fn test_user_action_signalling() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    app.seed_flow(&workspace_id, "flow_1", FLOW_STATUS_IN_PROGRESS)
        .await;

    // unknown action type (message body shape)
    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/flows/flow_1/user_action"
        )))
        .json(&serde_json::json!({ "actionType": "jump" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Unknown action type: jump");

    // missing flow
    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/flows/flow_missing/user_action"
        )))
        .json(&serde_json::json!({ "actionType": "go_next_step" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Flow not found");

    // accepted action reaches the workflow as a signal
    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/flows/flow_1/user_action"
        )))
        .json(&serde_json::json!({ "actionType": "go_next_step" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let signals = app.engine.recorded_signals();
    assert!(signals
        .iter()
        .any(|s| s.workflow_id == "flow_1" && s.name == "user_action"));
}

#[tokio::test]
async fn test_action_list_requires_existing_flow() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;

    let response = app
        .client
        .get(app.api(&format!(
            "/workspaces/{workspace_id}/flow/flow_missing/actions"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // an existing flow with no actions is an empty list, not null
    app.seed_flow(&workspace_id, "flow_empty", FLOW_STATUS_IN_PROGRESS)
        .await;
    let body: Value = app
        .client
        .get(app.api(&format!(
            "/workspaces/{workspace_id}/flow/flow_empty/actions"
        )))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["actions"], serde_json::json!([]));
}

#[tokio::test]
async fn test_pause_and_resume_signals() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    app.seed_flow(&workspace_id, "flow_1", FLOW_STATUS_IN_PROGRESS)
        .await;

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/flows/flow_1/pause")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "paused");

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/flows/flow_1/resume")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "in_progress");
}
