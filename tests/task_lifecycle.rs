//! End-to-end tests for the task lifecycle: creation rules, status
//! filtering, cancellation, archival, and the task response shape.

mod common;

use common::TestApp;
use serde_json::Value;
use sidekick_api::domain::TaskStatus;
use sidekick_api::storage::Storage;
use sidekick_api::workflow::{RunStatus, WorkflowClient};

#[tokio::test]
async fn test_create_task_happy_path() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks")))
        .json(&serde_json::json!({ "description": "x", "flowType": "basic_dev" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let task: Value = response.json().await.unwrap();
    assert_eq!(task["agentType"], "llm");
    assert_eq!(task["status"], "to_do");
    assert_eq!(task["flowType"], "basic_dev");
    assert_eq!(task["description"], "x");

    let id = task["id"].as_str().unwrap();
    assert!(id.starts_with("task_"));

    // timestamps: trailing Z, within a second of wall clock, updated >= created
    let created = task["created"].as_str().unwrap();
    let updated = task["updated"].as_str().unwrap();
    assert!(created.ends_with('Z'));
    assert!(updated.ends_with('Z'));
    let created_at = chrono::DateTime::parse_from_rfc3339(created).unwrap();
    let age = chrono::Utc::now().signed_duration_since(created_at);
    assert!(age.num_seconds().abs() < 2, "created should be fresh, got {created}");
    assert!(updated >= created);

    // a to_do task starts a workflow which persists its flow
    let flows = task["flows"].as_array().unwrap();
    assert_eq!(flows.len(), 1);
    assert!(flows[0]["id"].as_str().unwrap().starts_with("flow_"));
    assert_eq!(flows[0]["parentId"], id);

    // GET wraps the same flattened shape under "task"
    let response = app
        .client
        .get(app.api(&format!("/workspaces/{workspace_id}/tasks/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["task"]["id"], id);
    assert_eq!(body["task"]["agentType"], "llm");
    assert!(body["task"]["flows"].is_array());
}

#[tokio::test]
async fn test_create_rejects_drafting_llm_combo() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks")))
        .json(&serde_json::json!({
            "status": "drafting",
            "agentType": "llm",
            "flowType": "basic_dev"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "When task status is 'drafting', the agent type must be 'human'"
    );
}

#[tokio::test]
async fn test_create_rejects_agent_none_and_unknown_agent() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks")))
        .json(&serde_json::json!({ "agentType": "none" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Creating a task with agent type set to \"none\" is not allowed"
    );

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks")))
        .json(&serde_json::json!({ "agentType": "robot" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid agent type: \"robot\"");
}

#[tokio::test]
async fn test_create_rejects_non_initial_status() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks")))
        .json(&serde_json::json!({ "status": "in_progress" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Creating a task with status set to anything other than 'drafting' or 'to_do' is not allowed"
    );
}

#[tokio::test]
async fn test_drafting_task_defaults_to_human_and_starts_no_workflow() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks")))
        .json(&serde_json::json!({ "status": "drafting", "flowType": "basic_dev" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let task: Value = response.json().await.unwrap();
    assert_eq!(task["agentType"], "human");
    assert_eq!(task["status"], "drafting");
    assert_eq!(task["flows"], serde_json::json!([]));
}

#[tokio::test]
async fn test_cancel_to_do_task_then_cancel_again() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks")))
        .json(&serde_json::json!({ "description": "cancel me", "flowType": "basic_dev" }))
        .send()
        .await
        .unwrap();
    let task: Value = response.json().await.unwrap();
    let id = task["id"].as_str().unwrap().to_string();
    let flow_id = task["flows"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks/{id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app
        .client
        .get(app.api(&format!("/workspaces/{workspace_id}/tasks/{id}")))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["task"]["status"], "canceled");
    assert_eq!(body["task"]["agentType"], "none");

    // the associated workflow run was terminated
    let run = app.engine.get_workflow(&flow_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Terminated);

    // canceling a canceled task is a rule violation
    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks/{id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Only tasks with status 'to_do', 'in_progress', 'blocked', or 'in_review' can be canceled"
    );
}

#[tokio::test]
async fn test_update_bumps_updated_strictly() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    let task = app.seed_task(&workspace_id, TaskStatus::ToDo).await;

    let response = app
        .client
        .put(app.api(&format!("/workspaces/{workspace_id}/tasks/{}", task.id)))
        .json(&serde_json::json!({ "title": "renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["title"], "renamed");

    let updated = chrono::DateTime::parse_from_rfc3339(body["updated"].as_str().unwrap()).unwrap();
    assert!(updated.timestamp_nanos_opt().unwrap() > task.updated.timestamp_nanos_opt().unwrap());
}

#[tokio::test]
async fn test_update_rejects_unknown_enums_and_missing_task() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    let task = app.seed_task(&workspace_id, TaskStatus::ToDo).await;

    let response = app
        .client
        .put(app.api(&format!("/workspaces/{workspace_id}/tasks/{}", task.id)))
        .json(&serde_json::json!({ "status": "bogus" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = app
        .client
        .put(app.api(&format!("/workspaces/{workspace_id}/tasks/task_missing")))
        .json(&serde_json::json!({ "title": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Task not found");
}

#[tokio::test]
async fn test_status_filter_tolerates_unknown_values() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    app.seed_task(&workspace_id, TaskStatus::ToDo).await;
    app.seed_task(&workspace_id, TaskStatus::InReview).await;
    app.seed_task(&workspace_id, TaskStatus::Complete).await;

    let list = |statuses: &str| {
        let url = app.api(&format!(
            "/workspaces/{workspace_id}/tasks?statuses={statuses}"
        ));
        let client = app.client.clone();
        async move {
            let body: Value = client.get(url).send().await.unwrap().json().await.unwrap();
            body["tasks"].as_array().unwrap().len()
        }
    };

    assert_eq!(list("all").await, 3);
    assert_eq!(list("to_do").await, 1);
    assert_eq!(list("to_do,in_review").await, 2);
    // unknown values are tolerated; the valid part still filters
    assert_eq!(list("to_do,bogus").await, 1);
    // nothing valid: no filter applied
    assert_eq!(list("bogus").await, 3);
}

#[tokio::test]
async fn test_archive_finished_counts_terminal_tasks_only() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    app.seed_task(&workspace_id, TaskStatus::Complete).await;
    app.seed_task(&workspace_id, TaskStatus::Canceled).await;
    app.seed_task(&workspace_id, TaskStatus::Failed).await;
    let running = app.seed_task(&workspace_id, TaskStatus::InProgress).await;

    let response = app
        .client
        .post(app.api(&format!("/workspaces/{workspace_id}/tasks/archive_finished")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["archivedCount"], 3);

    // the in-progress task is untouched
    let stored = app
        .storage
        .get_task(&workspace_id, &running.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.archived.is_none());
}

#[tokio::test]
async fn test_archive_single_task_rules() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    let active = app.seed_task(&workspace_id, TaskStatus::InProgress).await;
    let done = app.seed_task(&workspace_id, TaskStatus::Complete).await;

    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/tasks/{}/archive",
            active.id
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/tasks/{}/archive",
            done.id
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    // archiving stamps the timestamp without touching status
    assert_eq!(body["status"], "complete");
    assert!(body["archived"].as_str().unwrap().ends_with('Z'));

    let response = app
        .client
        .post(app.api(&format!(
            "/workspaces/{workspace_id}/tasks/task_missing/archive"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_archived_list_pagination() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    for _ in 0..5 {
        let task = app.seed_task(&workspace_id, TaskStatus::Complete).await;
        app.client
            .post(app.api(&format!(
                "/workspaces/{workspace_id}/tasks/{}/archive",
                task.id
            )))
            .send()
            .await
            .unwrap();
    }

    let response = app
        .client
        .get(app.api(&format!(
            "/workspaces/{workspace_id}/tasks/archived?page=1&pageSize=2"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["totalCount"], 5);
    assert_eq!(body["page"], 1);
    assert_eq!(body["pageSize"], 2);
    assert_eq!(body["tasks"].as_array().unwrap().len(), 2);

    // archived tasks are excluded from the live list
    let body: Value = app
        .client
        .get(app.api(&format!("/workspaces/{workspace_id}/tasks")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["tasks"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_delete_task_is_hard() {
    let app = TestApp::spawn().await;
    let workspace_id = app.create_workspace().await;
    let task = app.seed_task(&workspace_id, TaskStatus::ToDo).await;

    let response = app
        .client
        .delete(app.api(&format!("/workspaces/{workspace_id}/tasks/{}", task.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = app
        .client
        .get(app.api(&format!("/workspaces/{workspace_id}/tasks/{}", task.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_create_task_in_unknown_workspace_is_404() {
    let app = TestApp::spawn().await;
    let response = app
        .client
        .post(app.api("/workspaces/ws_missing/tasks"))
        .json(&serde_json::json!({ "description": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Workspace not found");
}
