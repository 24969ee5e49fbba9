//! Validation core: pure state-machine and enum checks for tasks and flow
//! actions.
//!
//! Nothing here touches storage or the workflow engine; handlers call these
//! functions before mutating anything, and the first violated rule becomes
//! the HTTP response. Error display strings are part of the API contract.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::flow_action::REQUEST_KIND_FREE_FORM;
use crate::domain::task::FLOW_TYPE_PLANNED_DEV;
use crate::domain::{AgentType, FlowAction, TaskStatus};

/// Task rule violations. Display strings are returned verbatim in error
/// bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskRuleError {
    #[error("Creating a task with agent type set to \"none\" is not allowed")]
    AgentTypeNone,
    #[error("Invalid agent type: \"{0}\"")]
    InvalidAgentType(String),
    #[error("When task status is 'drafting', the agent type must be 'human'")]
    DraftingRequiresHuman,
    #[error(
        "Creating a task with status set to anything other than 'drafting' or 'to_do' is not allowed"
    )]
    InvalidCreateStatus,
    #[error("Invalid task status: \"{0}\"")]
    InvalidStatus(String),
    #[error(
        "Only tasks with status 'to_do', 'in_progress', 'blocked', or 'in_review' can be canceled"
    )]
    NotCancelable,
    #[error("Only tasks with status 'complete', 'canceled', or 'failed' can be archived")]
    NotArchivable,
}

/// Flow action rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionRuleError {
    #[error("only human actions can be completed")]
    NotHumanAction,
    #[error("Flow action is not a callback action")]
    NotCallbackAction,
    #[error("Flow action status is not pending")]
    NotPending,
    #[error("User response cannot be empty")]
    EmptyResponse,
    #[error("Updates cannot include approval decision - use POST to complete the action")]
    ApprovalViaUpdate,
}

/// Outcome of the task creation checks: the normalized status/agent pair
/// plus flow options with the `planned_dev` nil-map normalization applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskShape {
    pub status: TaskStatus,
    pub agent_type: AgentType,
    pub flow_options: Option<Map<String, Value>>,
}

/// Validate and normalize a task creation payload.
///
/// Rules are applied in order; the first violation wins:
/// 1. an explicit agent type of `none` is rejected,
/// 2. an unrecognized agent type is rejected,
/// 3. `drafting` with an explicit non-`human` agent type is rejected,
/// 4. any status other than `drafting`/`to_do` (after defaulting) is
///    rejected.
///
/// Defaults: missing status becomes `to_do`; missing agent type becomes
/// `human` for drafting tasks and `llm` otherwise. For `planned_dev` flows
/// a nil options map is replaced with an empty one so downstream code can
/// assume non-nil; `planningPrompt` passes through verbatim inside it.
pub fn validate_new_task(
    status: Option<&str>,
    agent_type: Option<&str>,
    flow_type: &str,
    flow_options: Option<Map<String, Value>>,
) -> Result<NewTaskShape, TaskRuleError> {
    let agent = match agent_type {
        Some("none") => return Err(TaskRuleError::AgentTypeNone),
        Some(raw) => Some(
            raw.parse::<AgentType>()
                .map_err(|_| TaskRuleError::InvalidAgentType(raw.to_string()))?,
        ),
        None => None,
    };

    if status == Some("drafting") {
        if let Some(provided) = agent {
            if provided != AgentType::Human {
                return Err(TaskRuleError::DraftingRequiresHuman);
            }
        }
    }

    let status = match status {
        None => TaskStatus::ToDo,
        Some(raw) => match raw.parse::<TaskStatus>() {
            Ok(TaskStatus::Drafting) => TaskStatus::Drafting,
            Ok(TaskStatus::ToDo) => TaskStatus::ToDo,
            _ => return Err(TaskRuleError::InvalidCreateStatus),
        },
    };

    let agent_type = agent.unwrap_or(match status {
        TaskStatus::Drafting => AgentType::Human,
        _ => AgentType::Llm,
    });

    let flow_options = if flow_type == FLOW_TYPE_PLANNED_DEV {
        Some(flow_options.unwrap_or_default())
    } else {
        flow_options
    };

    Ok(NewTaskShape {
        status,
        agent_type,
        flow_options,
    })
}

/// Validate a task update payload. Returns the parsed fields; missing
/// fields stay untouched by the caller.
pub fn validate_task_update(
    current_status: TaskStatus,
    current_agent: AgentType,
    status: Option<&str>,
    agent_type: Option<&str>,
) -> Result<(TaskStatus, AgentType), TaskRuleError> {
    let status = match status {
        Some(raw) => raw
            .parse::<TaskStatus>()
            .map_err(|_| TaskRuleError::InvalidStatus(raw.to_string()))?,
        None => current_status,
    };
    let agent = match agent_type {
        Some(raw) => raw
            .parse::<AgentType>()
            .map_err(|_| TaskRuleError::InvalidAgentType(raw.to_string()))?,
        None => current_agent,
    };

    if status == TaskStatus::Drafting && agent == AgentType::Llm {
        return Err(TaskRuleError::DraftingRequiresHuman);
    }

    Ok((status, agent))
}

/// Check that a task may be canceled from its current status.
pub fn validate_task_cancel(status: TaskStatus) -> Result<(), TaskRuleError> {
    if status.is_cancelable() {
        Ok(())
    } else {
        Err(TaskRuleError::NotCancelable)
    }
}

/// Check that a task may be archived (terminal statuses only). Archiving
/// never changes `status`.
pub fn validate_task_archive(status: TaskStatus) -> Result<(), TaskRuleError> {
    if status.is_finished() {
        Ok(())
    } else {
        Err(TaskRuleError::NotArchivable)
    }
}

/// Shared target checks for completing or updating a flow action: the
/// action must be a human callback action that is still pending.
pub fn validate_action_target(action: &FlowAction) -> Result<(), ActionRuleError> {
    if !action.is_human_action {
        return Err(ActionRuleError::NotHumanAction);
    }
    if !action.is_callback_action {
        return Err(ActionRuleError::NotCallbackAction);
    }
    if !action.is_pending() {
        return Err(ActionRuleError::NotPending);
    }
    Ok(())
}

/// Completion-specific check: free-form requests need non-empty trimmed
/// content.
pub fn validate_action_complete(
    action: &FlowAction,
    content: Option<&str>,
) -> Result<(), ActionRuleError> {
    validate_action_target(action)?;
    if action.request_kind() == Some(REQUEST_KIND_FREE_FORM)
        && content.is_none_or(|c| c.trim().is_empty())
    {
        return Err(ActionRuleError::EmptyResponse);
    }
    Ok(())
}

/// Update-specific check: approval decisions only travel through the
/// completion endpoint.
pub fn validate_action_update(
    action: &FlowAction,
    has_approval: bool,
) -> Result<(), ActionRuleError> {
    validate_action_target(action)?;
    if has_approval {
        return Err(ActionRuleError::ApprovalViaUpdate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow_action::{ActionStatus, PARAM_REQUEST_KIND};

    fn pending_action(human: bool, callback: bool, kind: Option<&str>) -> FlowAction {
        let mut params = Map::new();
        if let Some(kind) = kind {
            params.insert(
                PARAM_REQUEST_KIND.to_string(),
                Value::String(kind.to_string()),
            );
        }
        FlowAction {
            id: "fa_1".to_string(),
            workspace_id: "ws_1".to_string(),
            flow_id: "flow_1".to_string(),
            subflow_id: None,
            subflow_name: None,
            action_type: "user_request".to_string(),
            action_status: ActionStatus::Pending,
            action_params: params,
            action_result: String::new(),
            is_human_action: human,
            is_callback_action: callback,
            created: chrono::Utc::now(),
            updated: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_create_rejects_agent_none() {
        let err = validate_new_task(None, Some("none"), "basic_dev", None).unwrap_err();
        assert_eq!(err, TaskRuleError::AgentTypeNone);
        assert_eq!(
            err.to_string(),
            "Creating a task with agent type set to \"none\" is not allowed"
        );
    }

    #[test]
    fn test_create_rejects_unknown_agent() {
        let err = validate_new_task(None, Some("robot"), "basic_dev", None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid agent type: \"robot\"");
    }

    #[test]
    fn test_create_rejects_drafting_with_llm() {
        let err =
            validate_new_task(Some("drafting"), Some("llm"), "basic_dev", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "When task status is 'drafting', the agent type must be 'human'"
        );
    }

    #[test]
    fn test_create_rejects_non_initial_status() {
        for status in ["in_progress", "complete", "canceled", "bogus"] {
            let err = validate_new_task(Some(status), None, "basic_dev", None).unwrap_err();
            assert_eq!(err, TaskRuleError::InvalidCreateStatus);
        }
    }

    #[test]
    fn test_create_defaults() {
        let shape = validate_new_task(None, None, "basic_dev", None).unwrap();
        assert_eq!(shape.status, TaskStatus::ToDo);
        assert_eq!(shape.agent_type, AgentType::Llm);

        let shape = validate_new_task(Some("drafting"), None, "basic_dev", None).unwrap();
        assert_eq!(shape.agent_type, AgentType::Human);
    }

    #[test]
    fn test_planned_dev_normalizes_nil_options() {
        let shape = validate_new_task(None, None, "planned_dev", None).unwrap();
        assert_eq!(shape.flow_options, Some(Map::new()));

        // basic_dev preserves nil distinctly
        let shape = validate_new_task(None, None, "basic_dev", None).unwrap();
        assert_eq!(shape.flow_options, None);
    }

    #[test]
    fn test_planned_dev_preserves_planning_prompt() {
        let mut options = Map::new();
        options.insert(
            "planningPrompt".to_string(),
            Value::String("  keep me verbatim\n".to_string()),
        );
        let shape =
            validate_new_task(None, None, "planned_dev", Some(options.clone())).unwrap();
        assert_eq!(shape.flow_options, Some(options));
    }

    #[test]
    fn test_update_rejects_drafting_llm_combo() {
        let err = validate_task_update(
            TaskStatus::ToDo,
            AgentType::Llm,
            Some("drafting"),
            None,
        )
        .unwrap_err();
        assert_eq!(err, TaskRuleError::DraftingRequiresHuman);
    }

    #[test]
    fn test_update_rejects_unknown_enums() {
        assert!(matches!(
            validate_task_update(TaskStatus::ToDo, AgentType::Llm, Some("nope"), None),
            Err(TaskRuleError::InvalidStatus(_))
        ));
        assert!(matches!(
            validate_task_update(TaskStatus::ToDo, AgentType::Llm, None, Some("nope")),
            Err(TaskRuleError::InvalidAgentType(_))
        ));
    }

    #[test]
    fn test_cancel_rule_message() {
        assert!(validate_task_cancel(TaskStatus::InReview).is_ok());
        let err = validate_task_cancel(TaskStatus::Canceled).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Only tasks with status 'to_do', 'in_progress', 'blocked', or 'in_review' can be canceled"
        );
    }

    #[test]
    fn test_archive_rule() {
        assert!(validate_task_archive(TaskStatus::Failed).is_ok());
        assert!(validate_task_archive(TaskStatus::InProgress).is_err());
    }

    #[test]
    fn test_complete_requires_human_callback_pending() {
        let err = validate_action_complete(&pending_action(false, true, None), Some("x"))
            .unwrap_err();
        assert_eq!(err, ActionRuleError::NotHumanAction);

        let err = validate_action_complete(&pending_action(true, false, None), Some("x"))
            .unwrap_err();
        assert_eq!(err, ActionRuleError::NotCallbackAction);

        let mut done = pending_action(true, true, None);
        done.action_status = ActionStatus::Complete;
        let err = validate_action_complete(&done, Some("x")).unwrap_err();
        assert_eq!(err.to_string(), "Flow action status is not pending");
    }

    #[test]
    fn test_complete_rejects_blank_free_form_content() {
        let action = pending_action(true, true, Some(REQUEST_KIND_FREE_FORM));
        let err = validate_action_complete(&action, Some("  \n\t  ")).unwrap_err();
        assert_eq!(err.to_string(), "User response cannot be empty");
        assert!(validate_action_complete(&action, Some("test response")).is_ok());
        // non-free-form requests may omit content entirely
        let choice = pending_action(true, true, Some("choice"));
        assert!(validate_action_complete(&choice, None).is_ok());
    }

    #[test]
    fn test_update_rejects_approval() {
        let action = pending_action(true, true, None);
        let err = validate_action_update(&action, true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Updates cannot include approval decision - use POST to complete the action"
        );
        assert!(validate_action_update(&action, false).is_ok());
    }
}
