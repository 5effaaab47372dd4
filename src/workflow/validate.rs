//! Submission validation.
//!
//! `validate_submission` is the single gate between raw client input and a
//! persisted job: nothing reaches the Job Store or the queue without passing
//! it. Checks run cheapest-first — the byte-size ceiling before any parsing,
//! structure before per-step rules, and the SSRF lookup (which may hit DNS)
//! only for steps whose structural checks already passed. Validation stops
//! at the first failing rule and reports the offending field path.

use serde_json::Value;

use super::ssrf::{self, UrlPolicyError};
use super::{
    Step, Viewport, Workflow, WorkflowDescriptor, WorkflowOptions, MAX_BODY_BYTES, MAX_STEPS,
    MAX_TIMEOUT_MS, MAX_VIEWPORT_HEIGHT, MAX_VIEWPORT_WIDTH, MAX_WAIT_MS, MIN_TIMEOUT_MS,
    MIN_VIEWPORT_DIM,
};

/// The actions a submission may use, in wire form.
pub const ALLOWED_ACTIONS: &[&str] = &[
    "goto",
    "wait",
    "click",
    "type",
    "waitForSelector",
    "screenshot",
    "waitForDownload",
    "evaluate",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("payload of {actual} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize, actual: usize },
    #[error("body is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("{field}: {message}")]
    Field { field: String, message: String },
    #[error("workflow.steps.{index}.url: {source}")]
    BlockedUrl {
        index: usize,
        #[source]
        source: UrlPolicyError,
    },
}

impl ValidationError {
    fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Dotted path of the offending field, used as the `details` key in the
    /// 422 response body.
    pub fn field_path(&self) -> String {
        match self {
            Self::PayloadTooLarge { .. } => "body".into(),
            Self::MalformedJson(_) => "body".into(),
            Self::Field { field, .. } => field.clone(),
            Self::BlockedUrl { index, .. } => format!("workflow.steps.{index}.url"),
        }
    }

    /// Human-readable message without the field-path prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Field { message, .. } => message.clone(),
            Self::BlockedUrl { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }
}

/// Validate a raw submission body into an immutable descriptor.
///
/// Async because the SSRF check may resolve hostnames.
pub async fn validate_submission(raw: &[u8]) -> Result<WorkflowDescriptor, ValidationError> {
    if raw.len() > MAX_BODY_BYTES {
        return Err(ValidationError::PayloadTooLarge {
            limit: MAX_BODY_BYTES,
            actual: raw.len(),
        });
    }
    let body: Value =
        serde_json::from_slice(raw).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
    validate_value(&body).await
}

/// Validate an already-parsed submission (used for template-rendered
/// descriptors, which exist as JSON before they are ever bytes on a wire).
pub async fn validate_value(body: &Value) -> Result<WorkflowDescriptor, ValidationError> {
    let workflow = body
        .get("workflow")
        .filter(|w| w.is_object())
        .ok_or_else(|| ValidationError::field("workflow", "workflow is required and must be an object"))?;

    let steps = workflow
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationError::field("workflow.steps", "steps is required and must be an array"))?;

    if steps.is_empty() {
        return Err(ValidationError::field(
            "workflow.steps",
            "steps must contain at least 1 item",
        ));
    }
    if steps.len() > MAX_STEPS {
        return Err(ValidationError::field(
            "workflow.steps",
            format!("steps must not have more than {MAX_STEPS} items"),
        ));
    }

    let options = match body.get("options") {
        Some(opts) if !opts.is_null() => Some(validate_options(opts)?),
        _ => None,
    };

    let mut typed = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        typed.push(validate_step(i, step).await?);
    }

    Ok(WorkflowDescriptor {
        workflow: Workflow { steps: typed },
        options,
    })
}

fn validate_options(opts: &Value) -> Result<WorkflowOptions, ValidationError> {
    if !opts.is_object() {
        return Err(ValidationError::field("options", "options must be an object"));
    }

    let timeout = match opts.get("timeout") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let t = v.as_u64().filter(|t| (MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(t)).ok_or_else(|| {
                ValidationError::field(
                    "options.timeout",
                    format!("timeout must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}"),
                )
            })?;
            Some(t)
        }
    };

    let viewport = match opts.get("viewport") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let width = v.get("width").and_then(Value::as_u64);
            let height = v.get("height").and_then(Value::as_u64);
            let (width, height) = match (width, height) {
                (Some(w), Some(h)) => (w, h),
                _ => {
                    return Err(ValidationError::field(
                        "options.viewport",
                        "both width and height are required",
                    ))
                }
            };
            let w_ok = (MIN_VIEWPORT_DIM as u64..=MAX_VIEWPORT_WIDTH as u64).contains(&width);
            let h_ok = (MIN_VIEWPORT_DIM as u64..=MAX_VIEWPORT_HEIGHT as u64).contains(&height);
            if !w_ok || !h_ok {
                return Err(ValidationError::field(
                    "options.viewport",
                    format!(
                        "width must be {MIN_VIEWPORT_DIM}-{MAX_VIEWPORT_WIDTH}, height must be {MIN_VIEWPORT_DIM}-{MAX_VIEWPORT_HEIGHT}"
                    ),
                ));
            }
            Some(Viewport {
                width: width as u32,
                height: height as u32,
            })
        }
    };

    Ok(WorkflowOptions { timeout, viewport })
}

/// Validate one step: action allow-list, then the action's own required
/// field rules, then (for URL-bearing actions) the SSRF policy.
async fn validate_step(index: usize, step: &Value) -> Result<Step, ValidationError> {
    let path = |suffix: &str| format!("workflow.steps.{index}.{suffix}");

    let action = step
        .get("action")
        .and_then(Value::as_str)
        .filter(|a| ALLOWED_ACTIONS.contains(a))
        .ok_or_else(|| {
            ValidationError::field(
                path("action"),
                format!("action must be one of: {}", ALLOWED_ACTIONS.join(", ")),
            )
        })?;

    let string_field = |name: &str| -> Result<String, ValidationError> {
        step.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| {
                ValidationError::field(path(name), format!("{name} is required and must be a string"))
            })
    };

    let typed = match action {
        "goto" => {
            let url = string_field("url")?;
            ssrf::check_url(&url)
                .await
                .map_err(|source| ValidationError::BlockedUrl { index, source })?;
            Step::Goto { url }
        }
        "wait" => {
            let duration = step
                .get("duration")
                .and_then(Value::as_u64)
                .filter(|d| *d <= MAX_WAIT_MS)
                .ok_or_else(|| {
                    ValidationError::field(
                        path("duration"),
                        format!("duration is required and must be between 0 and {MAX_WAIT_MS}ms"),
                    )
                })?;
            Step::Wait { duration }
        }
        "click" => Step::Click {
            selector: string_field("selector")?,
        },
        "type" => Step::Type {
            selector: string_field("selector")?,
            value: string_field("value")?,
        },
        "waitForSelector" => Step::WaitForSelector {
            selector: string_field("selector")?,
        },
        "screenshot" => {
            let full_page = match step.get("fullPage") {
                None | Some(Value::Null) => None,
                Some(Value::Bool(b)) => Some(*b),
                Some(_) => {
                    return Err(ValidationError::field(
                        path("fullPage"),
                        "fullPage must be a boolean",
                    ))
                }
            };
            Step::Screenshot { full_page }
        }
        "waitForDownload" => Step::WaitForDownload,
        "evaluate" => Step::Evaluate {
            script: string_field("script")?,
        },
        // Unreachable: the allow-list filter above has already matched.
        other => {
            return Err(ValidationError::field(
                path("action"),
                format!("unknown action: {other}"),
            ))
        }
    };

    Ok(typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn accepts_minimal_submission() {
        let body = json!({"workflow": {"steps": [{"action": "goto", "url": "http://example.com"}]}});
        let desc = validate_value(&body).await.unwrap();
        assert_eq!(desc.workflow.steps.len(), 1);
        assert!(desc.options.is_none());
    }

    #[tokio::test]
    async fn reports_first_failure_only() {
        // Both the duration and a later step are invalid; the earlier field wins.
        let body = json!({"workflow": {"steps": [
            {"action": "wait", "duration": 999_999},
            {"action": "bogus"}
        ]}});
        let err = validate_value(&body).await.unwrap_err();
        assert_eq!(err.field_path(), "workflow.steps.0.duration");
    }

    #[tokio::test]
    async fn viewport_requires_both_dimensions() {
        let body = json!({
            "workflow": {"steps": [{"action": "screenshot"}]},
            "options": {"viewport": {"width": 1280}}
        });
        let err = validate_value(&body).await.unwrap_err();
        assert_eq!(err.field_path(), "options.viewport");
        assert_eq!(err.detail(), "both width and height are required");
    }

    #[tokio::test]
    async fn timeout_bounds_enforced() {
        for bad in [999u64, 120_001] {
            let body = json!({
                "workflow": {"steps": [{"action": "screenshot"}]},
                "options": {"timeout": bad}
            });
            let err = validate_value(&body).await.unwrap_err();
            assert_eq!(err.field_path(), "options.timeout", "timeout {bad} should fail");
        }
    }

    #[tokio::test]
    async fn size_ceiling_precedes_parsing() {
        // Oversized garbage: must fail on size, not on JSON syntax.
        let raw = vec![b'x'; MAX_BODY_BYTES + 1];
        match validate_submission(&raw).await.unwrap_err() {
            ValidationError::PayloadTooLarge { limit, actual } => {
                assert_eq!(limit, MAX_BODY_BYTES);
                assert_eq!(actual, MAX_BODY_BYTES + 1);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ssrf_rejection_carries_step_index() {
        let body = json!({"workflow": {"steps": [
            {"action": "wait", "duration": 100},
            {"action": "goto", "url": "http://127.0.0.1/admin"}
        ]}});
        let err = validate_value(&body).await.unwrap_err();
        assert_eq!(err.field_path(), "workflow.steps.1.url");
        assert!(err.detail().contains("internal/private"));
    }
}
