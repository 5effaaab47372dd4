//! Workflow data model: the validated descriptor a job carries, the closed
//! set of step actions, and execution options.
//!
//! A `Step` is a tagged sum type over the 8 supported actions — an unknown
//! action can never survive deserialization, and the executor's dispatch is
//! an exhaustive `match` instead of a runtime default case.

pub mod ssrf;
pub mod validate;

use serde::{Deserialize, Serialize};

/// Maximum number of steps a workflow may contain.
pub const MAX_STEPS: usize = 25;

/// Maximum accepted submission body size in bytes (checked before parsing).
pub const MAX_BODY_BYTES: usize = 50 * 1024;

/// Execution timeout bounds in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Per-step wait bound in milliseconds.
pub const MAX_WAIT_MS: u64 = 60_000;

/// Viewport bounds in pixels.
pub const MIN_VIEWPORT_DIM: u32 = 100;
pub const MAX_VIEWPORT_WIDTH: u32 = 3840;
pub const MAX_VIEWPORT_HEIGHT: u32 = 2160;

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 800;

/// One browser-automation action with its action-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Step {
    Goto {
        url: String,
    },
    Wait {
        duration: u64,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        value: String,
    },
    WaitForSelector {
        selector: String,
    },
    Screenshot {
        #[serde(rename = "fullPage", default, skip_serializing_if = "Option::is_none")]
        full_page: Option<bool>,
    },
    WaitForDownload,
    Evaluate {
        script: String,
    },
}

impl Step {
    /// The wire name of this step's action (matches the serde tag).
    pub fn action(&self) -> &'static str {
        match self {
            Step::Goto { .. } => "goto",
            Step::Wait { .. } => "wait",
            Step::Click { .. } => "click",
            Step::Type { .. } => "type",
            Step::WaitForSelector { .. } => "waitForSelector",
            Step::Screenshot { .. } => "screenshot",
            Step::WaitForDownload => "waitForDownload",
            Step::Evaluate { .. } => "evaluate",
        }
    }

    /// The URL this step targets, if the action exposes one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Step::Goto { url } => Some(url),
            _ => None,
        }
    }
}

/// Ordered step sequence — the unit of work a job executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

/// Optional execution tuning supplied alongside the workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl WorkflowOptions {
    /// Effective wall-clock budget in milliseconds.
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    /// Effective viewport, falling back to 1280×800.
    pub fn effective_viewport(&self) -> Viewport {
        self.viewport.unwrap_or_default()
    }
}

/// A validated submission. Immutable once created — the Job Store persists
/// it verbatim and the executor only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    pub workflow: Workflow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<WorkflowOptions>,
}

impl WorkflowDescriptor {
    pub fn effective_timeout_ms(&self) -> u64 {
        self.options
            .as_ref()
            .map(WorkflowOptions::effective_timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn effective_viewport(&self) -> Viewport {
        self.options
            .as_ref()
            .map(WorkflowOptions::effective_viewport)
            .unwrap_or_default()
    }
}
