//! Named, parameterized workflow templates.
//!
//! The catalog is static and loaded once at startup. Rendering substitutes
//! `{{name}}` placeholders in the template's serialized JSON and parses the
//! result back into a submission, which must then pass the ordinary
//! validator before a job is created.
//!
//! Sharp edge, kept deliberately: substitution happens on the serialized
//! form, so a parameter value containing JSON-structural characters (quotes,
//! braces) can corrupt the rendered descriptor. The re-parse plus the
//! validator turn such corruption into a rejection rather than a hardened
//! escape — callers wanting literal quotes in a value do not get them.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::workflow::validate::{self, ValidationError};
use crate::workflow::WorkflowDescriptor;

/// Declared parameter of a template.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    /// Secret-bearing parameters (passwords); marked so clients can mask
    /// input. Serialized only when true.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub secure: bool,
}

impl ParamSpec {
    fn required_string(description: Option<&'static str>) -> Self {
        Self {
            kind: "string",
            required: true,
            description,
            secure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Workflow body with `{{name}}` placeholder tokens.
    pub workflow: Value,
    pub options: Value,
    pub parameters: BTreeMap<&'static str, ParamSpec>,
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("{name} is required")]
    MissingParameter { name: String },
    #[error("rendered template is not valid JSON: {0}")]
    CorruptRender(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl TemplateCatalog {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    pub fn list(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Render a template into a validated descriptor.
    pub async fn render(
        &self,
        id: &str,
        params: &serde_json::Map<String, Value>,
    ) -> Result<WorkflowDescriptor, TemplateError> {
        let template = self
            .get(id)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;

        for (name, spec) in &template.parameters {
            let supplied = params.get(*name).map(param_text);
            if spec.required && supplied.as_deref().map_or(true, str::is_empty) {
                return Err(TemplateError::MissingParameter {
                    name: (*name).to_string(),
                });
            }
        }

        let mut serialized = template.workflow.to_string();
        for (name, value) in params {
            serialized = serialized.replace(&format!("{{{{{name}}}}}"), &param_text(value));
        }
        let workflow: Value = serde_json::from_str(&serialized)
            .map_err(|e| TemplateError::CorruptRender(e.to_string()))?;

        let submission = json!({
            "workflow": workflow,
            "options": template.options,
        });
        Ok(validate::validate_value(&submission).await?)
    }
}

/// Textual form substituted into the serialized template.
fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            id: "screenshot",
            name: "Take Screenshot",
            description: "Navigate to a URL and take a screenshot",
            workflow: json!({"steps": [
                {"action": "goto", "url": "{{url}}"},
                {"action": "wait", "duration": 2000},
                {"action": "screenshot", "fullPage": true}
            ]}),
            options: json!({"timeout": 30000, "viewport": {"width": 1920, "height": 1080}}),
            parameters: BTreeMap::from([("url", ParamSpec::required_string(Some("URL to visit")))]),
        },
        Template {
            id: "pdf-export",
            name: "Export to PDF",
            description: "Navigate to a URL and export as PDF",
            workflow: json!({"steps": [
                {"action": "goto", "url": "{{url}}"},
                {"action": "wait", "duration": 3000},
                {"action": "evaluate", "script": "window.print()"}
            ]}),
            options: json!({"timeout": 40000, "viewport": {"width": 1920, "height": 1080}}),
            parameters: BTreeMap::from([("url", ParamSpec::required_string(Some("URL to visit")))]),
        },
        Template {
            id: "form-fill",
            name: "Fill Form",
            description: "Navigate to a form and fill it with data",
            workflow: json!({"steps": [
                {"action": "goto", "url": "{{url}}"},
                {"action": "waitForSelector", "selector": "{{form_selector}}"},
                {"action": "type", "selector": "{{field1_selector}}", "value": "{{field1_value}}"},
                {"action": "type", "selector": "{{field2_selector}}", "value": "{{field2_value}}"},
                {"action": "click", "selector": "{{submit_selector}}"},
                {"action": "wait", "duration": 2000},
                {"action": "screenshot", "fullPage": true}
            ]}),
            options: json!({"timeout": 60000, "viewport": {"width": 1280, "height": 800}}),
            parameters: BTreeMap::from([
                ("url", ParamSpec::required_string(None)),
                ("form_selector", ParamSpec::required_string(None)),
                ("field1_selector", ParamSpec::required_string(None)),
                ("field1_value", ParamSpec::required_string(None)),
                ("field2_selector", ParamSpec::required_string(None)),
                ("field2_value", ParamSpec::required_string(None)),
                ("submit_selector", ParamSpec::required_string(None)),
            ]),
        },
        Template {
            id: "monitor-changes",
            name: "Monitor Page Changes",
            description: "Visit a page periodically and detect changes",
            workflow: json!({"steps": [
                {"action": "goto", "url": "{{url}}"},
                {"action": "waitForSelector", "selector": "{{watch_selector}}"},
                {"action": "evaluate", "script": "document.querySelector(\"{{watch_selector}}\").innerText"},
                {"action": "screenshot", "fullPage": false}
            ]}),
            options: json!({"timeout": 30000, "viewport": {"width": 1920, "height": 1080}}),
            parameters: BTreeMap::from([
                ("url", ParamSpec::required_string(None)),
                (
                    "watch_selector",
                    ParamSpec::required_string(Some("CSS selector of element to watch")),
                ),
            ]),
        },
        Template {
            id: "scrape-data",
            name: "Scrape Data",
            description: "Extract data from a webpage",
            workflow: json!({"steps": [
                {"action": "goto", "url": "{{url}}"},
                {"action": "waitForSelector", "selector": "{{data_selector}}"},
                {"action": "evaluate", "script": "Array.from(document.querySelectorAll(\"{{data_selector}}\")).map(el => el.textContent)"}
            ]}),
            options: json!({"timeout": 30000, "viewport": {"width": 1920, "height": 1080}}),
            parameters: BTreeMap::from([
                ("url", ParamSpec::required_string(None)),
                (
                    "data_selector",
                    ParamSpec::required_string(Some("CSS selector of data elements")),
                ),
            ]),
        },
        Template {
            id: "login-flow",
            name: "Login Flow",
            description: "Automated login to a website",
            workflow: json!({"steps": [
                {"action": "goto", "url": "{{url}}"},
                {"action": "waitForSelector", "selector": "{{username_selector}}"},
                {"action": "type", "selector": "{{username_selector}}", "value": "{{username}}"},
                {"action": "type", "selector": "{{password_selector}}", "value": "{{password}}"},
                {"action": "click", "selector": "{{submit_selector}}"},
                {"action": "wait", "duration": 3000},
                {"action": "screenshot", "fullPage": true}
            ]}),
            options: json!({"timeout": 60000, "viewport": {"width": 1920, "height": 1080}}),
            parameters: BTreeMap::from([
                ("url", ParamSpec::required_string(None)),
                ("username_selector", ParamSpec::required_string(None)),
                ("password_selector", ParamSpec::required_string(None)),
                ("submit_selector", ParamSpec::required_string(None)),
                ("username", ParamSpec::required_string(None)),
                (
                    "password",
                    ParamSpec {
                        kind: "string",
                        required: true,
                        description: None,
                        secure: true,
                    },
                ),
            ]),
        },
    ]
}
