//! Conversion between the JSON text view and the in-memory graph
//!
//! `to_text` pretty-prints a definition with stable key order. `from_text`
//! parses, normalizes, lays out and validates; a definition is handed back
//! for adoption only when validation passes. The [`ModeController`] gates
//! switching between the visual canvas and the code editor: leaving code
//! mode with unsaved edits requires those edits to adopt cleanly.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::LayoutConfig;
use crate::error::{Result, WorkflowSyncError};
use crate::events::EditorMode;
use crate::normalize::{auto_layout_nodes_with, normalize_edges, normalize_nodes, NormalizationReport};
use crate::types::{Issue, WorkflowDefinition, WorkflowSettings, WorkflowValidationResult};
use crate::validation::{ValidationOutcome, Validator};

/// Pretty-printed JSON with stable key ordering
pub fn to_text(definition: &WorkflowDefinition) -> Result<String> {
    Ok(serde_json::to_string_pretty(definition)?)
}

/// Parse and normalize JSON text without validating it.
///
/// Returns the parse error message on malformed input.
pub fn parse_definition(
    text: &str,
    layout: &LayoutConfig,
) -> std::result::Result<(WorkflowDefinition, NormalizationReport), String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let Value::Object(mut root) = value else {
        return Err("Workflow definition must be a JSON object".to_string());
    };

    let raw_nodes = take_array(&mut root, "nodes")?;
    let raw_edges = take_array(&mut root, "edges")?;

    let metadata = match root.remove("metadata") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => return Err("\"metadata\" must be an object".to_string()),
    };
    let settings = match root.remove("settings") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<WorkflowSettings>(value)
                .map_err(|e| format!("Invalid settings: {}", e))?,
        ),
    };

    let nodes = normalize_nodes(&raw_nodes);
    let edges = normalize_edges(&raw_edges, &nodes);
    let nodes = auto_layout_nodes_with(&nodes, &edges, layout);

    let report = NormalizationReport {
        dropped_nodes: raw_nodes.len() - nodes.len(),
        dropped_edges: raw_edges.len() - edges.len(),
    };
    Ok((
        WorkflowDefinition {
            nodes,
            edges,
            metadata,
            settings,
        },
        report,
    ))
}

fn take_array(root: &mut Map<String, Value>, key: &str) -> std::result::Result<Vec<Value>, String> {
    match root.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(format!("\"{}\" must be an array", key)),
    }
}

/// Result of ingesting JSON text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FromTextOutcome {
    /// Present only when the text parsed and validated
    pub definition: Option<WorkflowDefinition>,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub report: NormalizationReport,
    /// Full validation result, when validation ran
    pub validation: Option<WorkflowValidationResult>,
}

impl FromTextOutcome {
    fn parse_failure(message: String) -> Self {
        Self {
            errors: vec![Issue::new(message)],
            ..Self::default()
        }
    }

    pub fn is_adoptable(&self) -> bool {
        self.definition.is_some()
    }

    /// Convert into the adopted definition or the blocking error
    pub fn into_result(self) -> Result<WorkflowDefinition> {
        match self.definition {
            Some(definition) => Ok(definition),
            None if self.validation.is_none() => Err(WorkflowSyncError::Parse(
                self.errors
                    .into_iter()
                    .next()
                    .map(|issue| issue.message)
                    .unwrap_or_default(),
            )),
            None => Err(WorkflowSyncError::validation(self.errors)),
        }
    }
}

/// Text/graph converter bound to a validator and layout spacing
pub struct CodeSync {
    validator: Arc<Validator>,
    layout: LayoutConfig,
}

impl CodeSync {
    pub fn new(validator: Arc<Validator>) -> Self {
        Self {
            validator,
            layout: LayoutConfig::default(),
        }
    }

    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    pub fn to_text(&self, definition: &WorkflowDefinition) -> Result<String> {
        to_text(definition)
    }

    /// Parse, normalize, lay out and validate JSON text.
    ///
    /// Never fails: every problem is reported in the outcome.
    pub async fn from_text(&self, text: &str) -> FromTextOutcome {
        let (definition, report) = match parse_definition(text, &self.layout) {
            Ok(parsed) => parsed,
            Err(message) => {
                log::debug!("Rejecting code text: {}", message);
                return FromTextOutcome::parse_failure(message);
            }
        };

        let mut warnings = Vec::new();
        if report.dropped_nodes > 0 {
            warnings.push(Issue::at(
                format!("{} node(s) without an id or type were dropped", report.dropped_nodes),
                "nodes",
            ));
        }
        if report.dropped_edges > 0 {
            warnings.push(Issue::at(
                format!("{} edge(s) referencing missing nodes were dropped", report.dropped_edges),
                "edges",
            ));
        }

        let result = match self.validator.validate(definition.clone()).await {
            Ok(ValidationOutcome::Completed(result)) => result,
            Ok(ValidationOutcome::Superseded) => {
                return FromTextOutcome {
                    errors: vec![Issue::new("Validation was superseded by a newer request")],
                    warnings,
                    report,
                    ..FromTextOutcome::default()
                }
            }
            Err(e) => WorkflowValidationResult::from_issues(
                vec![Issue::new(format!("Schema validation unavailable: {}", e))],
                vec![],
                Default::default(),
            ),
        };

        warnings.extend(result.warnings.iter().cloned());
        FromTextOutcome {
            definition: result.valid.then_some(definition),
            errors: result.errors.clone(),
            warnings,
            report,
            validation: Some(result),
        }
    }
}

/// Outcome of a mode switch request
#[derive(Debug, Clone, PartialEq)]
pub enum ModeTransition {
    /// Already in the requested mode
    Unchanged,
    /// Code mode entered; `text` is the captured definition
    EnteredCode { text: String },
    /// Back in visual mode; `adopted` holds the re-ingested definition when
    /// the text had unsaved edits
    LeftCode {
        adopted: Option<WorkflowDefinition>,
        warnings: Vec<Issue>,
    },
    /// Edits did not adopt; mode stays `Code`
    Blocked { errors: Vec<Issue> },
}

/// Visual/Code mode state machine
#[derive(Debug, Default)]
pub struct ModeController {
    mode: EditorMode,
    text: String,
    dirty: bool,
}

impl ModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    /// Current code text (only in code mode)
    pub fn text(&self) -> Option<&str> {
        (self.mode == EditorMode::Code).then_some(self.text.as_str())
    }

    /// Whether the code text has edits not yet adopted
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Enter code mode, capturing the definition as text
    pub fn enter_code(&mut self, definition: &WorkflowDefinition) -> Result<ModeTransition> {
        if self.mode == EditorMode::Code {
            return Ok(ModeTransition::Unchanged);
        }
        self.text = to_text(definition)?;
        self.dirty = false;
        self.mode = EditorMode::Code;
        Ok(ModeTransition::EnteredCode {
            text: self.text.clone(),
        })
    }

    /// Replace the code text. Ignored outside code mode.
    pub fn edit_text(&mut self, text: impl Into<String>) {
        if self.mode != EditorMode::Code {
            log::warn!("Ignoring code edit while in visual mode");
            return;
        }
        let text = text.into();
        if text != self.text {
            self.text = text;
            self.dirty = true;
        }
    }

    /// Try to return to visual mode.
    ///
    /// Dirty text is silently re-ingested first; if that fails the
    /// transition is blocked and the text is kept for further editing.
    pub async fn leave_code(&mut self, sync: &CodeSync) -> ModeTransition {
        if self.mode == EditorMode::Visual {
            return ModeTransition::Unchanged;
        }
        if !self.dirty {
            self.finish_leave();
            return ModeTransition::LeftCode {
                adopted: None,
                warnings: vec![],
            };
        }

        let outcome = sync.from_text(&self.text).await;
        match outcome.definition {
            Some(definition) => {
                self.finish_leave();
                ModeTransition::LeftCode {
                    adopted: Some(definition),
                    warnings: outcome.warnings,
                }
            }
            None => {
                log::info!(
                    "Blocked leaving code mode: {}",
                    outcome.errors.first().map_or("invalid definition", |e| e.message.as_str())
                );
                ModeTransition::Blocked {
                    errors: outcome.errors,
                }
            }
        }
    }

    /// Discard code edits and return to visual mode unconditionally
    pub fn discard_code(&mut self) {
        self.finish_leave();
    }

    fn finish_leave(&mut self) {
        self.mode = EditorMode::Visual;
        self.text.clear();
        self.dirty = false;
    }
}
