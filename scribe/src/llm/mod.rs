//! Provider-agnostic generation adapter.
//!
//! One contract for every writing task: a prompt template with named
//! placeholders, a variables map, and an optional output schema. The adapter
//! renders the template, applies learning-mode augmentation, calls the active
//! backend and, for structured requests, validates the reply against the
//! schema before returning it.

pub mod backend;

use anyhow::{Context, Result};
use jsonschema::Draft;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::error::{Generation, Validation};
use crate::io::git::Git;
use crate::io::settings::Settings;
use backend::{Backend, CompletionRequest, GENERATION_TEMPERATURE, backend_for};

pub const COMMIT_FULL_TEMPLATE: &str = include_str!("prompts/commit_full.md");
pub const COMMIT_SIMPLE_TEMPLATE: &str = include_str!("prompts/commit_simple.md");
pub const PR_DESCRIPTION_TEMPLATE: &str = include_str!("prompts/pr_description.md");
pub const PR_TITLE_TEMPLATE: &str = include_str!("prompts/pr_title.md");
pub const CHANGELOG_TEMPLATE: &str = include_str!("prompts/changelog.md");
pub const REFINE_TEMPLATE: &str = include_str!("prompts/refine.md");

pub const PR_TITLE_SCHEMA: &str = include_str!("schemas/pr_title.schema.json");
pub const CHANGELOG_SCHEMA: &str = include_str!("schemas/changelog_entries.schema.json");

/// A single generation call. Immutable once constructed; refinement
/// iterations build a fresh request with feedback as a new variable.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Minijinja template source with named placeholders.
    pub template: &'static str,
    pub variables: Map<String, Value>,
    /// JSON Schema source for structured output; `None` for free text.
    pub output_schema: Option<&'static str>,
    /// Opt in to the learning-mode example for this call. Structured calls
    /// leave this off: the extra tokens degrade schema-constrained output.
    pub learning_example: bool,
}

impl GenerationRequest {
    pub fn free_text(template: &'static str, variables: Map<String, Value>) -> Self {
        Self {
            template,
            variables,
            output_schema: None,
            learning_example: true,
        }
    }

    pub fn structured(
        template: &'static str,
        variables: Map<String, Value>,
        schema: &'static str,
    ) -> Self {
        Self {
            template,
            variables,
            output_schema: Some(schema),
            learning_example: false,
        }
    }

    pub fn without_learning_example(mut self) -> Self {
        self.learning_example = false;
        self
    }
}

/// Result of a generation call. Transient; held only by the calling stage.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    FreeText(String),
    Structured(Value),
}

impl GenerationResult {
    /// The free-text content, or an error for structured results.
    pub fn into_text(self) -> Result<String> {
        match self {
            Self::FreeText(text) => Ok(text),
            Self::Structured(_) => Err(anyhow::anyhow!("expected free text, got structured output")),
        }
    }

    /// The structured object, or an error for free-text results.
    pub fn into_object(self) -> Result<Value> {
        match self {
            Self::Structured(value) => Ok(value),
            Self::FreeText(_) => Err(anyhow::anyhow!("expected structured output, got free text")),
        }
    }
}

/// Run one generation call against the active provider.
///
/// The settings snapshot is resolved by the caller at task entry; this
/// function never reads ambient state mid-operation.
#[instrument(skip_all, fields(structured = request.output_schema.is_some()))]
pub fn generate(git: &Git, settings: &Settings, request: &GenerationRequest) -> Result<GenerationResult> {
    let backend = backend_for(settings)?;
    generate_with(backend.as_ref(), git, settings, request)
}

/// Same as [`generate`] but with an explicit backend (scripted in tests).
pub fn generate_with(
    backend: &dyn Backend,
    git: &Git,
    settings: &Settings,
    request: &GenerationRequest,
) -> Result<GenerationResult> {
    let mut prompt = render_template(request.template, &request.variables)?;

    if settings.learning_mode && request.learning_example {
        if let Some(example) = git.latest_commit_message()? {
            debug!(bytes = example.len(), "appending learning-mode example");
            prompt.push_str(
                "\n\nHere is a recent commit message from this repository, as a style example:\n",
            );
            prompt.push_str(&example);
        }
    }

    let schema: Option<Value> = request
        .output_schema
        .map(serde_json::from_str)
        .transpose()
        .context("parse output schema")?;

    let completion = CompletionRequest {
        prompt: &prompt,
        model: &settings.active().model,
        temperature: GENERATION_TEMPERATURE,
        json_schema: schema.as_ref(),
    };
    let reply = backend.complete(&completion)?;

    match schema {
        None => Ok(GenerationResult::FreeText(reply.trim().to_string())),
        Some(schema) => {
            let object = parse_structured_reply(&reply)?;
            validate_schema(&object, &schema)?;
            Ok(GenerationResult::Structured(object))
        }
    }
}

/// Substitute named placeholders in a prompt template.
///
/// An unresolved placeholder is a programming error (callers own their
/// variable sets), surfaced by strict undefined behavior.
fn render_template(template: &str, variables: &Map<String, Value>) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.render_str(template, variables)
        .context("render prompt template")
}

/// Parse a structured reply, tolerating markdown code fences some models
/// wrap around JSON despite instructions.
fn parse_structured_reply(reply: &str) -> Result<Value> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body)
        .map_err(|err| Generation(format!("backend returned non-JSON structured reply: {err}")).into())
}

/// Validate a structured reply against its schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        warn!(violations = messages.len(), "structured output failed schema");
        return Err(Validation(messages.join("; ")).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedBackend, TestRepo};
    use serde_json::json;

    fn variables(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn renders_named_placeholders() {
        let rendered =
            render_template("Diff:\n{{ diff }}", &variables(&[("diff", "+hello")])).expect("render");
        assert!(rendered.contains("+hello"));
    }

    #[test]
    fn unresolved_placeholder_is_an_error() {
        let err = render_template("{{ missing }}", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("render prompt template"));
    }

    #[test]
    fn learning_example_appended_when_enabled() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file("a.txt", "one", "feat: style example commit")
            .expect("commit");
        let mut settings = Settings::default();
        settings.learning_mode = true;

        let backend = ScriptedBackend::free_text(vec!["a message".to_string()]);
        let request = GenerationRequest::free_text(
            "{{ diff }}",
            variables(&[("diff", "+x")]),
        );
        generate_with(&backend, &repo.git(), &settings, &request).expect("generate");

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("style example commit"));
    }

    #[test]
    fn learning_example_skipped_when_request_opts_out() {
        let repo = TestRepo::new().expect("repo");
        repo.commit_file("a.txt", "one", "feat: style example commit")
            .expect("commit");
        let mut settings = Settings::default();
        settings.learning_mode = true;

        let backend = ScriptedBackend::free_text(vec!["a message".to_string()]);
        let request = GenerationRequest::free_text("{{ diff }}", variables(&[("diff", "+x")]))
            .without_learning_example();
        generate_with(&backend, &repo.git(), &settings, &request).expect("generate");

        assert!(!backend.prompts()[0].contains("style example commit"));
    }

    #[test]
    fn structured_reply_is_validated() {
        let repo = TestRepo::new().expect("repo");
        let settings = Settings::default();

        let backend = ScriptedBackend::free_text(vec![r#"{"title": "feat: add"}"#.to_string()]);
        let request = GenerationRequest::structured(
            "{{ diff }}",
            variables(&[("diff", "+x")]),
            PR_TITLE_SCHEMA,
        );
        let result =
            generate_with(&backend, &repo.git(), &settings, &request).expect("generate");
        assert_eq!(
            result.into_object().expect("object")["title"],
            json!("feat: add")
        );
    }

    #[test]
    fn schema_violation_is_a_validation_error() {
        let repo = TestRepo::new().expect("repo");
        let settings = Settings::default();

        let backend = ScriptedBackend::free_text(vec![r#"{"headline": 7}"#.to_string()]);
        let request = GenerationRequest::structured(
            "{{ diff }}",
            variables(&[("diff", "+x")]),
            PR_TITLE_SCHEMA,
        );
        let err = generate_with(&backend, &repo.git(), &settings, &request).unwrap_err();
        assert!(err.downcast_ref::<crate::error::Validation>().is_some());
    }

    #[test]
    fn fenced_json_reply_is_tolerated() {
        let object =
            parse_structured_reply("```json\n{\"title\": \"ok\"}\n```").expect("parse");
        assert_eq!(object["title"], json!("ok"));
    }
}
