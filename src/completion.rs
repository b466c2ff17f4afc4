//! Answer composition providers.
//!
//! Two implementations of [`CompletionProvider`]:
//! - **[`OpenAiCompletion`]** — OpenAI-compatible chat completions with
//!   function calling: a planning call advertises the registry's tool
//!   schemas, executed results go back as `tool` messages, and a second
//!   call composes the final answer.
//! - **[`ExtractiveComposer`]** — no external service. Function intent
//!   comes from keyword heuristics over the query; the answer is assembled
//!   deterministically from analysis results and retrieved snippets.
//!
//! The orchestrator also keeps an [`ExtractiveComposer`] around as the
//! degraded path when a model-backed compose call fails.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::config::CompletionConfig;
use crate::error::{AdvisorError, Result};
use crate::models::{ConversationTurn, FunctionCallResult, ProjectProfile, SearchResult};

const SYSTEM_PROMPT: &str = "You are a dependency advisor for React, Vue.js, and .NET projects. \
Ground every answer in the supplied project context and analysis results. Respect the project's \
detected framework: never suggest switching frameworks, and never recommend libraries from a \
different ecosystem unless explicitly asked. Cite specific files and line numbers when the \
context names them, and distinguish retrieved code snippets from live analysis results.";

// ============ Intent types ============

/// One function call the completion layer wants executed.
#[derive(Debug, Clone)]
pub struct PlannedCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// Outcome of the planning phase.
#[derive(Debug, Clone)]
pub enum FunctionIntent {
    None,
    Calls(Vec<PlannedCall>),
}

/// Inputs to the planning phase.
pub struct PlanRequest<'a> {
    pub query: &'a str,
    pub profile: &'a ProjectProfile,
    pub history: &'a [ConversationTurn],
    pub tool_schemas: &'a [Value],
}

/// Inputs to the composition phase.
pub struct ComposeRequest<'a> {
    pub query: &'a str,
    pub profile: &'a ProjectProfile,
    pub history: &'a [ConversationTurn],
    pub context_block: &'a str,
    pub planned: &'a [PlannedCall],
    pub executed: &'a [FunctionCallResult],
    pub sources: &'a [SearchResult],
}

/// A completion backend: decides which analysis functions a query needs,
/// then composes the final answer.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// False for the extractive fallback; callers flag such answers.
    fn is_model_backed(&self) -> bool;
    /// Decide which analysis functions to run for this query.
    async fn plan_functions(&self, request: &PlanRequest<'_>) -> Result<FunctionIntent>;
    /// Compose the final answer from assembled context.
    async fn compose(&self, request: &ComposeRequest<'_>) -> Result<String>;
}

/// Create the appropriate [`CompletionProvider`] based on configuration.
pub fn create_completion(config: &CompletionConfig) -> anyhow::Result<Box<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(ExtractiveComposer::new())),
        "openai" => Ok(Box::new(OpenAiCompletion::new(config)?)),
        other => anyhow::bail!("Unknown completion provider: {}", other),
    }
}

// ============ OpenAI Completion ============

/// Completion provider for OpenAI-compatible chat APIs.
///
/// Calls `POST {api_base}/chat/completions`. Requires the `OPENAI_API_KEY`
/// environment variable.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    model: String,
    api_base: String,
    api_key: String,
}

impl OpenAiCompletion {
    pub fn new(config: &CompletionConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("completion.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            model,
            api_base,
            api_key,
        })
    }

    async fn chat(&self, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AdvisorError::CompletionService(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AdvisorError::CompletionService(format!(
                "API error {}: {}",
                status, body_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AdvisorError::CompletionService(format!("bad response body: {}", e)))
    }

    /// System prompt + bounded history + the user message.
    fn messages(
        &self,
        profile: &ProjectProfile,
        history: &[ConversationTurn],
        user_content: String,
    ) -> Vec<Value> {
        let framework = profile.detected_framework.as_str();
        let system = format!(
            "{}\n\nIMPORTANT: This is a {} project. Provide solutions specific to {} only.",
            SYSTEM_PROMPT, framework, framework
        );

        let mut messages = vec![json!({"role": "system", "content": system})];
        for turn in history {
            messages.push(json!({"role": turn.role.as_str(), "content": turn.text}));
        }
        messages.push(json!({"role": "user", "content": user_content}));
        messages
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    fn is_model_backed(&self) -> bool {
        true
    }

    async fn plan_functions(&self, request: &PlanRequest<'_>) -> Result<FunctionIntent> {
        let messages = self.messages(request.profile, request.history, request.query.to_string());
        let body = json!({
            "model": self.model,
            "messages": messages,
            "tools": request.tool_schemas,
            "tool_choice": "auto",
            "temperature": 0.1,
            "max_tokens": 1500,
        });

        let response = self.chat(&body).await?;
        Ok(parse_function_intent(&response))
    }

    async fn compose(&self, request: &ComposeRequest<'_>) -> Result<String> {
        let user_content = format!(
            "Context:\n{}\n\nQuestion: {}\n\nProvide a comprehensive answer based on the context \
             above, staying within the project's framework ecosystem.",
            request.context_block, request.query
        );
        let mut messages = self.messages(request.profile, request.history, user_content);

        // Echo planned calls and their results in the tool protocol so the
        // model attributes each payload to its call.
        if !request.planned.is_empty() {
            messages.push(assistant_tool_calls_message(request.planned));
            for (call, result) in request.planned.iter().zip(request.executed) {
                let content = if result.success {
                    result.result_payload.to_string()
                } else {
                    result
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "function execution failed".to_string())
                };
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call.call_id,
                    "content": content,
                }));
            }
        }

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.1,
            "max_tokens": 1500,
        });

        let response = self.chat(&body).await?;
        extract_answer(&response)
    }
}

/// Pull tool calls out of a chat response; absent or empty means no intent.
fn parse_function_intent(response: &Value) -> FunctionIntent {
    let message = &response["choices"][0]["message"];
    let Some(tool_calls) = message["tool_calls"].as_array() else {
        return FunctionIntent::None;
    };

    let mut planned = Vec::new();
    for call in tool_calls {
        let name = call["function"]["name"].as_str().unwrap_or("").to_string();
        if name.is_empty() {
            continue;
        }
        let raw_arguments = call["function"]["arguments"].as_str().unwrap_or("{}");
        let arguments = serde_json::from_str(raw_arguments).unwrap_or_else(|e| {
            tracing::warn!(function = %name, error = %e, "unparseable tool arguments");
            json!({})
        });
        planned.push(PlannedCall {
            call_id: call["id"].as_str().unwrap_or("").to_string(),
            name,
            arguments,
        });
    }

    if planned.is_empty() {
        FunctionIntent::None
    } else {
        FunctionIntent::Calls(planned)
    }
}

fn assistant_tool_calls_message(planned: &[PlannedCall]) -> Value {
    let calls: Vec<Value> = planned
        .iter()
        .map(|call| {
            json!({
                "id": call.call_id,
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": call.arguments.to_string(),
                },
            })
        })
        .collect();
    json!({"role": "assistant", "content": null, "tool_calls": calls})
}

fn extract_answer(response: &Value) -> Result<String> {
    let answer = response["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .trim()
        .to_string();
    if answer.is_empty() {
        return Err(AdvisorError::CompletionService(
            "empty completion response".to_string(),
        ));
    }
    Ok(answer)
}

// ============ Extractive Composer ============

/// Deterministic, service-free provider. Intent comes from keyword
/// heuristics; answers are assembled from the structured results directly.
pub struct ExtractiveComposer {
    library_patterns: Vec<Regex>,
    version_pattern: Regex,
    removal_intent: Regex,
    addition_intent: Regex,
}

impl ExtractiveComposer {
    /// Compiles the built-in patterns.
    ///
    /// # Panics
    ///
    /// Panics if a built-in pattern fails to compile, which a test guards.
    pub fn new() -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
        };
        Self {
            library_patterns: compile(&[
                r"(?i)library\s+(\S+)",
                r"(?i)package\s+(\S+)",
                r"(?i)dependency\s+(\S+)",
                r"(?i)remove\s+(\S+)",
                r"(?i)uninstall\s+(\S+)",
                r"(?i)add\s+(\S+)",
                r"(?i)install\s+(\S+)",
            ]),
            version_pattern: Regex::new(r"(?i)(react|vue|\.net|dotnet|angular)[\s@]+(\d+)")
                .unwrap(),
            removal_intent: Regex::new(r"(?i)\b(remove|removing|uninstall|drop)\b").unwrap(),
            addition_intent: Regex::new(r"(?i)\b(add|adding|install|installing)\b").unwrap(),
        }
    }

    /// Route a query to at most one analysis function.
    ///
    /// Removal questions map to `find_library_references` (the caller wants
    /// to know what still uses the library); addition questions map to
    /// `check_compatibility`. The incompatibility branch runs before the
    /// compatibility branch since "incompatible" contains "compatible".
    fn heuristic_intent(&self, query: &str) -> FunctionIntent {
        let lowered = query.to_lowercase();

        if lowered.contains("find references")
            || lowered.contains("find usage")
            || lowered.contains("references to")
            || self.removal_intent.is_match(query)
        {
            if let Some(library) = self.extract_library(query) {
                return single_call(
                    "find_library_references",
                    json!({"library_name": library}),
                );
            }
        }

        if lowered.contains("incompatible") || lowered.contains("conflicts") {
            if let Some(target) = self.extract_framework_version(query) {
                return single_call(
                    "list_incompatible_libraries",
                    json!({"target_framework_version": target}),
                );
            }
        }

        if lowered.contains("check compatibility")
            || lowered.contains("compatible")
            || self.addition_intent.is_match(query)
        {
            if let Some(library) = self.extract_library(query) {
                return single_call("check_compatibility", json!({"new_library": library}));
            }
        }

        if lowered.contains("upgrade") || lowered.contains("migration") || lowered.contains("update")
        {
            let arguments = match self.extract_framework_version(query) {
                Some(target) => json!({"target_framework_version": target}),
                None => json!({}),
            };
            return single_call("suggest_library_upgrades", arguments);
        }

        FunctionIntent::None
    }

    /// Quoted tokens win; otherwise the word after a library-ish noun or
    /// an add/remove verb.
    fn extract_library(&self, query: &str) -> Option<String> {
        for word in query.split_whitespace() {
            let word = trim_token(word);
            for quote in ['"', '\''] {
                if word.len() >= 2 && word.starts_with(quote) && word.ends_with(quote) {
                    let inner = word.trim_matches(quote);
                    if !inner.is_empty() {
                        return Some(inner.to_string());
                    }
                }
            }
        }

        for pattern in &self.library_patterns {
            if let Some(caps) = pattern.captures(query) {
                if let Some(m) = caps.get(1) {
                    let token = trim_token(m.as_str()).trim_matches(['"', '\'']);
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
        None
    }

    /// "vue 3", "react@18", ".net 8" and friends, normalized to
    /// `framework@major`.
    fn extract_framework_version(&self, query: &str) -> Option<String> {
        let caps = self.version_pattern.captures(query)?;
        let framework = caps.get(1)?.as_str().to_lowercase();
        let framework = if framework == ".net" {
            "dotnet".to_string()
        } else {
            framework
        };
        let major = caps.get(2)?.as_str();
        Some(format!("{}@{}", framework, major))
    }

    /// The deterministic answer; infallible, so it also serves as the
    /// degraded path when a model-backed compose fails.
    pub fn answer(&self, request: &ComposeRequest<'_>) -> String {
        let profile = request.profile;
        let mut out = format!(
            "Based on the indexed {} project ({} declared dependencies):\n",
            profile.detected_framework.as_str(),
            profile.dependencies.len()
        );

        if !request.executed.is_empty() {
            out.push('\n');
            out.push_str("Analysis results:\n");
            for result in request.executed {
                out.push_str(&render_function_result(result));
            }
        }

        if !request.sources.is_empty() {
            out.push('\n');
            out.push_str("Most relevant project content:\n");
            for source in request.sources.iter().take(3) {
                out.push_str(&format!(
                    "- {} (score {:.2}): {}\n",
                    source.source_file, source.similarity_score, source.snippet
                ));
            }
        }

        if request.executed.is_empty() && request.sources.is_empty() {
            out.push_str(
                "\nNo indexed content matched this question. Ingest the project first, or ask \
                 about a specific library or framework version.\n",
            );
        }

        out
    }
}

impl Default for ExtractiveComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for ExtractiveComposer {
    fn is_model_backed(&self) -> bool {
        false
    }

    async fn plan_functions(&self, request: &PlanRequest<'_>) -> Result<FunctionIntent> {
        Ok(self.heuristic_intent(request.query))
    }

    async fn compose(&self, request: &ComposeRequest<'_>) -> Result<String> {
        Ok(self.answer(request))
    }
}

fn single_call(name: &str, arguments: Value) -> FunctionIntent {
    FunctionIntent::Calls(vec![PlannedCall {
        call_id: format!("local-{}", name),
        name: name.to_string(),
        arguments,
    }])
}

fn trim_token(token: &str) -> &str {
    token.trim_matches([',', '?', '!', '.', ';', ':'])
}

/// Render one function result as answer lines. Also used by the
/// orchestrator when it assembles the prompt context block.
pub(crate) fn render_function_result(result: &FunctionCallResult) -> String {
    if !result.success {
        let reason = result.error_message.as_deref().unwrap_or("unknown error");
        return format!("- {} failed: {}\n", result.function_name, reason);
    }

    let payload = &result.result_payload;
    let mut out = String::new();
    match result.function_name.as_str() {
        "find_library_references" => {
            let total = payload["total"].as_u64().unwrap_or(0);
            let library = payload["library_name"].as_str().unwrap_or("the library");
            out.push_str(&format!("- {} reference(s) to {}:\n", total, library));
            if let Some(references) = payload["references"].as_array() {
                for reference in references.iter().take(5) {
                    out.push_str(&format!(
                        "  - {} (line {}): {}\n",
                        reference["file_path"].as_str().unwrap_or("?"),
                        reference["line_number"].as_u64().unwrap_or(0),
                        reference["context"].as_str().unwrap_or(""),
                    ));
                }
            }
        }
        "check_compatibility" => {
            let library = payload["library"].as_str().unwrap_or("the library");
            let compatible = payload["is_compatible"].as_bool().unwrap_or(false);
            out.push_str(&format!(
                "- {} is {} with the current setup\n",
                library,
                if compatible { "compatible" } else { "NOT compatible" }
            ));
            for key in ["conflicts", "warnings", "recommendations"] {
                if let Some(items) = payload[key].as_array() {
                    for item in items {
                        if let Some(text) = item.as_str() {
                            out.push_str(&format!("  - {}\n", text));
                        }
                    }
                }
            }
        }
        "list_incompatible_libraries" => {
            let target = payload["target"].as_str().unwrap_or("the target");
            match payload["incompatible"].as_array() {
                Some(items) if !items.is_empty() => {
                    out.push_str(&format!("- Known incompatibilities with {}:\n", target));
                    for item in items {
                        if let Some(text) = item.as_str() {
                            out.push_str(&format!("  - {}\n", text));
                        }
                    }
                }
                _ => out.push_str(&format!("- No known incompatibilities with {}\n", target)),
            }
        }
        "suggest_library_upgrades" => match payload["recommendations"].as_array() {
            Some(recommendations) if !recommendations.is_empty() => {
                out.push_str("- Suggested upgrades:\n");
                for rec in recommendations {
                    out.push_str(&format!(
                        "  - {} {} -> {} ({})\n",
                        rec["library"].as_str().unwrap_or("?"),
                        rec["current_version"].as_str().unwrap_or("?"),
                        rec["recommended_version"].as_str().unwrap_or("?"),
                        rec["reason"].as_str().unwrap_or(""),
                    ));
                }
            }
            _ => out.push_str("- No upgrades to suggest\n"),
        },
        other => {
            out.push_str(&format!("- {}: {}\n", other, payload));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dependency, Framework};
    use chrono::Utc;

    fn profile() -> ProjectProfile {
        ProjectProfile {
            project_id: "p1".to_string(),
            root_path: "/work/shop".to_string(),
            detected_framework: Framework::React,
            dependencies: vec![Dependency {
                name: "redux".to_string(),
                declared_version: "^4.2.0".to_string(),
            }],
            created_at: Utc::now(),
        }
    }

    fn planned(intent: FunctionIntent) -> Vec<PlannedCall> {
        match intent {
            FunctionIntent::Calls(calls) => calls,
            FunctionIntent::None => Vec::new(),
        }
    }

    #[test]
    fn test_heuristic_routes_removal_to_references() {
        let composer = ExtractiveComposer::new();
        let calls = planned(composer.heuristic_intent("remove redux, what should I check?"));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "find_library_references");
        assert_eq!(calls[0].arguments["library_name"], "redux");
    }

    #[test]
    fn test_heuristic_routes_addition_to_compatibility() {
        let composer = ExtractiveComposer::new();
        let calls = planned(composer.heuristic_intent("can I add \"react-router-dom@6\"?"));
        assert_eq!(calls[0].name, "check_compatibility");
        assert_eq!(calls[0].arguments["new_library"], "react-router-dom@6");
    }

    #[test]
    fn test_heuristic_incompatible_wins_over_compatible() {
        let composer = ExtractiveComposer::new();
        let calls =
            planned(composer.heuristic_intent("which packages are incompatible with react 18?"));
        assert_eq!(calls[0].name, "list_incompatible_libraries");
        assert_eq!(calls[0].arguments["target_framework_version"], "react@18");
    }

    #[test]
    fn test_heuristic_upgrade_with_and_without_target() {
        let composer = ExtractiveComposer::new();

        let calls = planned(composer.heuristic_intent("plan the migration to vue 3"));
        assert_eq!(calls[0].name, "suggest_library_upgrades");
        assert_eq!(calls[0].arguments["target_framework_version"], "vue@3");

        let calls = planned(composer.heuristic_intent("should I update my dependencies?"));
        assert_eq!(calls[0].name, "suggest_library_upgrades");
        assert!(calls[0].arguments.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_heuristic_plain_questions_need_no_functions() {
        let composer = ExtractiveComposer::new();
        assert!(matches!(
            composer.heuristic_intent("what does this project do?"),
            FunctionIntent::None
        ));
    }

    #[test]
    fn test_extract_library_variants() {
        let composer = ExtractiveComposer::new();
        assert_eq!(
            composer.extract_library("is 'axios' safe to use?"),
            Some("axios".to_string())
        );
        assert_eq!(
            composer.extract_library("tell me about package react-redux."),
            Some("react-redux".to_string())
        );
        assert_eq!(composer.extract_library("what changed recently?"), None);
    }

    #[test]
    fn test_extract_framework_version_normalizes_dotnet() {
        let composer = ExtractiveComposer::new();
        assert_eq!(
            composer.extract_framework_version("conflicts with .net 8?"),
            Some("dotnet@8".to_string())
        );
        assert_eq!(
            composer.extract_framework_version("move to react@18"),
            Some("react@18".to_string())
        );
        assert_eq!(composer.extract_framework_version("latest stable"), None);
    }

    #[test]
    fn test_parse_function_intent_reads_tool_calls() {
        let response = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "check_compatibility",
                            "arguments": "{\"new_library\": \"redux@4.2.0\"}"
                        }
                    }]
                }
            }]
        });

        let FunctionIntent::Calls(calls) = parse_function_intent(&response) else {
            panic!("expected calls");
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "call_abc");
        assert_eq!(calls[0].arguments["new_library"], "redux@4.2.0");
    }

    #[test]
    fn test_parse_function_intent_without_tool_calls() {
        let response = json!({
            "choices": [{"message": {"content": "Just an answer."}}]
        });
        assert!(matches!(
            parse_function_intent(&response),
            FunctionIntent::None
        ));
    }

    #[test]
    fn test_assistant_tool_calls_message_shape() {
        let planned = vec![PlannedCall {
            call_id: "call_1".to_string(),
            name: "find_library_references".to_string(),
            arguments: json!({"library_name": "redux"}),
        }];
        let message = assistant_tool_calls_message(&planned);
        assert_eq!(message["role"], "assistant");
        assert_eq!(message["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            message["tool_calls"][0]["function"]["arguments"],
            "{\"library_name\":\"redux\"}"
        );
    }

    #[test]
    fn test_extract_answer_rejects_empty() {
        let ok = json!({"choices": [{"message": {"content": "  use pinia  "}}]});
        assert_eq!(extract_answer(&ok).unwrap(), "use pinia");

        let empty = json!({"choices": [{"message": {"content": ""}}]});
        assert!(matches!(
            extract_answer(&empty),
            Err(AdvisorError::CompletionService(_))
        ));
    }

    #[test]
    fn test_extractive_answer_renders_references_and_sources() {
        let composer = ExtractiveComposer::new();
        let profile = profile();
        let executed = vec![FunctionCallResult {
            function_name: "find_library_references".to_string(),
            arguments: json!({"library_name": "redux"}),
            result_payload: json!({
                "library_name": "redux",
                "total": 2,
                "references": [
                    {"file_path": "src/store.js", "line_number": 1, "context": "import { createStore } from 'redux';", "reference_type": "import"},
                    {"file_path": "src/app.jsx", "line_number": 3, "context": "const { connect } = require('react-redux');", "reference_type": "require"}
                ]
            }),
            success: true,
            error_message: None,
        }];
        let sources = vec![SearchResult {
            chunk_id: "c1".to_string(),
            source_file: "package.json".to_string(),
            similarity_score: 0.88,
            rank: 1,
            snippet: "\"redux\": \"^4.2.0\"".to_string(),
        }];

        let request = ComposeRequest {
            query: "remove redux, what should I check?",
            profile: &profile,
            history: &[],
            context_block: "",
            planned: &[],
            executed: &executed,
            sources: &sources,
        };
        let answer = composer.answer(&request);
        assert!(answer.contains("2 reference(s) to redux"));
        assert!(answer.contains("src/store.js"));
        assert!(answer.contains("src/app.jsx"));
        assert!(answer.contains("package.json"));
    }

    #[test]
    fn test_extractive_answer_renders_failures_and_empties() {
        let composer = ExtractiveComposer::new();
        let profile = profile();
        let executed = vec![FunctionCallResult {
            function_name: "nonexistent_function".to_string(),
            arguments: json!({}),
            result_payload: Value::Null,
            success: false,
            error_message: Some("Unknown function: nonexistent_function".to_string()),
        }];

        let request = ComposeRequest {
            query: "anything",
            profile: &profile,
            history: &[],
            context_block: "",
            planned: &[],
            executed: &executed,
            sources: &[],
        };
        let answer = composer.answer(&request);
        assert!(answer.contains("nonexistent_function failed"));

        let bare = ComposeRequest {
            query: "anything",
            profile: &profile,
            history: &[],
            context_block: "",
            planned: &[],
            executed: &[],
            sources: &[],
        };
        let answer = composer.answer(&bare);
        assert!(answer.contains("No indexed content matched"));
    }
}
