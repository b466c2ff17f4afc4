//! Per-query pipeline: validate, retrieve, run planned analysis functions,
//! assemble a bounded context, compose the answer.
//!
//! A query moves through fixed stages. Validation failures are the only
//! hard errors; everything after that degrades instead of aborting, and
//! every degradation is recorded on [`ResponseFlags`] so the caller can see
//! what the answer was built without. Retrieval falls back from vector
//! search to keyword search when the embedding side is unavailable; a
//! failed model-backed composition falls back to the extractive composer.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::completion::{
    render_function_result, ComposeRequest, CompletionProvider, ExtractiveComposer,
    FunctionIntent, PlanRequest, PlannedCall,
};
use crate::config::Config;
use crate::error::{AdvisorError, Result};
use crate::functions::FunctionRegistry;
use crate::functions::FunctionContext;
use crate::index::EmbeddingIndex;
use crate::models::{
    AskResponse, ConversationTurn, FunctionCallResult, ProjectProfile, ResponseFlags, Role,
    SearchResult,
};
use crate::registry_client::PackageRegistry;

/// Characters of one chunk or turn forwarded to the completion service.
const SNIPPET_BUDGET_CHARS: usize = 500;

pub struct QueryOrchestrator {
    index: Arc<EmbeddingIndex>,
    functions: FunctionRegistry,
    completion: Box<dyn CompletionProvider>,
    registry: Box<dyn PackageRegistry>,
    config: Arc<Config>,
    fallback: ExtractiveComposer,
}

impl QueryOrchestrator {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        functions: FunctionRegistry,
        completion: Box<dyn CompletionProvider>,
        registry: Box<dyn PackageRegistry>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            index,
            functions,
            completion,
            registry,
            config,
            fallback: ExtractiveComposer::new(),
        }
    }

    /// Run one query through the full pipeline.
    ///
    /// Fails only on invalid input (empty query, unknown project) or a
    /// storage failure while resolving the project; everything else
    /// produces an answer with the appropriate flags set.
    pub async fn run(
        &self,
        session_id: &str,
        project_id: &str,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<AskResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AdvisorError::InvalidQuery(
                "query text must not be empty".to_string(),
            ));
        }
        let Some(profile) = self.index.get_profile(project_id).await? else {
            return Err(AdvisorError::InvalidQuery(format!(
                "unknown project: {}",
                project_id
            )));
        };
        tracing::debug!(session = session_id, project = project_id, "query received");

        let mut flags = ResponseFlags::default();
        let sources = self.retrieve(query, project_id, &mut flags).await;
        tracing::debug!(
            results = sources.len(),
            keyword_fallback = flags.keyword_fallback,
            retrieval_skipped = flags.retrieval_skipped,
            "retrieval complete"
        );

        let planned = self.decide_functions(query, &profile, history).await;
        let function_calls = self
            .execute_functions(&planned, &profile, project_id)
            .await?;
        if !function_calls.is_empty() {
            tracing::debug!(
                functions = function_calls.len(),
                failed = function_calls.iter().filter(|c| !c.success).count(),
                "functions executed"
            );
        }

        let chunk_texts = self.chunk_texts(&sources).await;
        let context_block = build_context_block(
            &profile,
            &function_calls,
            &sources,
            &chunk_texts,
            history,
            self.config.context.max_context_chars,
        );

        let compose = ComposeRequest {
            query,
            profile: &profile,
            history,
            context_block: &context_block,
            planned: &planned,
            executed: &function_calls,
            sources: &sources,
        };
        let answer_text = match self.completion.compose(&compose).await {
            Ok(text) => {
                flags.completion_fallback = !self.completion.is_model_backed();
                text
            }
            Err(err) => {
                tracing::warn!(error = %err, "completion failed, composing extractively");
                flags.completion_fallback = true;
                self.fallback.answer(&compose)
            }
        };

        let confidence = compute_confidence(&sources, &function_calls);
        tracing::info!(
            session = session_id,
            project = project_id,
            sources = sources.len(),
            functions = function_calls.len(),
            confidence,
            "query completed"
        );

        Ok(AskResponse {
            session_id: session_id.to_string(),
            answer_text,
            sources,
            function_calls,
            flags,
            confidence,
        })
    }

    /// Vector search, then keyword search when the vector side is
    /// unavailable (provider down, stale embeddings, no vectors yet).
    async fn retrieve(
        &self,
        query: &str,
        project_id: &str,
        flags: &mut ResponseFlags,
    ) -> Vec<SearchResult> {
        let top_k = self.config.retrieval.top_k;
        match self.index.search(query, top_k, project_id).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "vector retrieval unavailable");
                if self.config.retrieval.keyword_fallback {
                    match self.index.keyword_search(query, top_k, project_id).await {
                        Ok(results) => {
                            flags.keyword_fallback = true;
                            return results;
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "keyword fallback failed");
                        }
                    }
                }
                flags.retrieval_skipped = true;
                Vec::new()
            }
        }
    }

    /// The completion service's function-selection decision. A planning
    /// failure means no functions run, not a failed query.
    async fn decide_functions(
        &self,
        query: &str,
        profile: &ProjectProfile,
        history: &[ConversationTurn],
    ) -> Vec<PlannedCall> {
        let tool_schemas = self.functions.tool_schemas();
        let request = PlanRequest {
            query,
            profile,
            history,
            tool_schemas: &tool_schemas,
        };
        match self.completion.plan_functions(&request).await {
            Ok(FunctionIntent::Calls(calls)) => calls,
            Ok(FunctionIntent::None) => Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "function planning failed, skipping functions");
                Vec::new()
            }
        }
    }

    /// One result per planned call, in order. Calls the registry rejects
    /// (unknown name, invalid arguments) become visible failed records
    /// rather than aborting the query.
    async fn execute_functions(
        &self,
        planned: &[PlannedCall],
        profile: &ProjectProfile,
        project_id: &str,
    ) -> Result<Vec<FunctionCallResult>> {
        if planned.is_empty() {
            return Ok(Vec::new());
        }

        let files = self.index.project_files(project_id).await?;
        let ctx = FunctionContext {
            profile,
            files: &files,
            registry: self.registry.as_ref(),
        };

        let mut results = Vec::with_capacity(planned.len());
        for call in planned {
            match self
                .functions
                .invoke(&call.name, call.arguments.clone(), &ctx)
                .await
            {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::warn!(function = %call.name, error = %err, "planned call rejected");
                    results.push(FunctionCallResult {
                        function_name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        result_payload: Value::Null,
                        success: false,
                        error_message: Some(err.to_string()),
                    });
                }
            }
        }
        Ok(results)
    }

    /// Full chunk texts for the prompt; on any storage hiccup the 160-char
    /// search snippets stand in.
    async fn chunk_texts(&self, sources: &[SearchResult]) -> HashMap<String, String> {
        if sources.is_empty() {
            return HashMap::new();
        }
        let ids: Vec<String> = sources.iter().map(|s| s.chunk_id.clone()).collect();
        match self.index.chunks_by_ids(&ids).await {
            Ok(chunks) => chunks.into_iter().map(|c| (c.id, c.text)).collect(),
            Err(err) => {
                tracing::debug!(error = %err, "chunk text fetch failed, using snippets");
                HashMap::new()
            }
        }
    }
}

/// Assemble the prompt context within `budget_chars`, highest priority
/// first: function results, then retrieved chunks by rank, then recent
/// turns (newest kept first, rendered oldest first). The project header is
/// always present and not counted against the budget.
fn build_context_block(
    profile: &ProjectProfile,
    function_calls: &[FunctionCallResult],
    sources: &[SearchResult],
    chunk_texts: &HashMap<String, String>,
    history: &[ConversationTurn],
    budget_chars: usize,
) -> String {
    let mut out = String::from("PROJECT CONTEXT:\n");
    out.push_str(&format!(
        "Framework: {}\n",
        profile.detected_framework.as_str()
    ));
    out.push_str(&format!("Root: {}\n", profile.root_path));
    if !profile.dependencies.is_empty() {
        out.push_str("Dependencies:\n");
        for dep in profile.dependencies.iter().take(10) {
            out.push_str(&format!("  - {}: {}\n", dep.name, dep.declared_version));
        }
        if profile.dependencies.len() > 10 {
            out.push_str(&format!(
                "  ... and {} more\n",
                profile.dependencies.len() - 10
            ));
        }
    }

    let mut remaining = budget_chars;

    if !function_calls.is_empty() && remaining > 0 {
        let mut section = String::from("\nFUNCTION ANALYSIS RESULTS:\n");
        for result in function_calls {
            section.push_str(&render_function_result(result));
        }
        remaining = append_within(&mut out, &section, remaining);
    }

    if !sources.is_empty() && remaining > 0 {
        let mut section = String::from("\nRELEVANT CODE SNIPPETS (from semantic search):\n");
        for source in sources {
            let text = chunk_texts
                .get(&source.chunk_id)
                .map(String::as_str)
                .unwrap_or(&source.snippet);
            section.push_str(&format!(
                "{}. File: {} (score {:.3})\n{}\n",
                source.rank,
                source.source_file,
                source.similarity_score,
                clip(text, SNIPPET_BUDGET_CHARS),
            ));
        }
        remaining = append_within(&mut out, &section, remaining);
    }

    if !history.is_empty() && remaining > 0 {
        let header = "\nRECENT CONVERSATION:\n";
        let mut used = header.chars().count();
        let mut kept: Vec<String> = Vec::new();
        for turn in history.iter().rev() {
            let label = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            let line = format!("{}: {}\n", label, clip(&turn.text, SNIPPET_BUDGET_CHARS));
            let line_len = line.chars().count();
            if used + line_len > remaining {
                break;
            }
            used += line_len;
            kept.push(line);
        }
        if !kept.is_empty() {
            out.push_str(header);
            for line in kept.iter().rev() {
                out.push_str(line);
            }
        }
    }

    out
}

/// Append up to `remaining` characters of `section`, returning what is left
/// of the budget.
fn append_within(out: &mut String, section: &str, remaining: usize) -> usize {
    let count = section.chars().count();
    if count <= remaining {
        out.push_str(section);
        remaining - count
    } else {
        out.extend(section.chars().take(remaining));
        0
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push('…');
    clipped
}

/// Top similarity plus a small bonus per successful function call, capped
/// below certainty; answers composed without retrieval keep a low floor.
fn compute_confidence(sources: &[SearchResult], function_calls: &[FunctionCallResult]) -> f32 {
    let successful = function_calls.iter().filter(|c| c.success).count() as f32;
    let top = sources.first().map(|s| s.similarity_score).unwrap_or(0.0);
    let score = top + 0.1 * successful;
    let score = if sources.is_empty() {
        score.max(0.2)
    } else {
        score
    };
    score.min(0.95)
}
