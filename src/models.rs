//! Core data models used throughout the advisor.
//!
//! These types represent the projects, chunks, and per-query records that
//! flow through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Framework detected for a scanned project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    React,
    Vue,
    Dotnet,
    Unknown,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::React => "react",
            Framework::Vue => "vue",
            Framework::Dotnet => "dotnet",
            Framework::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Framework {
        match s {
            "react" => Framework::React,
            "vue" => Framework::Vue,
            "dotnet" => Framework::Dotnet,
            _ => Framework::Unknown,
        }
    }
}

/// One declared dependency from a manifest, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    pub declared_version: String,
}

/// Normalized summary of a scanned project. Immutable once created;
/// replaced wholesale by a re-scan.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectProfile {
    pub project_id: String,
    pub root_path: String,
    pub detected_framework: Framework,
    pub dependencies: Vec<Dependency>,
    pub created_at: DateTime<Utc>,
}

/// Classification assigned to every scanned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Source,
    Manifest,
    Config,
    Doc,
    Unknown,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Source => "source",
            FileKind::Manifest => "manifest",
            FileKind::Config => "config",
            FileKind::Doc => "doc",
            FileKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> FileKind {
        match s {
            "source" => FileKind::Source,
            "manifest" => FileKind::Manifest,
            "config" => FileKind::Config,
            "doc" => FileKind::Doc,
            _ => FileKind::Unknown,
        }
    }
}

/// A file captured during a scan, with its text content.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub relative_path: String,
    pub kind: FileKind,
    pub text: String,
}

/// A bounded segment of one source file. Never mutated; deleted only by
/// full re-ingestion of its project.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub project_id: String,
    pub source_file: String,
    pub byte_start: i64,
    pub byte_end: i64,
    pub text: String,
    pub chunk_index: i64,
}

/// A vector computed for one chunk under one embedding model.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub model_version: String,
}

/// Outcome of one analysis-function invocation. Ephemeral; attached to the
/// response and the session log, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionCallResult {
    pub function_name: String,
    pub arguments: serde_json::Value,
    pub result_payload: serde_json::Value,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Speaker role within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn in a session's rolling history.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub turn_id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub retrieved_chunk_ids: Vec<String>,
    pub function_calls: Vec<FunctionCallResult>,
}

/// One retrieval hit, scored and ranked for a single query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub source_file: String,
    pub similarity_score: f32,
    pub rank: usize,
    pub snippet: String,
}

/// What a query skipped or fell back to. All false on the happy path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseFlags {
    pub retrieval_skipped: bool,
    pub keyword_fallback: bool,
    pub completion_fallback: bool,
}

/// Final answer returned by `ask`.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub session_id: String,
    pub answer_text: String,
    pub sources: Vec<SearchResult>,
    pub function_calls: Vec<FunctionCallResult>,
    pub flags: ResponseFlags,
    pub confidence: f32,
}
