//! # Dependency Advisor
//!
//! A local-first dependency advisor: retrieval-augmented answers about the
//! libraries in your project.
//!
//! Dependency Advisor scans a project tree (React, Vue, or .NET), chunks and
//! indexes its files in SQLite, and answers questions about the project's
//! dependencies by combining semantic retrieval with targeted analysis
//! functions (reference finding, compatibility checks, upgrade suggestions),
//! optionally composed into prose by an OpenAI-compatible completion model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐
//! │ Scanner  │──▶│ Chunk+Embed │──▶│  SQLite   │
//! │ (depad)  │   │             │   │ FTS5+Vec  │
//! └──────────┘   └─────────────┘   └─────┬─────┘
//!                                        │
//!                 ┌──────────────┐       │
//!                 │ Orchestrator │◀──────┤
//!                 │  + Functions │       │
//!                 └──────┬───────┘       │
//!                        ▼               ▼
//!                  ┌──────────┐    ┌──────────┐
//!                  │   CLI    │    │   HTTP   │
//!                  │ (depad)  │    │  (axum)  │
//!                  └──────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! depad init                        # write config + create database
//! depad ingest ./my-app             # scan and index a project
//! depad projects                    # list indexed projects
//! depad ask <project> "can I add react-router@6?"
//! depad chat <project>              # interactive session
//! depad serve                       # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`scanner`] | Project scanning and framework detection |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector + keyword retrieval over SQLite |
//! | [`knowledge`] | Framework compatibility tables |
//! | [`registry_client`] | npm / NuGet metadata lookups |
//! | [`functions`] | Analysis function registry |
//! | [`analysis`] | Built-in analysis functions |
//! | [`completion`] | Completion providers (OpenAI / extractive) |
//! | [`conversation`] | Session store |
//! | [`orchestrator`] | Per-query pipeline |
//! | [`advisor`] | Top-level facade |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod advisor;
pub mod analysis;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod functions;
pub mod index;
pub mod knowledge;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod registry_client;
pub mod scanner;
pub mod server;
pub mod stats;
