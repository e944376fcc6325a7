//! # coursekb
//!
//! A classroom content classification and course-task aggregation pipeline.
//!
//! coursekb ingests free-text messages from classroom channels (Telegram
//! chats, schedule pages), classifies each one (category, importance,
//! extracted links and deadlines), and merges significant results into
//! persistent course tasks via semantic similarity search. The output is a
//! read-only knowledge base grouped by task.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────────┐   ┌─────────────┐
//! │  Sources   │──▶│ Classifier         │──▶│ Aggregator   │
//! │ tg/web/json│   │ LLM ▸ heuristics   │   │ match/create │
//! └────────────┘   │ + normalization    │   └──────┬──────┘
//!                  └───────────────────┘          │
//!                              ┌───────────────────┤
//!                              ▼                   ▼
//!                        ┌──────────┐       ┌────────────┐
//!                        │  SQLite  │       │ Similarity │
//!                        │ messages │       │   index    │
//!                        │ tasks    │       │ (vectors)  │
//!                        └──────────┘       └────────────┘
//! ```
//!
//! The classifier tries a configured chat-completion backend first and falls
//! back to deterministic heuristics on any failure; with no backend
//! configured, heuristics are the only strategy. Raw strategy output is
//! untrusted until it passes through [`normalize`]. The aggregator is
//! idempotent under at-least-once delivery.
//!
//! ## Quick Start
//!
//! ```bash
//! ckb init                          # create database
//! ckb classify --text "Сдать лабу до 20.05"
//! ckb process envelopes.json       # run the pipeline on stored envelopes
//! ckb ingest web-stub              # mock web-schedule ingestion
//! ckb tasks                        # list aggregated course tasks
//! ckb reprocess                    # wipe derived data, replay everything
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`prompts`] | Prompt templates per source type |
//! | [`classifier`] | LLM strategy with heuristic fallback |
//! | [`heuristics`] | Deterministic text analysis |
//! | [`normalize`] | Output contract enforcement |
//! | [`embedding`] | Embedding client and vector utilities |
//! | [`similarity`] | Similarity index boundary and local adapter |
//! | [`aggregator`] | Task aggregation state machine |
//! | [`pipeline`] | Per-envelope orchestration |
//! | [`store`] | Persistence surface |
//! | [`sources`] | Envelope source adapters |
//! | [`reprocess`] | Wipe + chronological replay |

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod db;
pub mod embedding;
pub mod heuristics;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod reprocess;
pub mod similarity;
pub mod sources;
pub mod store;
