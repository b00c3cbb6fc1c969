//! # CampusKB
//!
//! A retrieval-augmented question answering pipeline for school
//! knowledge bases.
//!
//! CampusKB ingests school documents (PDF, DOCX, plain text, Markdown),
//! chunks and embeds them into a topic-partitioned vector index, and
//! answers questions grounded in the retrieved context. When nothing
//! relevant is found, or any stage of the pipeline fails, the caller
//! receives a configured fallback response instead of an error.
//!
//! ## Quick Start
//!
//! ```bash
//! kb init                                  # create database
//! kb ingest school_rules.pdf               # ingest a document
//! kb ask "What is the grading scale?"      # ask a question
//! kb documents                             # list ingested documents
//! kb errors                                # inspect the error log
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`extract`] | Text extraction from uploaded files |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`completion`] | Chat completion provider abstraction |
//! | [`index`] | Topic-partitioned vector index |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`retrieve`] | Similarity-based context retrieval |
//! | [`session`] | Chat session persistence |
//! | [`generate`] | Fail-safe answer generation |
//! | [`error_log`] | Durable error log |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod error_log;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod session;
