//! Conduit Core
//!
//! Core types for the Conduit execution persistence layer.
//!
//! This crate contains the domain types (Execution, Stage, statuses and query
//! criteria) shared by the orchestration engine and every execution
//! repository backend. Storage logic lives in `conduit-persistence`.

pub mod domain;
