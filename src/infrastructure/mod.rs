//! Adapters for the domain ports: the backend REST API, and in-memory
//! stand-ins used by tests and sandbox runs.

pub mod http;
pub mod in_memory;
