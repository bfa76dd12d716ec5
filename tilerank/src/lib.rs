//! CLI-support library for the `tilerank` binary: the HTTP fetch
//! collaborator, ISO-week arithmetic, process logging, and the top-level
//! pipeline orchestration. Split out from `main.rs` so integration tests can
//! drive [`pipeline::run`] against an in-process fixture instead of the real
//! network.

pub mod fetch;
pub mod iso_week;
pub mod logging;
pub mod pipeline;
