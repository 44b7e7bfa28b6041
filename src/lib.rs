//! Export Microsoft 365 data through Microsoft Graph
//!
//! Planner tasks, sign-in logs and service principal configuration are paged
//! out of Graph, flattened and written as JSON, Excel and HTML reports.

pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
pub mod report;
pub mod sanitize;
