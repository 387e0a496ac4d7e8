//! Toolgate: a tool access policy engine for LLM agents.
//!
//! Every tool an agent may call carries capability and trust tags. Layered
//! policies (application defaults, deployment overrides, named profiles)
//! decide per tool whether a call is allowed, denied or needs a human's
//! confirmation. The decision also depends on the turn's taint level, which
//! only ever rises as the agent reads untrusted data.
//!
//! The [`tools::PolicyGuard`] wraps any [`tools::ToolExecutor`]: it hides
//! denied tools, re-checks every call, runs the confirmation flow and
//! escalates taint after a tool returns.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod config;
pub mod confirm;
pub mod context;
pub mod logging;
pub mod policy;
pub mod tools;
pub mod types;
