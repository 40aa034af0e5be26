//! Resource manager core
//!
//! Keeps track of computing nodes and hands free ones out, optionally
//! filtered by selection scripts evaluated on the nodes themselves.
//!
//! ```text
//!            add_node                get_at_most_nodes
//!   ┌──────┐ ───────▶ ┌──────┐ ─────────────────────▶ ┌──────┐
//!   │ (new)│          │ Free │ ◀───────────────────── │ Busy │
//!   └──────┘          └──────┘      free_node         └──────┘
//!                        │  ▲                            │
//!                release │  │                    release │
//!                        ▼  │                            ▼
//!                   (removed) ◀──── free_node ──── ToRelease
//!
//!   any live state ── unreachable ──▶ Down ── remove_node ──▶ (removed)
//! ```
//!
//! Script verdicts are collected as futures and raced with
//! [`activeobj::wait_any`] under [`SCRIPT_VERIFICATION_TIMEOUT`]. Verdicts of
//! static scripts are cached per node.

pub mod error;
pub mod event;
pub mod local;
pub mod node;
pub mod resource_core;
pub mod script;
pub mod service;
pub mod source;

pub use error::{Result, RmError};
pub use event::{RmEvent, RmMonitor};
pub use local::LocalNode;
pub use node::{NodeHandle, NodeInfo, NodeState, RmNode};
pub use resource_core::{NodeSet, ResourceCore, RmConfig, RmState, SCRIPT_VERIFICATION_TIMEOUT};
pub use script::{ScriptStatus, SelectionScript};
pub use service::{NodeRegistry, ResourceManager, RmClient};
pub use source::{NodeSource, DEFAULT_SOURCE};
