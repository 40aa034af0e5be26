//! Selection scripts and their cached verification status

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Predicate evaluated on a node to decide whether it fits a request.
///
/// Results of static scripts are cached per node. Dynamic scripts depend on
/// changing node state and are run again on every selection.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SelectionScript {
    source: Arc<str>,
    dynamic: bool,
}

impl SelectionScript {
    pub fn new_static(source: impl AsRef<str>) -> Self {
        Self {
            source: Arc::from(source.as_ref()),
            dynamic: false,
        }
    }

    pub fn new_dynamic(source: impl AsRef<str>) -> Self {
        Self {
            source: Arc::from(source.as_ref()),
            dynamic: true,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

impl fmt::Debug for SelectionScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.dynamic { "dynamic" } else { "static" };
        write!(f, "SelectionScript({}: {:?})", kind, self.source)
    }
}

/// Last known result of a script on a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScriptStatus {
    /// The script passed and the result is still valid
    Verified,
    /// A dynamic script passed during a past allocation; must be run again
    AlreadyVerified,
    /// The script failed on this node
    NotVerified,
}

/// Candidate ordering for a static script: verified nodes first, untried or
/// stale ones next, known failures last.
pub(crate) fn compare_status(a: Option<ScriptStatus>, b: Option<ScriptStatus>) -> Ordering {
    fn rank(status: Option<ScriptStatus>) -> u8 {
        match status {
            Some(ScriptStatus::Verified) => 0,
            None | Some(ScriptStatus::AlreadyVerified) => 1,
            Some(ScriptStatus::NotVerified) => 2,
        }
    }
    rank(a).cmp(&rank(b))
}
