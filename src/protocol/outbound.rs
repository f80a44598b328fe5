//! Outbound requests (client → service).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Method name of the version request sent by the handshake.
pub const GET_VERSION: &str = "server.getVersion";
/// Method name of the subscription request.
pub const SET_SUBSCRIPTIONS: &str = "server.setSubscriptions";
/// Method name of the analysis-root registration request.
pub const SET_ANALYSIS_ROOTS: &str = "analysis.setAnalysisRoots";

/// Server-level notification categories a client can subscribe to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerService {
    /// `server.status` notifications (analysis busy/idle).
    Status,
    /// `server.log` notifications.
    Log,
}

/// A single request frame.
///
/// The `id` is assigned by the transport; callers build requests through the
/// constructors below and never pick ids themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Correlation identifier echoed back in the response.
    pub id: String,
    /// Method name, e.g. `server.getVersion`.
    pub method: String,
    /// Method parameters; omitted from the frame when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Build a request with an explicit id.
    #[must_use]
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Parameters for `server.setSubscriptions`.
#[must_use]
pub fn set_subscriptions_params(subscriptions: &[ServerService]) -> Value {
    json!({ "subscriptions": subscriptions })
}

/// Ordered set of filesystem paths registered for analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisRoots {
    included: Vec<PathBuf>,
    excluded: Vec<PathBuf>,
}

impl AnalysisRoots {
    /// Roots containing a single included path and the given exclusions.
    #[must_use]
    pub fn single(target: &Path, excluded: &[PathBuf]) -> Self {
        Self {
            included: vec![target.to_path_buf()],
            excluded: excluded.to_vec(),
        }
    }

    /// Included paths, in registration order.
    #[must_use]
    pub fn included(&self) -> &[PathBuf] {
        &self.included
    }

    /// Excluded paths, in registration order.
    #[must_use]
    pub fn excluded(&self) -> &[PathBuf] {
        &self.excluded
    }

    /// Parameters for `analysis.setAnalysisRoots`.
    #[must_use]
    pub fn to_params(&self) -> Value {
        json!({
            "included": paths_to_strings(&self.included),
            "excluded": paths_to_strings(&self.excluded),
        })
    }
}

fn paths_to_strings(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}
