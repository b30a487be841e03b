use scanline_scheduler::{AuxiliaryPlan, ScanClass, ScanWindow};
use serde_json::{json, Value};
use thiserror::Error;

use crate::trigger::TriggerRecord;

/// Everything a connector needs to know about one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    pub window: ScanWindow,
    pub class: ScanClass,
    pub auxiliary: AuxiliaryPlan,
}

impl ScanPlan {
    pub fn is_partial(&self) -> bool {
        self.class.is_partial()
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("{0}")]
    Unsupported(String),
}

/// Turns a scan plan into the connector-specific job query.
pub trait ConnectorQueryBuilder: Send + Sync {
    fn build(&self, trigger: &TriggerRecord, plan: &ScanPlan) -> Result<Value, QueryError>;
}

/// Query shape shared by the iterative SCM / issue-tracker connectors:
///
/// ```json
/// { "integration_id": "42", "from": 1700000000, "to": 1700003600,
///   "partial": true, "fetch_projects": false, "fetch_users": true }
/// ```
///
/// `from`/`to` are the window bounds floored to whole epoch seconds. `from`
/// is inclusive and `to` exclusive, matching [`ScanWindow`]'s `[from, to)`,
/// so consecutive windows share a boundary and the connector must not fetch
/// records stamped exactly at `to`. There is one `fetch_<kind>` flag per
/// configured auxiliary kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterativeScanQueryBuilder;

impl ConnectorQueryBuilder for IterativeScanQueryBuilder {
    fn build(&self, trigger: &TriggerRecord, plan: &ScanPlan) -> Result<Value, QueryError> {
        if trigger.integration_id.is_empty() {
            return Err(QueryError::MissingField("integration_id"));
        }
        let mut query = json!({
            "integration_id": trigger.integration_id,
            "from": plan.window.from.timestamp(),
            "to": plan.window.to.timestamp(),
            "partial": plan.is_partial(),
        });
        if let Value::Object(map) = &mut query {
            for kind in plan.auxiliary.configured() {
                map.insert(
                    format!("fetch_{kind}"),
                    Value::Bool(plan.auxiliary.is_due(kind)),
                );
            }
        }
        Ok(query)
    }
}
