//! Serialized response shapes
//!
//! JSON objects handed to the server's trapper/API layer. Points serialize
//! as `{"clock": ts, "value": <scalar>}`; the per-item report carries the
//! metadata fields alongside the data array.

use serde::Serialize;

use crate::types::{ItemId, ItemState, TimeSeriesPoint, Timestamp, Value};

/// One sample in wire form
#[derive(Debug, Clone, Serialize)]
pub struct PointReport {
    /// Sample time in unix seconds
    pub clock: Timestamp,
    /// Sample payload as a plain JSON scalar
    pub value: Value,
}

impl From<TimeSeriesPoint> for PointReport {
    fn from(p: TimeSeriesPoint) -> Self {
        Self {
            clock: p.ts,
            value: p.value,
        }
    }
}

/// Per-item state plus recent data
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    /// Item id
    pub itemid: ItemId,
    /// Time of the most recent data
    pub lastdata: Timestamp,
    /// Next scheduled poll
    pub nextcheck: Timestamp,
    /// Polling state
    pub state: ItemState,
    /// Last polling error, omitted when clear
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Recent samples, newest first
    pub data: Vec<PointReport>,
}

/// Newest cached values of one item, for bulk last-value dumps
#[derive(Debug, Clone, Serialize)]
pub struct ItemLastValues {
    /// Item id
    pub itemid: ItemId,
    /// Samples, newest first
    pub values: Vec<PointReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_report_shape() {
        let report = PointReport {
            clock: 1000,
            value: Value::Float(1.5),
        };
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"clock":1000,"value":1.5}"#
        );
    }

    #[test]
    fn test_item_report_omits_clear_error() {
        let report = ItemReport {
            itemid: 7,
            lastdata: 1000,
            nextcheck: 1060,
            state: ItemState::Normal,
            error: None,
            data: vec![],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("error"));
        assert!(json.contains(r#""state":"normal""#));
    }
}
