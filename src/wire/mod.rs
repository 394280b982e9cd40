//! Wire message types shared by the collector and the producer.
//!
//! Both directions carry a single JSON array with no length prefix or
//! delimiter. Requests are arrays of [`MetricRecord`]; replies are arrays of
//! [`MetricReport`] in the same order and with the same element count as the
//! request that produced them.

pub mod framer;

use serde::{Deserialize, Serialize};

pub use framer::{FrameError, MessageFramer};

/// One metric batch inside a producer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Metric identifier.
    #[serde(rename = "_id")]
    pub id: i64,

    /// Readings sampled since the previous request.
    pub data: Vec<i64>,
}

/// Confidence statistics computed over one metric window.
///
/// `sq_standard_deviation` is carried as an exact alias of
/// `standard_deviation`; the distinction was never resolved in the wire
/// protocol and peers may read either field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub average: f64,
    pub sq_standard_deviation: f64,
    pub standard_deviation: f64,
    pub dispersion: f64,
}

/// One entry in a collector reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    /// Metric identifier, echoed from the request record.
    #[serde(rename = "_id")]
    pub id: i64,

    /// Statistics over the metric's window after this batch was appended.
    pub result: ConfidenceReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_with_underscore_id() {
        let record = MetricRecord {
            id: 3,
            data: vec![1, 2, 3],
        };

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"_id":3,"data":[1,2,3]}"#);
    }

    #[test]
    fn test_request_round_trip() {
        let records = vec![
            MetricRecord {
                id: 0,
                data: vec![10, 20],
            },
            MetricRecord {
                id: 7,
                data: vec![],
            },
        ];

        let bytes = serde_json::to_vec(&records).unwrap();
        let parsed: Vec<MetricRecord> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_reply_round_trip_preserves_order() {
        let reports = vec![
            MetricReport {
                id: 2,
                result: ConfidenceReport {
                    average: 2.5,
                    sq_standard_deviation: 1.12,
                    standard_deviation: 1.12,
                    dispersion: 1.25,
                },
            },
            MetricReport {
                id: 1,
                result: ConfidenceReport {
                    average: 0.0,
                    sq_standard_deviation: 0.0,
                    standard_deviation: 0.0,
                    dispersion: 0.0,
                },
            },
        ];

        let bytes = serde_json::to_vec(&reports).unwrap();
        let parsed: Vec<MetricReport> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, reports);
        assert_eq!(parsed[0].id, 2);
        assert_eq!(parsed[1].id, 1);
    }
}
