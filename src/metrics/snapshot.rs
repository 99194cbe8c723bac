//! Sticky last-known-value store for live metrics.
//!
//! Each processed frame overwrites only the metrics it carried. A metric absent
//! from the newest frame keeps its previous value until an explicit
//! [`MetricsSnapshot::clear`].

use crate::protocol::{DecodedFields, Metric};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Latest known value of every metric plus the time of the last update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    values: BTreeMap<Metric, f64>,
    last_updated: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    /// Empty snapshot: every metric unknown, never updated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one decoded frame, stamping the update with the current time.
    pub fn merge(&mut self, fields: &DecodedFields) {
        self.merge_at(fields, Utc::now());
    }

    /// Merge one decoded frame with an explicit timestamp.
    ///
    /// The timestamp advances even when the frame carried no metrics.
    pub fn merge_at(&mut self, fields: &DecodedFields, at: DateTime<Utc>) {
        for (metric, value) in fields.iter() {
            self.values.insert(metric, value);
        }
        self.last_updated = Some(at);
    }

    /// Last known value of `metric`.
    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    /// When the last frame was merged.
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Forget every value. Used on explicit disconnect or reset.
    pub fn clear(&mut self) {
        self.values.clear();
        self.last_updated = None;
    }

    /// Whether no metric has ever been reported since the last clear.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every metric by name, `None` where unknown.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<&'static str, Option<f64>> {
        Metric::ALL
            .into_iter()
            .map(|metric| (metric.name(), self.get(metric)))
            .collect()
    }
}

impl Serialize for MetricsSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire<'a> {
            #[serde(flatten)]
            metrics: BTreeMap<&'static str, Option<f64>>,
            last_updated: &'a Option<DateTime<Utc>>,
        }

        Wire {
            metrics: self.to_map(),
            last_updated: &self.last_updated,
        }
        .serialize(serializer)
    }
}
