//! Per-run, per-stream acquisition buffers.
//!
//! Each stream owns one ordered `ColumnBuffer` per declared key. Rows follow
//! document-delivery order exactly; out-of-order timestamps are stored as
//! received. Column order is fixed when the descriptor arrives:
//!
//! 1. independent-variable keys from the Start document that exist in this
//!    stream, in Start-document order;
//! 2. remaining declared keys, in descriptor order, excluding hinted keys;
//! 3. dependent-variable keys named by the stream's own hints, last.
//!
//! A stream with no independent keys (e.g. "baseline") falls through with an
//! empty leading group. Event times are buffered per stream and per column;
//! elapsed-time axes are derived by the serializers from those timestamps.

use crate::document::{DataKey, DescriptorDoc, DatumDoc, EventDoc, ResourceDoc, StartDoc, StopDoc};
use crate::error::{WriterError, WriterResult};
use serde_json::Value;
use std::collections::HashMap;

/// Classification of one data key against the Start document's device lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalRole {
    Detector,
    Positioner,
    Other,
}

impl SignalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalRole::Detector => "detector",
            SignalRole::Positioner => "positioner",
            SignalRole::Other => "other",
        }
    }

    /// Classify a key by membership in the Start document's device lists.
    pub fn classify(key: &str, start: &StartDoc) -> Self {
        if start.detectors.iter().any(|d| d == key) {
            SignalRole::Detector
        } else if start.independent_names().iter().any(|m| m == key) {
            SignalRole::Positioner
        } else {
            SignalRole::Other
        }
    }
}

/// Growing ordered buffer of (value, timestamp) samples for one key.
#[derive(Debug, Clone)]
pub struct ColumnBuffer {
    pub key: String,
    pub data_key: DataKey,
    pub role: SignalRole,
    pub values: Vec<Value>,
    pub timestamps: Vec<f64>,
}

impl ColumnBuffer {
    fn new(key: &str, data_key: DataKey, role: SignalRole) -> Self {
        Self {
            key: key.to_string(),
            data_key,
            role,
            values: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    /// True when this column holds text rather than numbers. Cells equal to
    /// the missing-value sentinel are not evidence: the sentinel may itself
    /// be a non-empty string, and a partial reading must not reclassify a
    /// declared-number column.
    pub fn is_string(&self, sentinel: &Value) -> bool {
        self.data_key.is_string()
            || self
                .values
                .iter()
                .any(|v| v != sentinel && matches!(v, Value::String(s) if !s.is_empty()))
    }
}

/// Column order for one stream. See the module docs for the policy.
pub fn ordered_keys(
    independents: &[String],
    declared: &[String],
    hinted: &[String],
) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(declared.len());
    for name in independents {
        if declared.contains(name) && !out.contains(name) {
            out.push(name.clone());
        }
    }
    for name in declared {
        if !out.contains(name) && !hinted.contains(name) {
            out.push(name.clone());
        }
    }
    for name in hinted {
        if declared.contains(name) && !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

/// One named stream: its descriptor plus ordered per-key buffers.
#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub name: String,
    pub descriptor: DescriptorDoc,
    pub columns: Vec<ColumnBuffer>,
    pub event_times: Vec<f64>,
}

impl StreamRecord {
    /// Pre-allocate buffers for every declared key, in policy order.
    pub fn new(descriptor: DescriptorDoc, start: &StartDoc) -> Self {
        let declared: Vec<String> = descriptor.declared_keys().map(str::to_string).collect();
        let hinted = descriptor.hint_fields();
        let order = ordered_keys(start.independent_names(), &declared, &hinted);
        let columns = order
            .iter()
            .map(|key| {
                ColumnBuffer::new(key, descriptor.data_key(key), SignalRole::classify(key, start))
            })
            .collect();
        Self {
            name: descriptor.name.clone(),
            descriptor,
            columns,
            event_times: Vec::new(),
        }
    }

    /// Append one reading. Keys absent from this particular reading get the
    /// missing-value sentinel; extra undeclared keys are ignored.
    pub fn append_event(&mut self, event: &EventDoc, sentinel: &Value) {
        self.event_times.push(event.time);
        for column in &mut self.columns {
            let value = event
                .data
                .get(&column.key)
                .cloned()
                .unwrap_or_else(|| sentinel.clone());
            let timestamp = event
                .timestamps
                .get(&column.key)
                .and_then(Value::as_f64)
                .unwrap_or(event.time);
            column.values.push(value);
            column.timestamps.push(timestamp);
        }
    }

    pub fn num_events(&self) -> usize {
        self.event_times.len()
    }

    pub fn column(&self, key: &str) -> Option<&ColumnBuffer> {
        self.columns.iter().find(|c| c.key == key)
    }
}

/// Everything accumulated for one run between its Start and Stop documents.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub start: StartDoc,
    pub streams: Vec<StreamRecord>,
    pub resources: HashMap<String, ResourceDoc>,
    pub datums: HashMap<String, DatumDoc>,
    pub stop: Option<StopDoc>,
}

impl RunRecord {
    pub fn new(start: StartDoc) -> Self {
        Self {
            start,
            streams: Vec::new(),
            resources: HashMap::new(),
            datums: HashMap::new(),
            stop: None,
        }
    }

    /// Register a stream descriptor. A reused descriptor uid or a second
    /// descriptor for an existing stream name is a structural error.
    pub fn add_descriptor(&mut self, descriptor: DescriptorDoc) -> WriterResult<()> {
        if self.streams.iter().any(|s| s.descriptor.uid == descriptor.uid) {
            return Err(WriterError::DuplicateDescriptor(descriptor.uid));
        }
        if self.streams.iter().any(|s| s.name == descriptor.name) {
            return Err(WriterError::DuplicateStream(descriptor.name));
        }
        self.streams.push(StreamRecord::new(descriptor, &self.start));
        Ok(())
    }

    pub fn stream(&self, name: &str) -> Option<&StreamRecord> {
        self.streams.iter().find(|s| s.name == name)
    }

    pub fn stream_for_descriptor_mut(&mut self, uid: &str) -> Option<&mut StreamRecord> {
        self.streams.iter_mut().find(|s| s.descriptor.uid == uid)
    }

    /// The stream SPEC blocks and default plots are built from: "primary",
    /// falling back to the first declared stream.
    pub fn primary(&self) -> Option<&StreamRecord> {
        self.stream("primary").or_else(|| self.streams.first())
    }

    /// First Start-document detector present in the primary stream.
    pub fn first_detector_key(&self) -> Option<&str> {
        let primary = self.primary()?;
        self.start
            .detectors
            .iter()
            .find(|d| primary.column(d).is_some())
            .map(String::as_str)
    }

    /// Independent-variable keys present in the primary stream, Start order.
    pub fn positioner_keys(&self) -> Vec<&str> {
        match self.primary() {
            Some(primary) => self
                .start
                .independent_names()
                .iter()
                .filter(|m| primary.column(m).is_some())
                .map(String::as_str)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Run duration in seconds; zero until the Stop document arrives.
    pub fn duration(&self) -> f64 {
        self.stop
            .as_ref()
            .map(|stop| stop.time - self.start.time)
            .unwrap_or(0.0)
    }
}
