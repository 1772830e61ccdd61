//! Document model for structured run data.
//!
//! Implements the Bluesky-style document model that decouples data
//! acquisition from storage. A run engine emits an ordered stream of typed
//! records describing one run:
//!
//! - **StartDoc**: run intent and metadata
//! - **DescriptorDoc**: schema for one data stream
//! - **EventDoc** / **EventPageDoc**: measurements at each point
//! - **ResourceDoc** / **DatumDoc**: references to externally-stored arrays
//! - **StopDoc**: completion status and summary
//!
//! # Document Flow
//!
//! ```text
//! StartDoc (1)
//!    │
//!    ├── DescriptorDoc (1 per data stream)
//!    │       │
//!    │       └── EventDoc (N, measurements)
//!    │
//!    ├── ResourceDoc / DatumDoc (0+, external arrays)
//!    │
//! StopDoc (1)
//! ```
//!
//! Documents arrive over the wire as `(kind, serde_json::Value)` pairs and
//! are parsed into typed payloads here. Unknown kinds are reported as
//! `Ok(None)` so callers can log and move on (forward compatibility).

use crate::error::{WriterError, WriterResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new unique document ID.
pub fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Current timestamp as seconds since the Unix epoch.
pub fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Convert a document timestamp to local wall-clock time.
pub fn to_local_datetime(epoch: f64) -> chrono::DateTime<chrono::Local> {
    use chrono::TimeZone;
    let secs = epoch.floor() as i64;
    let nanos = ((epoch - epoch.floor()) * 1e9) as u32;
    chrono::Local
        .timestamp_opt(secs, nanos)
        .earliest()
        .unwrap_or_else(chrono::Local::now)
}

/// Document types emitted by a run engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    Start(StartDoc),
    Descriptor(DescriptorDoc),
    Event(EventDoc),
    EventPage(EventPageDoc),
    Resource(ResourceDoc),
    Datum(DatumDoc),
    Stop(StopDoc),
}

impl Document {
    /// Parse a raw `(kind, document)` pair into a typed document.
    ///
    /// Returns `Ok(None)` for unrecognized kinds; structural problems in a
    /// recognized kind are reported as errors.
    pub fn parse(kind: &str, doc: &Value) -> WriterResult<Option<Document>> {
        let parsed = match kind {
            "start" => {
                for field in ["uid", "time", "scan_id"] {
                    if doc.get(field).is_none() {
                        return Err(WriterError::MissingField {
                            kind: "start",
                            field,
                        });
                    }
                }
                Document::Start(from_value("start", doc)?)
            }
            "descriptor" => Document::Descriptor(from_value("descriptor", doc)?),
            "event" => Document::Event(from_value("event", doc)?),
            "event_page" => Document::EventPage(from_value("event_page", doc)?),
            "resource" => Document::Resource(from_value("resource", doc)?),
            "datum" => Document::Datum(from_value("datum", doc)?),
            "stop" => Document::Stop(from_value("stop", doc)?),
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    /// Kind tag of this document.
    pub fn kind(&self) -> &'static str {
        match self {
            Document::Start(_) => "start",
            Document::Descriptor(_) => "descriptor",
            Document::Event(_) => "event",
            Document::EventPage(_) => "event_page",
            Document::Resource(_) => "resource",
            Document::Datum(_) => "datum",
            Document::Stop(_) => "stop",
        }
    }
}

fn from_value<T: serde::de::DeserializeOwned>(kind: &'static str, doc: &Value) -> WriterResult<T> {
    serde_json::from_value(doc.clone()).map_err(|source| WriterError::Malformed { kind, source })
}

/// Start document - emitted at the beginning of a run.
///
/// The Start uid identifies the run. `scan_id` is a human-facing counter and
/// is not globally unique. All keys beyond the typed fields are collected
/// into `metadata` in document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDoc {
    /// Unique run identifier (this IS the run uid)
    pub uid: String,
    /// Seconds since the Unix epoch
    pub time: f64,
    /// Human-facing scan counter
    pub scan_id: i64,
    /// Plan that generated this run
    #[serde(default)]
    pub plan_name: String,
    /// Detector (dependent-variable) device names, in plan order
    #[serde(default)]
    pub detectors: Vec<String>,
    /// Motor (independent-variable) device names, in plan order
    #[serde(default)]
    pub motors: Vec<String>,
    /// Alternative spelling used by some plans
    #[serde(default)]
    pub positioners: Vec<String>,
    /// Plan arguments, in call order
    #[serde(default)]
    pub plan_args: Map<String, Value>,
    /// All remaining Start keys, in document order
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl StartDoc {
    pub fn new(scan_id: i64, plan_name: &str) -> Self {
        Self {
            uid: new_uid(),
            time: unix_time(),
            scan_id,
            plan_name: plan_name.to_string(),
            detectors: Vec::new(),
            motors: Vec::new(),
            positioners: Vec::new(),
            plan_args: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Independent-variable names; `motors` wins when both spellings appear.
    pub fn independent_names(&self) -> &[String] {
        if self.motors.is_empty() {
            &self.positioners
        } else {
            &self.motors
        }
    }
}

/// Descriptor document - declares the schema of one data stream.
///
/// Exactly one descriptor per stream name per run. `data_keys` preserves
/// the declaration order from the document, which drives column ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorDoc {
    /// Unique descriptor ID
    pub uid: String,
    /// Seconds since the Unix epoch
    #[serde(default)]
    pub time: f64,
    /// Links to the run's StartDoc
    #[serde(default)]
    pub run_start: String,
    /// Stream name (e.g. "primary", "baseline")
    #[serde(default = "default_stream_name")]
    pub name: String,
    /// Declared keys, in document order
    #[serde(default)]
    pub data_keys: Map<String, Value>,
    /// Per-device plotting hints: `{object: {"fields": [key, ...]}}`
    #[serde(default)]
    pub hints: Map<String, Value>,
}

fn default_stream_name() -> String {
    "primary".to_string()
}

impl DescriptorDoc {
    /// Declared key names in document order.
    pub fn declared_keys(&self) -> impl Iterator<Item = &str> {
        self.data_keys.keys().map(String::as_str)
    }

    /// Lenient typed view of one declared key's schema.
    pub fn data_key(&self, name: &str) -> DataKey {
        self.data_keys
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Dependent-variable keys named by this stream's own hints, flattened
    /// in document order.
    pub fn hint_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        for spec in self.hints.values() {
            if let Some(names) = spec.get("fields").and_then(Value::as_array) {
                for name in names {
                    if let Some(name) = name.as_str() {
                        if !fields.iter().any(|f| f == name) {
                            fields.push(name.to_string());
                        }
                    }
                }
            }
        }
        fields
    }
}

/// Schema for one declared key within a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataKey {
    /// Data type: "number", "integer", "string", "array"
    pub dtype: String,
    /// Shape for arrays (empty for scalars)
    pub shape: Vec<i64>,
    /// Source device identifier (e.g. a PV name)
    pub source: String,
    /// Physical units
    pub units: String,
    /// Display precision
    pub precision: Option<i64>,
    /// Set when event values are datum ids into external storage
    /// (e.g. "FILESTORE:")
    pub external: Option<String>,
}

impl Default for DataKey {
    fn default() -> Self {
        Self {
            dtype: "number".to_string(),
            shape: Vec::new(),
            source: String::new(),
            units: String::new(),
            precision: None,
            external: None,
        }
    }
}

impl DataKey {
    /// True when this key's event values live outside the document stream.
    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }

    /// True when this key holds text rather than numbers.
    pub fn is_string(&self) -> bool {
        self.dtype == "string"
    }
}

/// Event document - one timestamped reading of a stream's keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDoc {
    /// Unique event ID
    pub uid: String,
    /// Seconds since the Unix epoch
    pub time: f64,
    /// Links to the DescriptorDoc that defines the schema
    pub descriptor: String,
    /// Event sequence number within the stream
    #[serde(default)]
    pub seq_num: u64,
    /// Values by key; may omit keys for a partial reading
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Per-key timestamps (seconds since the Unix epoch)
    #[serde(default)]
    pub timestamps: Map<String, Value>,
}

impl EventDoc {
    pub fn new(descriptor: &str, seq_num: u64) -> Self {
        Self {
            uid: new_uid(),
            time: unix_time(),
            descriptor: descriptor.to_string(),
            seq_num,
            data: Map::new(),
            timestamps: Map::new(),
        }
    }

    pub fn with_datum(mut self, key: &str, value: Value) -> Self {
        self.timestamps
            .insert(key.to_string(), Value::from(self.time));
        self.data.insert(key.to_string(), value);
        self
    }
}

/// Event-page document - a column-oriented bundle of events.
///
/// `data` maps each key to a list with one entry per event; `time`,
/// `seq_num`, and `uid` are parallel lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPageDoc {
    /// Links to the DescriptorDoc that defines the schema
    pub descriptor: String,
    #[serde(default)]
    pub uid: Vec<String>,
    pub time: Vec<f64>,
    #[serde(default)]
    pub seq_num: Vec<u64>,
    /// Values by key; each entry is a list parallel to `time`
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub timestamps: Map<String, Value>,
}

impl EventPageDoc {
    /// Unpack the page into individual events, preserving delivery order.
    pub fn unpack(&self) -> Vec<EventDoc> {
        let mut events = Vec::with_capacity(self.time.len());
        for (row, &time) in self.time.iter().enumerate() {
            let mut event = EventDoc {
                uid: self.uid.get(row).cloned().unwrap_or_else(new_uid),
                time,
                descriptor: self.descriptor.clone(),
                seq_num: self.seq_num.get(row).copied().unwrap_or(row as u64 + 1),
                data: Map::new(),
                timestamps: Map::new(),
            };
            for (key, column) in &self.data {
                if let Some(value) = column.get(row) {
                    event.data.insert(key.clone(), value.clone());
                }
            }
            for (key, column) in &self.timestamps {
                if let Some(value) = column.get(row) {
                    event.timestamps.insert(key.clone(), value.clone());
                }
            }
            events.push(event);
        }
        events
    }
}

/// Resource document - describes a file holding externally-stored data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDoc {
    /// Unique resource ID
    pub uid: String,
    /// Storage format tag (e.g. "AD_HDF5")
    #[serde(default)]
    pub spec: String,
    /// Mount-point portion of the file path
    #[serde(default)]
    pub root: String,
    /// Path below `root`
    #[serde(default)]
    pub resource_path: String,
    /// Format-specific parameters
    #[serde(default)]
    pub resource_kwargs: Map<String, Value>,
    /// Links to the run's StartDoc
    #[serde(default)]
    pub run_start: String,
}

impl ResourceDoc {
    /// Full path to the external file.
    pub fn full_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.root).join(&self.resource_path)
    }
}

/// Datum document - one addressable slice of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatumDoc {
    /// Unique datum ID; event values for external keys carry this string
    pub datum_id: String,
    /// Links to the ResourceDoc
    pub resource: String,
    /// Slice parameters (e.g. a point number)
    #[serde(default)]
    pub datum_kwargs: Map<String, Value>,
}

/// Stop document - emitted at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopDoc {
    /// Unique stop doc ID
    pub uid: String,
    /// Seconds since the Unix epoch
    pub time: f64,
    /// Links to the run's StartDoc
    #[serde(default)]
    pub run_start: String,
    /// "success", "abort", or "fail"
    #[serde(default = "default_exit_status")]
    pub exit_status: String,
    /// Reason for abort/failure
    #[serde(default)]
    pub reason: String,
    /// Events emitted per stream
    #[serde(default)]
    pub num_events: Map<String, Value>,
}

fn default_exit_status() -> String {
    "success".to_string()
}
