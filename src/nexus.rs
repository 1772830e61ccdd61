//! NeXus/HDF5 serializer.
//!
//! Builds one self-describing HDF5 file per run, whole-file at Stop:
//!
//! ```text
//! / (attrs: file_name, file_time, creator, NeXus_version, default="entry")
//! /entry (NXentry, attrs: default="data")
//!   start_time, end_time, duration, program_name, title
//!   /instrument (NXinstrument)
//!     /bluesky (NXnote): metadata (NXnote), streams (NXnote), comments (NXnote)
//!     /positioners, /detectors (NXnote, one child per classified key)
//!     /monochromator, /slits, /source  (best-effort, convention-named)
//!   /data (NXdata; signal = first detector, axes = positioners)
//! /entry/sample (NXsample), /entry/contact (NXuser)  (baseline conventions)
//! ```
//!
//! Every declared key becomes an NXdata subgroup under its stream, holding
//! either the in-band values or a compressed copy (lzf, shuffle, fletcher32)
//! of an externally-stored array, tagged with provenance attributes. Copying
//! rather than linking keeps the output a single portable file.
//!
//! Optional groups degrade gracefully: a missing prerequisite key logs a
//! warning and skips the group. An unsupported external-resource spec aborts
//! only that key's group; the error is parked on the writer (see
//! [`NexusWriter::take_deferred_errors`]) and the rest of the file is still
//! written. Whole-file construction at Stop means a crashed write leaves no
//! finalized file.

use crate::accumulator::{ColumnBuffer, RunRecord, SignalRole, StreamRecord};
use crate::comments::{default_slot, CommentBank, CommentSlot};
use crate::document::{to_local_datetime, Document};
use crate::error::{WriterError, WriterResult};
use crate::router::DocumentRouter;
use crate::scan_command::reconstruct_scan_command;
use hdf5::types::VarLenUnicode;
use hdf5::{File, Group};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const NEXUS_VERSION: &str = "v2020.1";
const DEFAULT_STREAM_EXTERNAL_ADDRESS: &str = "/entry/data/data";

/// Paths of already-written `value` datasets, keyed by (stream, key).
/// Cross-linked groups (monochromator, sample, ...) resolve through this
/// instead of re-copying data.
#[derive(Debug, Default)]
pub struct StreamIndex {
    paths: HashMap<(String, String), String>,
}

impl StreamIndex {
    fn insert(&mut self, stream: &str, key: &str, path: String) {
        self.paths.insert((stream.to_string(), key.to_string()), path);
    }

    pub fn dataset_path(&self, stream: &str, key: &str) -> Option<&str> {
        self.paths
            .get(&(stream.to_string(), key.to_string()))
            .map(String::as_str)
    }

    /// Baseline keys beginning with `prefix`, with the prefix stripped.
    pub fn baseline_suffixes(&self, prefix: &str) -> Vec<(String, String)> {
        let mut found: Vec<(String, String)> = self
            .paths
            .iter()
            .filter(|((stream, key), _)| stream == "baseline" && key.starts_with(prefix))
            .map(|((_, key), path)| (key[prefix.len()..].to_string(), path.clone()))
            .collect();
        found.sort();
        found
    }
}

/// Facility-specific extension point.
///
/// Per-site variability (an undulator group, facility name and energy, extra
/// instrument hardware) is expressed by implementing this trait rather than
/// by conditionals in the writer. Implementations follow the same
/// skip-on-absence policy as the built-in optional groups.
pub trait FacilityLayout {
    /// Build `/entry/instrument/source`. The default implementation uses the
    /// `facility` and `source_energy` Start metadata and skips with a
    /// warning when `facility` is absent.
    fn write_source(&self, run: &RunRecord, instrument: &Group) -> WriterResult<()> {
        let name = match run.start.metadata.get("facility").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                log::warn!("no 'facility' metadata; skipping NXsource group");
                return Ok(());
            }
        };
        let source = instrument.create_group("source")?;
        write_str_attr(&source, "NX_class", "NXsource")?;
        write_str_dataset(&source, "name", &name)?;
        if let Some(energy) = run.start.metadata.get("source_energy").and_then(Value::as_f64) {
            write_f64_dataset(&source, "energy", energy)?;
        }
        Ok(())
    }

    /// Hook for extra instrument groups. The default adds nothing.
    fn extend_instrument(
        &self,
        _run: &RunRecord,
        _instrument: &Group,
        _streams: &StreamIndex,
    ) -> WriterResult<()> {
        Ok(())
    }
}

/// Baseline facility: metadata-driven source, no extra instrument groups.
#[derive(Debug, Default)]
pub struct DefaultFacility;

impl FacilityLayout for DefaultFacility {}

/// Writes one NeXus/HDF5 file per run, at the Stop document.
pub struct NexusWriter {
    router: DocumentRouter,
    comments: CommentBank,
    file_path: PathBuf,
    file_name: Option<PathBuf>,
    facility: Box<dyn FacilityLayout>,
    missing_sentinel: Value,
    deferred: Vec<WriterError>,
    last_file: Option<PathBuf>,
}

impl NexusWriter {
    /// `file_path` is the output directory; file names default to
    /// `{start_ymdhms}-S{scan_id:05}-{uid[..7]}.hdf`.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            router: DocumentRouter::new(),
            comments: CommentBank::default(),
            file_path: file_path.into(),
            file_name: None,
            facility: Box::new(DefaultFacility),
            missing_sentinel: Value::String(String::new()),
            deferred: Vec::new(),
            last_file: None,
        }
    }

    pub fn with_facility(mut self, facility: Box<dyn FacilityLayout>) -> Self {
        self.facility = facility;
        self
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn set_file_path(&mut self, file_path: impl Into<PathBuf>) {
        self.file_path = file_path.into();
    }

    /// Override the next run's file name (consumed by the next write).
    pub fn set_file_name(&mut self, file_name: Option<PathBuf>) {
        self.file_name = file_name;
    }

    /// The file produced by the most recent write, if any.
    pub fn last_file(&self) -> Option<&Path> {
        self.last_file.as_deref()
    }

    pub fn scanning(&self) -> bool {
        self.router.scanning()
    }

    /// Value stored when a reading omits one of its declared keys.
    pub fn set_missing_sentinel(&mut self, sentinel: Value) {
        self.router.set_missing_sentinel(sentinel.clone());
        self.missing_sentinel = sentinel;
    }

    /// Per-key errors from the most recent write that degraded gracefully
    /// (unsupported or unresolvable external resources).
    pub fn take_deferred_errors(&mut self) -> Vec<WriterError> {
        std::mem::take(&mut self.deferred)
    }

    /// Single entry point: dispatch one `(kind, document)` pair. The file is
    /// written synchronously inside the stop-document call.
    pub fn receiver(&mut self, kind: &str, doc: &Value) -> WriterResult<()> {
        let parsed = match Document::parse(kind, doc)? {
            Some(parsed) => parsed,
            None => {
                log::debug!("nexus writer ignoring unknown document kind '{kind}'");
                return Ok(());
            }
        };
        if let Some(run) = self.router.route(parsed)? {
            self.write_run(&run)?;
        }
        Ok(())
    }

    /// Inject a timestamped comment (event bucket while scanning, start
    /// bucket otherwise); recorded under `/entry/instrument/bluesky/comments`.
    pub fn add_comment(&mut self, text: &str, slot: Option<CommentSlot>) {
        let slot = slot.unwrap_or_else(|| default_slot(self.scanning()));
        self.comments.push(slot, text);
    }

    /// Drop all buffered state. Idempotent.
    pub fn clear(&mut self) {
        self.router.clear();
        self.comments.clear();
        self.deferred.clear();
    }

    /// Build and write the whole file for one finalized run.
    pub fn write_run(&mut self, run: &RunRecord) -> WriterResult<PathBuf> {
        let name = match self.file_name.take() {
            Some(name) => name,
            None => PathBuf::from(default_file_name(run)),
        };
        if !self.file_path.exists() {
            std::fs::create_dir_all(&self.file_path)?;
        }
        let path = self.file_path.join(name);
        let file = File::create(&path)?;
        self.deferred.clear();

        self.write_root_attributes(&file, &path)?;
        let entry = file.create_group("entry")?;
        write_str_attr(&entry, "NX_class", "NXentry")?;
        self.write_entry_fields(&entry, run)?;

        let instrument = entry.create_group("instrument")?;
        write_str_attr(&instrument, "NX_class", "NXinstrument")?;

        let bluesky = instrument.create_group("bluesky")?;
        write_str_attr(&bluesky, "NX_class", "NXnote")?;
        self.write_run_metadata(&bluesky, run)?;
        let streams = self.write_streams(&bluesky, run)?;
        self.write_comments(&bluesky)?;

        self.write_classified_groups(&file, &instrument, run, &streams)?;
        self.write_monochromator(&file, &instrument, &streams)?;
        self.write_slits(&file, &instrument, &streams)?;
        self.facility.write_source(run, &instrument)?;
        self.facility.extend_instrument(run, &instrument, &streams)?;

        let wrote_data = self.write_default_plot(&file, &entry, run, &streams)?;
        if wrote_data {
            write_str_attr(&entry, "default", "data")?;
        }
        self.write_sample_and_contact(&file, &entry, &streams)?;

        log::info!(
            "wrote NeXus file '{}' for run '{}'",
            path.display(),
            run.start.uid
        );
        self.last_file = Some(path.clone());
        Ok(path)
    }

    fn write_root_attributes(&self, file: &File, path: &Path) -> WriterResult<()> {
        write_str_attr(file, "file_name", &path.display().to_string())?;
        write_str_attr(file, "file_time", &chrono::Local::now().to_rfc3339())?;
        write_str_attr(file, "creator", "daq-serializers")?;
        write_str_attr(file, "creator_version", env!("CARGO_PKG_VERSION"))?;
        write_str_attr(file, "NeXus_version", NEXUS_VERSION)?;
        write_str_attr(file, "default", "entry")?;
        Ok(())
    }

    fn write_entry_fields(&self, entry: &Group, run: &RunRecord) -> WriterResult<()> {
        write_str_dataset(
            entry,
            "start_time",
            &to_local_datetime(run.start.time).to_rfc3339(),
        )?;
        if let Some(stop) = &run.stop {
            write_str_dataset(entry, "end_time", &to_local_datetime(stop.time).to_rfc3339())?;
        }
        write_f64_dataset(entry, "duration", run.duration())?;
        write_str_dataset(entry, "program_name", "bluesky")?;
        write_str_dataset(entry, "title", &reconstruct_scan_command(&run.start))?;
        Ok(())
    }

    fn write_run_metadata(&self, bluesky: &Group, run: &RunRecord) -> WriterResult<()> {
        let metadata = bluesky.create_group("metadata")?;
        write_str_attr(&metadata, "NX_class", "NXnote")?;
        write_str_dataset(&metadata, "uid", &run.start.uid)?;
        write_i64_dataset(&metadata, "scan_id", run.start.scan_id)?;
        write_str_dataset(&metadata, "plan_name", &run.start.plan_name)?;
        for (key, value) in &run.start.metadata {
            write_value_dataset(&metadata, key, value)?;
        }
        Ok(())
    }

    /// Serialize every (stream, key) buffer, returning the dataset index
    /// used for cross-linking.
    fn write_streams(&mut self, bluesky: &Group, run: &RunRecord) -> WriterResult<StreamIndex> {
        let mut index = StreamIndex::default();
        let streams = bluesky.create_group("streams")?;
        write_str_attr(&streams, "NX_class", "NXnote")?;
        for stream in &run.streams {
            let stream_group = streams.create_group(&stream.name)?;
            write_str_attr(&stream_group, "NX_class", "NXnote")?;
            for column in &stream.columns {
                match self.write_key_group(&stream_group, stream, column, run) {
                    Ok(()) => index.insert(
                        &stream.name,
                        &column.key,
                        format!(
                            "/entry/instrument/bluesky/streams/{}/{}/value",
                            stream.name, column.key
                        ),
                    ),
                    Err(
                        err @ (WriterError::UnsupportedResource(_)
                        | WriterError::UnknownResource(_)),
                    ) => {
                        log::error!(
                            "skipping stream key '{}/{}': {}",
                            stream.name,
                            column.key,
                            err
                        );
                        // leave no half-built group behind
                        let _ = stream_group.unlink(&column.key);
                        self.deferred.push(err);
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(index)
    }

    fn write_key_group(
        &self,
        stream_group: &Group,
        stream: &StreamRecord,
        column: &ColumnBuffer,
        run: &RunRecord,
    ) -> WriterResult<()> {
        let group = stream_group.create_group(&column.key)?;
        write_str_attr(&group, "NX_class", "NXdata")?;
        write_str_attr(&group, "signal", "value")?;
        write_str_attr(&group, "signal_type", column.role.as_str())?;

        let value = if column.data_key.is_external() {
            self.copy_external(&group, column, run)?
        } else if column.is_string(&self.missing_sentinel) {
            let rendered: Vec<VarLenUnicode> = column
                .values
                .iter()
                .map(|v| vstr(&render_text(v)))
                .collect::<WriterResult<_>>()?;
            group.new_dataset_builder().with_data(&rendered).create("value")?
        } else {
            let numeric = numeric_values(&column.values);
            group.new_dataset_builder().with_data(&numeric).create("value")?
        };
        write_str_attr(&value, "signal_type", column.role.as_str())?;
        if !column.data_key.units.is_empty() {
            write_str_attr(&value, "units", &column.data_key.units)?;
        }

        // raw timestamps plus a zero-based elapsed axis
        let epoch = group
            .new_dataset_builder()
            .with_data(&column.timestamps)
            .create("EPOCH")?;
        write_str_attr(&epoch, "units", "s")?;
        let first = column.timestamps.first().copied().unwrap_or(run.start.time);
        let elapsed: Vec<f64> = column.timestamps.iter().map(|t| t - first).collect();
        let time = group.new_dataset_builder().with_data(&elapsed).create("time")?;
        write_str_attr(&time, "units", "s")?;
        write_str_attr(&time, "start_time", &to_local_datetime(first).to_rfc3339())?;

        if stream.name == "baseline" && !column.values.is_empty() {
            // O(1) before/after lookups for slowly-varying signals
            write_value_dataset(&group, "value_start", &column.values[0])?;
            write_value_dataset(
                &group,
                "value_end",
                &column.values[column.values.len() - 1],
            )?;
        }
        Ok(())
    }

    /// Copy externally-stored data into the file (compressed), rather than
    /// linking to it, so the run remains a single portable file.
    fn copy_external(
        &self,
        group: &Group,
        column: &ColumnBuffer,
        run: &RunRecord,
    ) -> WriterResult<hdf5::Dataset> {
        let datum_id = column
            .values
            .iter()
            .find_map(Value::as_str)
            .ok_or_else(|| WriterError::UnknownResource(column.key.clone()))?;
        let datum = run
            .datums
            .get(datum_id)
            .ok_or_else(|| WriterError::UnknownResource(datum_id.to_string()))?;
        let resource = run
            .resources
            .get(&datum.resource)
            .ok_or_else(|| WriterError::UnknownResource(datum.resource.clone()))?;

        let address = match resource.spec.as_str() {
            "AD_HDF5" => resource
                .resource_kwargs
                .get("address")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_STREAM_EXTERNAL_ADDRESS)
                .to_string(),
            other => return Err(WriterError::UnsupportedResource(other.to_string())),
        };

        let source_path = resource.full_path();
        let source = File::open(&source_path)?;
        let dataset = source.dataset(&address)?;
        let shape = dataset.shape();
        let data = dataset.read_raw::<f64>()?;

        let copied = if shape.is_empty() {
            let ds = group.new_dataset::<f64>().create("value")?;
            ds.write_raw(&data)?;
            ds
        } else {
            let ds = group
                .new_dataset::<f64>()
                .shape(shape.clone())
                .chunk(shape)
                .lzf()
                .shuffle()
                .fletcher32()
                .create("value")?;
            ds.write_raw(&data)?;
            ds
        };
        write_str_attr(&copied, "source_file", &source_path.display().to_string())?;
        write_str_attr(&copied, "source_address", &address)?;
        write_str_attr(&copied, "resource_id", &resource.uid)?;
        Ok(copied)
    }

    /// `/entry/instrument/positioners` and `/detectors`: one child group per
    /// classified primary-stream key, hard-linked to the stream dataset.
    fn write_classified_groups(
        &self,
        file: &File,
        instrument: &Group,
        run: &RunRecord,
        streams: &StreamIndex,
    ) -> WriterResult<()> {
        let primary = match run.primary() {
            Some(primary) => primary,
            None => {
                log::warn!("no primary stream; skipping positioners/detectors groups");
                return Ok(());
            }
        };
        for (group_name, child_class, role) in [
            ("positioners", "NXpositioner", SignalRole::Positioner),
            ("detectors", "NXdetector", SignalRole::Detector),
        ] {
            let keys: Vec<&ColumnBuffer> = primary
                .columns
                .iter()
                .filter(|c| c.role == role)
                .collect();
            if keys.is_empty() {
                log::warn!("no {} keys in primary stream; skipping group", group_name);
                continue;
            }
            let parent = instrument.create_group(group_name)?;
            write_str_attr(&parent, "NX_class", "NXnote")?;
            for column in keys {
                let child = parent.create_group(&column.key)?;
                write_str_attr(&child, "NX_class", child_class)?;
                if let Some(target) = streams.dataset_path(&primary.name, &column.key) {
                    file.link_hard(
                        target,
                        &format!(
                            "/entry/instrument/{}/{}/value",
                            group_name, column.key
                        ),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// `/entry/data`: the default-plot target. Skipped (with a warning) when
    /// the run has no detector key.
    fn write_default_plot(
        &self,
        file: &File,
        entry: &Group,
        run: &RunRecord,
        streams: &StreamIndex,
    ) -> WriterResult<bool> {
        let signal = match run.first_detector_key() {
            Some(signal) => signal.to_string(),
            None => {
                log::warn!("no detector key; skipping /entry/data default plot");
                return Ok(false);
            }
        };
        let primary = match run.primary() {
            Some(primary) => primary,
            None => return Ok(false),
        };
        let axes = run.positioner_keys();

        let data = entry.create_group("data")?;
        write_str_attr(&data, "NX_class", "NXdata")?;
        write_str_attr(&data, "signal", &signal)?;
        if !axes.is_empty() {
            write_str_list_attr(&data, "axes", &axes)?;
        }

        let mut linked: Vec<&str> = axes.clone();
        linked.push(&signal);
        for key in linked {
            if let Some(target) = streams.dataset_path(&primary.name, key) {
                file.link_hard(target, &format!("/entry/data/{key}"))?;
            }
        }
        Ok(true)
    }

    fn write_monochromator(
        &self,
        file: &File,
        instrument: &Group,
        streams: &StreamIndex,
    ) -> WriterResult<()> {
        let fields = streams.baseline_suffixes("monochromator_");
        if fields.is_empty() {
            log::warn!("no baseline monochromator_* keys; skipping NXmonochromator group");
            return Ok(());
        }
        let mono = instrument.create_group("monochromator")?;
        write_str_attr(&mono, "NX_class", "NXmonochromator")?;
        for (suffix, target) in fields {
            file.link_hard(&target, &format!("/entry/instrument/monochromator/{suffix}"))?;
        }
        Ok(())
    }

    fn write_slits(
        &self,
        file: &File,
        instrument: &Group,
        streams: &StreamIndex,
    ) -> WriterResult<()> {
        let fields = streams.baseline_suffixes("slit");
        if fields.is_empty() {
            log::warn!("no baseline slit* keys; skipping slits group");
            return Ok(());
        }
        let slits = instrument.create_group("slits")?;
        write_str_attr(&slits, "NX_class", "NXnote")?;
        for (suffix, target) in fields {
            file.link_hard(&target, &format!("/entry/instrument/slits/slit{suffix}"))?;
        }
        Ok(())
    }

    /// `/entry/sample` and `/entry/contact`, built from convention-named
    /// baseline keys; each skipped with a warning when absent.
    fn write_sample_and_contact(
        &self,
        file: &File,
        entry: &Group,
        streams: &StreamIndex,
    ) -> WriterResult<()> {
        let sample_fields = streams.baseline_suffixes("sample_");
        if sample_fields.is_empty() {
            log::warn!("no baseline sample_* keys; skipping NXsample group");
        } else {
            let sample = entry.create_group("sample")?;
            write_str_attr(&sample, "NX_class", "NXsample")?;
            for (suffix, target) in sample_fields {
                file.link_hard(&target, &format!("/entry/sample/{suffix}"))?;
            }
        }

        match streams.dataset_path("baseline", "contact_name") {
            Some(target) => {
                let contact = entry.create_group("contact")?;
                write_str_attr(&contact, "NX_class", "NXuser")?;
                file.link_hard(target, "/entry/contact/name")?;
            }
            None => log::warn!("no baseline contact_name key; skipping NXuser group"),
        }
        Ok(())
    }

    fn write_comments(&mut self, bluesky: &Group) -> WriterResult<()> {
        if self.comments.is_empty() {
            return Ok(());
        }
        let group = bluesky.create_group("comments")?;
        write_str_attr(&group, "NX_class", "NXnote")?;
        for slot in CommentSlot::ALL {
            let drained = self.comments.drain(slot);
            if drained.is_empty() {
                continue;
            }
            let lines: Vec<VarLenUnicode> = drained
                .iter()
                .map(|c| vstr(&format!("{}  {}", c.time.to_rfc3339(), c.text)))
                .collect::<WriterResult<_>>()?;
            group
                .new_dataset_builder()
                .with_data(&lines)
                .create(slot.as_str())?;
        }
        Ok(())
    }
}

/// `{start_ymdhms}-S{scan_id:05}-{uid[..7]}.hdf`
pub fn default_file_name(run: &RunRecord) -> String {
    let stamp = to_local_datetime(run.start.time).format("%Y%m%d-%H%M%S");
    let uid7: String = run.start.uid.chars().take(7).collect();
    format!("{}-S{:05}-{}.hdf", stamp, run.start.scan_id, uid7)
}

fn vstr(s: &str) -> WriterResult<VarLenUnicode> {
    s.parse::<VarLenUnicode>()
        .map_err(|err| WriterError::Hdf5(hdf5::Error::from(err.to_string())))
}

fn write_str_attr(loc: &hdf5::Location, name: &str, value: &str) -> WriterResult<()> {
    let value = vstr(value)?;
    loc.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn write_str_list_attr(loc: &hdf5::Location, name: &str, values: &[&str]) -> WriterResult<()> {
    let rendered: Vec<VarLenUnicode> = values.iter().map(|s| vstr(s)).collect::<WriterResult<_>>()?;
    loc.new_attr::<VarLenUnicode>()
        .shape(rendered.len())
        .create(name)?
        .write_raw(&rendered)?;
    Ok(())
}

fn write_str_dataset(group: &Group, name: &str, value: &str) -> WriterResult<()> {
    let value = vstr(value)?;
    let ds = group.new_dataset::<VarLenUnicode>().create(name)?;
    ds.write_scalar(&value)?;
    Ok(())
}

fn write_f64_dataset(group: &Group, name: &str, value: f64) -> WriterResult<()> {
    let ds = group.new_dataset::<f64>().create(name)?;
    ds.write_scalar(&value)?;
    Ok(())
}

fn write_i64_dataset(group: &Group, name: &str, value: i64) -> WriterResult<()> {
    let ds = group.new_dataset::<i64>().create(name)?;
    ds.write_scalar(&value)?;
    Ok(())
}

/// Metadata and baseline scalars keep their native type where possible.
fn write_value_dataset(group: &Group, name: &str, value: &Value) -> WriterResult<()> {
    match value {
        Value::Number(n) if n.as_i64().is_some() => {
            write_i64_dataset(group, name, n.as_i64().unwrap_or_default())
        }
        Value::Number(n) => write_f64_dataset(group, name, n.as_f64().unwrap_or(f64::NAN)),
        Value::Bool(b) => write_i64_dataset(group, name, i64::from(*b)),
        Value::String(s) => write_str_dataset(group, name, s),
        other => write_str_dataset(
            group,
            name,
            &serde_json::to_string(other).unwrap_or_default(),
        ),
    }
}

fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Numeric column view: non-numeric cells (including the missing-value
/// sentinel) become NaN.
fn numeric_values(values: &[Value]) -> Vec<f64> {
    values
        .iter()
        .map(|v| match v {
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => other.as_f64().unwrap_or(f64::NAN),
        })
        .collect()
}
