//! SPEC scan-file serializer.
//!
//! Formats one run as a legacy SPEC scan block and appends it to a growable
//! text file. The file header is written lazily exactly once, before the
//! first scan block; each completed run then contributes one `#S` block.
//!
//! The only collision guard is a pre-scan of the target file for the run's
//! uid (written on the `#MD uid` line), which refuses stop-document replays.
//! The append itself is not transactional: a crash mid-append can leave a
//! partial block. That limitation is documented, not silently repaired.
//!
//! Comments submitted while no run is scanning, or after a run's block was
//! already written, are deferred and flushed into the *next* run's block.
//! This mirrors the long-standing behavior of the upstream format.

use crate::accumulator::RunRecord;
use crate::comments::{default_slot, Comment, CommentBank, CommentSlot};
use crate::document::{to_local_datetime, Document};
use crate::error::{WriterError, WriterResult};
use crate::router::DocumentRouter;
use crate::scan_command::reconstruct_scan_command;
use chrono::{DateTime, Local};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Start-document keys never echoed as `#MD` lines. `uid` is deliberately
/// not excluded: the duplicate-run guard depends on finding it in the file.
const MD_EXCLUSIONS: &[&str] = &[
    "time",
    "detectors",
    "motors",
    "positioners",
    "plan_args",
    "plan_name",
    "plan_type",
    "plan_pattern",
    "plan_pattern_args",
    "plan_pattern_module",
    "hints",
    "num_points",
    "num_intervals",
    "scan_id",
];

/// SPEC's ctime-style date rendering.
fn spec_date(when: &DateTime<Local>) -> String {
    when.format("%a %b %d %H:%M:%S %Y").to_string()
}

/// Writes runs as SPEC scan blocks appended to one text file.
pub struct SpecFileWriter {
    router: DocumentRouter,
    comments: CommentBank,
    file_path: PathBuf,
    auto_write: bool,
    missing_sentinel: Value,
    pending: Option<RunRecord>,
}

impl SpecFileWriter {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            router: DocumentRouter::new(),
            comments: CommentBank::default(),
            file_path: file_path.into(),
            auto_write: true,
            missing_sentinel: Value::String(String::new()),
            pending: None,
        }
    }

    /// When false, `receiver` only accumulates and the caller drives
    /// `write_scan` itself.
    pub fn set_auto_write(&mut self, auto_write: bool) {
        self.auto_write = auto_write;
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn set_file_path(&mut self, file_path: impl Into<PathBuf>) {
        self.file_path = file_path.into();
    }

    pub fn scanning(&self) -> bool {
        self.router.scanning()
    }

    /// Value written when a reading omits one of its declared keys.
    pub fn set_missing_sentinel(&mut self, sentinel: Value) {
        self.router.set_missing_sentinel(sentinel.clone());
        self.missing_sentinel = sentinel;
    }

    /// Single entry point: dispatch one `(kind, document)` pair. The scan
    /// block is appended inside the stop-document call when auto-write is on.
    pub fn receiver(&mut self, kind: &str, doc: &Value) -> WriterResult<()> {
        let parsed = match Document::parse(kind, doc)? {
            Some(parsed) => parsed,
            None => {
                log::debug!("spec writer ignoring unknown document kind '{kind}'");
                return Ok(());
            }
        };
        if let Some(run) = self.router.route(parsed)? {
            self.pending = Some(run);
            if self.auto_write {
                self.write_scan()?;
            }
        }
        Ok(())
    }

    /// Inject a timestamped comment. With no explicit slot, it lands in the
    /// event bucket while scanning and the start bucket otherwise.
    pub fn add_comment(&mut self, text: &str, slot: Option<CommentSlot>) {
        let slot = slot.unwrap_or_else(|| default_slot(self.scanning()));
        self.comments.push(slot, text);
    }

    /// Drop all buffered state, including deferred comments. Idempotent.
    pub fn clear(&mut self) {
        self.router.clear();
        self.comments.clear();
        self.pending = None;
    }

    /// Append the most recently finalized run as one scan block.
    pub fn write_scan(&mut self) -> WriterResult<()> {
        let run = self.pending.take().ok_or(WriterError::NoRun)?;

        // Replayed stop documents must not duplicate the block.
        if self.file_path.exists() {
            let existing = std::fs::read_to_string(&self.file_path)?;
            if existing.contains(&run.start.uid) {
                return Err(WriterError::DuplicateRun {
                    uid: run.start.uid.clone(),
                    path: self.file_path.clone(),
                });
            }
        }

        let block = self.build_scan_block(&run);
        let needs_header = std::fs::metadata(&self.file_path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        if needs_header {
            file.write_all(self.build_header().as_bytes())?;
        }
        file.write_all(block.as_bytes())?;
        file.flush()?;
        log::info!(
            "wrote scan {} (run '{}') to '{}'",
            run.start.scan_id,
            run.start.uid,
            self.file_path.display()
        );
        Ok(())
    }

    fn build_header(&self) -> String {
        let now = Local::now();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "bluesky".to_string());
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        format!(
            "#F {}\n#E {}\n#D {}\n#C Bluesky  user = {}  host = {}\n#O0 \n#o0 \n\n",
            self.file_path.display(),
            now.timestamp(),
            spec_date(&now),
            user,
            host,
        )
    }

    fn build_scan_block(&mut self, run: &RunRecord) -> String {
        let mut block = String::new();
        block.push_str(&format!("#S {}\n", reconstruct_scan_command(&run.start)));
        block.push_str(&format!(
            "#D {}\n",
            spec_date(&to_local_datetime(run.start.time))
        ));

        if let Some(time) = run.start.plan_args.get("time").and_then(Value::as_f64) {
            block.push_str(&format!("#T {}\n", render_cell(&Value::from(time))));
        } else if let Some(monitor) = run.start.metadata.get("monitor").and_then(Value::as_f64) {
            block.push_str(&format!("#M {}\n", render_cell(&Value::from(monitor))));
        }

        push_comments(&mut block, self.comments.drain(CommentSlot::Start));

        block.push_str(&format!("#MD uid = {}\n", run.start.uid));
        for (key, value) in &run.start.metadata {
            if MD_EXCLUSIONS.contains(&key.as_str()) {
                continue;
            }
            block.push_str(&format!("#MD {} = {}\n", key, render_metadata(value)));
        }

        block.push_str("#P0\n");
        self.push_data_section(&mut block, run);

        for slot in [
            CommentSlot::Descriptor,
            CommentSlot::Event,
            CommentSlot::Resource,
            CommentSlot::Datum,
            CommentSlot::Stop,
        ] {
            push_comments(&mut block, self.comments.drain(slot));
        }
        block.push('\n');
        block
    }

    fn push_data_section(&self, block: &mut String, run: &RunRecord) {
        let primary = match run.primary() {
            Some(primary) if !primary.columns.is_empty() => primary,
            _ => {
                log::warn!("run '{}' has no stream data for SPEC", run.start.uid);
                return;
            }
        };

        block.push_str(&format!("#N {}\n", primary.columns.len()));
        let labels: Vec<&str> = primary.columns.iter().map(|c| c.key.as_str()).collect();
        block.push_str(&format!("#L {}\n", labels.join("  ")));

        let string_column: Vec<bool> = primary
            .columns
            .iter()
            .map(|c| c.is_string(&self.missing_sentinel))
            .collect();
        let mut unicode_lines: Vec<String> = Vec::new();
        for row in 0..primary.num_events() {
            let cells: Vec<String> = primary
                .columns
                .iter()
                .zip(&string_column)
                .map(|(column, &is_string)| {
                    let value = &column.values[row];
                    if is_string {
                        // SPEC numeric columns cannot hold text: park the
                        // sentinel in the row and carry the text on a #U line.
                        if *value != self.missing_sentinel {
                            unicode_lines.push(format!(
                                "#U {} {} {}",
                                row,
                                column.key,
                                render_cell(value)
                            ));
                        }
                        render_cell(&self.missing_sentinel)
                    } else {
                        render_cell(value)
                    }
                })
                .collect();
            block.push_str(&cells.join(" "));
            block.push('\n');
        }
        for line in unicode_lines {
            block.push_str(&line);
            block.push('\n');
        }
    }
}

fn push_comments(block: &mut String, comments: Vec<Comment>) {
    for comment in comments {
        block.push_str(&format!(
            "#C {}.  {}\n",
            spec_date(&comment.time),
            comment.text
        ));
    }
}

/// Render one data cell. Arrays and objects collapse to compact JSON so they
/// cannot break the column count.
fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// `#MD` values: strings verbatim, everything else compact JSON.
fn render_metadata(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
