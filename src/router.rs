//! Run lifecycle routing for document streams.
//!
//! `DocumentRouter` is the per-serializer state machine: it accepts typed
//! documents in delivery order, maintains the "scanning" window between Start
//! and Stop, and hands the finalized `RunRecord` back exactly once when the
//! Stop document arrives. Documents outside the scanning window are logged
//! and dropped; structural contradictions inside the window are errors.
//!
//! A second Start before a prior Stop silently discards the unwritten run
//! (buffers are fully cleared at each new Start). This is a known sharp edge
//! of the upstream protocol, kept intentionally.

use crate::accumulator::RunRecord;
use crate::document::Document;
use crate::error::WriterResult;
use serde_json::Value;

/// Dispatches documents by kind and owns the scanning-state lifecycle.
#[derive(Debug)]
pub struct DocumentRouter {
    scanning: bool,
    run: Option<RunRecord>,
    missing_sentinel: Value,
}

impl Default for DocumentRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRouter {
    pub fn new() -> Self {
        Self {
            scanning: false,
            run: None,
            missing_sentinel: Value::String(String::new()),
        }
    }

    /// True strictly between a Start and its Stop.
    pub fn scanning(&self) -> bool {
        self.scanning
    }

    /// The run currently being accumulated, if any.
    pub fn run(&self) -> Option<&RunRecord> {
        self.run.as_ref()
    }

    /// Value stored when a reading omits one of its declared keys.
    pub fn set_missing_sentinel(&mut self, sentinel: Value) {
        self.missing_sentinel = sentinel;
    }

    /// Drop all buffered state. Idempotent.
    pub fn clear(&mut self) {
        self.scanning = false;
        self.run = None;
    }

    /// Route one document. Returns the finalized run when `doc` is the Stop
    /// document that closes the current scanning window.
    pub fn route(&mut self, doc: Document) -> WriterResult<Option<RunRecord>> {
        match doc {
            Document::Start(start) => {
                if self.scanning {
                    log::warn!(
                        "new start document '{}' before stop; discarding unwritten run",
                        start.uid
                    );
                }
                log::debug!("run '{}' started (scan_id {})", start.uid, start.scan_id);
                self.run = Some(RunRecord::new(start));
                self.scanning = true;
                Ok(None)
            }
            Document::Descriptor(descriptor) => {
                match self.run.as_mut().filter(|_| self.scanning) {
                    Some(run) => run.add_descriptor(descriptor)?,
                    None => log::warn!(
                        "descriptor '{}' outside a run; dropped",
                        descriptor.uid
                    ),
                }
                Ok(None)
            }
            Document::Event(event) => {
                self.append_event(event)?;
                Ok(None)
            }
            Document::EventPage(page) => {
                for event in page.unpack() {
                    self.append_event(event)?;
                }
                Ok(None)
            }
            Document::Resource(resource) => {
                if let Some(run) = self.run.as_mut().filter(|_| self.scanning) {
                    run.resources.insert(resource.uid.clone(), resource);
                } else {
                    log::warn!("resource '{}' outside a run; dropped", resource.uid);
                }
                Ok(None)
            }
            Document::Datum(datum) => {
                if let Some(run) = self.run.as_mut().filter(|_| self.scanning) {
                    run.datums.insert(datum.datum_id.clone(), datum);
                } else {
                    log::warn!("datum '{}' outside a run; dropped", datum.datum_id);
                }
                Ok(None)
            }
            Document::Stop(stop) => {
                if !self.scanning {
                    log::warn!("stop document '{}' outside a run; dropped", stop.uid);
                    return Ok(None);
                }
                self.scanning = false;
                match self.run.take() {
                    Some(mut run) => {
                        log::debug!(
                            "run '{}' stopped ({})",
                            run.start.uid,
                            stop.exit_status
                        );
                        run.stop = Some(stop);
                        Ok(Some(run))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    fn append_event(&mut self, event: crate::document::EventDoc) -> WriterResult<()> {
        if !self.scanning {
            log::warn!("event '{}' outside a run; dropped", event.uid);
            return Ok(());
        }
        let sentinel = self.missing_sentinel.clone();
        let run = match self.run.as_mut() {
            Some(run) => run,
            None => return Ok(()),
        };
        let stream = run
            .stream_for_descriptor_mut(&event.descriptor)
            .ok_or_else(|| crate::error::WriterError::UnknownDescriptor(event.descriptor.clone()))?;
        stream.append_event(&event, &sentinel);
        Ok(())
    }
}
