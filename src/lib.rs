//! Serializers for Bluesky-style document streams.
//!
//! An acquisition run arrives as a typed sequence of JSON documents (start,
//! descriptor, event, resource, datum, stop). This crate accumulates each run
//! in memory and renders it, whole-run at the stop document, into one of two
//! formats:
//!
//! - [`SpecFileWriter`]: appends legacy SPEC scan blocks to a growable text
//!   file, one `#S` block per run.
//! - `NexusWriter` (feature `storage_hdf5`): writes one self-describing
//!   NeXus/HDF5 file per run, including compressed copies of externally
//!   stored detector arrays.
//!
//! Both writers share the same front half: [`Document`] parsing, the
//! [`DocumentRouter`] run lifecycle, and [`CommentBank`] annotations. A
//! typical feed loop is:
//!
//! ```no_run
//! use daq_serializers::SpecFileWriter;
//!
//! # fn feed(documents: Vec<(String, serde_json::Value)>) -> daq_serializers::WriterResult<()> {
//! let mut writer = SpecFileWriter::new("/tmp/runs.dat");
//! for (kind, doc) in documents {
//!     writer.receiver(&kind, &doc)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The HDF5 path needs a native libhdf5 at build time, so it stays behind the
//! `storage_hdf5` feature and is off by default.

pub mod accumulator;
pub mod comments;
pub mod document;
pub mod error;
#[cfg(feature = "storage_hdf5")]
pub mod nexus;
pub mod router;
pub mod scan_command;
pub mod spec_file;

pub use accumulator::{ColumnBuffer, RunRecord, SignalRole, StreamRecord};
pub use comments::{Comment, CommentBank, CommentSlot};
pub use document::{
    DataKey, DatumDoc, DescriptorDoc, Document, EventDoc, EventPageDoc, ResourceDoc, StartDoc,
    StopDoc,
};
pub use error::{WriterError, WriterResult};
#[cfg(feature = "storage_hdf5")]
pub use nexus::{DefaultFacility, FacilityLayout, NexusWriter, StreamIndex};
pub use router::DocumentRouter;
pub use scan_command::reconstruct_scan_command;
pub use spec_file::SpecFileWriter;
