//! End-to-end tests for the NeXus/HDF5 serializer. These run only with the
//! `storage_hdf5` feature (native libhdf5 required).

use daq_serializers::{NexusWriter, WriterError};
use hdf5::types::VarLenUnicode;
use hdf5::File;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const T0: f64 = 1623322530.0;

fn start_doc(uid: &str, scan_id: i64) -> Value {
    json!({
        "uid": uid,
        "time": T0,
        "scan_id": scan_id,
        "plan_name": "scan",
        "detectors": ["d1"],
        "motors": ["m1"],
        "plan_args": {"num": 2},
        "facility": "test facility",
        "source_energy": 6.0,
    })
}

fn primary_descriptor(uid: &str, run_start: &str) -> Value {
    json!({
        "uid": uid,
        "time": T0 + 0.1,
        "run_start": run_start,
        "name": "primary",
        "data_keys": {
            "m1": {"dtype": "number", "source": "SIM:m1", "units": "mm"},
            "d1": {"dtype": "number", "source": "SIM:d1"},
        },
    })
}

fn baseline_descriptor(uid: &str, run_start: &str) -> Value {
    json!({
        "uid": uid,
        "time": T0 + 0.1,
        "run_start": run_start,
        "name": "baseline",
        "data_keys": {
            "sample_name": {"dtype": "string", "source": "SIM:sample"},
            "contact_name": {"dtype": "string", "source": "SIM:contact"},
            "monochromator_energy": {"dtype": "number", "source": "SIM:mono"},
        },
    })
}

fn event_doc(descriptor: &str, seq_num: u64, data: Value) -> Value {
    let offset = seq_num as f64;
    json!({
        "uid": format!("event-{descriptor}-{seq_num}"),
        "time": T0 + offset,
        "descriptor": descriptor,
        "seq_num": seq_num,
        "data": data,
        "timestamps": {},
    })
}

fn stop_doc(uid: &str, run_start: &str) -> Value {
    json!({
        "uid": uid,
        "time": T0 + 10.0,
        "run_start": run_start,
        "exit_status": "success",
    })
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn feed_full_run(writer: &mut NexusWriter, run_uid: &str) {
    init_logging();
    writer.receiver("start", &start_doc(run_uid, 1)).unwrap();
    writer
        .receiver("descriptor", &primary_descriptor("desc-p", run_uid))
        .unwrap();
    writer
        .receiver("descriptor", &baseline_descriptor("desc-b", run_uid))
        .unwrap();
    writer
        .receiver(
            "event",
            &event_doc(
                "desc-b",
                1,
                json!({
                    "sample_name": "vanadium",
                    "contact_name": "A. Scientist",
                    "monochromator_energy": 12.4,
                }),
            ),
        )
        .unwrap();
    writer
        .receiver("event", &event_doc("desc-p", 1, json!({"m1": 0.0, "d1": 5.0})))
        .unwrap();
    writer
        .receiver("event", &event_doc("desc-p", 2, json!({"m1": 1.0, "d1": 7.0})))
        .unwrap();
    writer
        .receiver(
            "event",
            &event_doc(
                "desc-b",
                2,
                json!({
                    "sample_name": "vanadium",
                    "contact_name": "A. Scientist",
                    "monochromator_energy": 12.5,
                }),
            ),
        )
        .unwrap();
    writer
        .receiver("stop", &stop_doc(&format!("{run_uid}-stop"), run_uid))
        .unwrap();
}

fn str_attr(loc: &hdf5::Location, name: &str) -> String {
    loc.attr(name)
        .unwrap()
        .read_scalar::<VarLenUnicode>()
        .unwrap()
        .to_string()
}

fn written_file(writer: &NexusWriter) -> PathBuf {
    writer.last_file().unwrap().to_path_buf()
}

#[test]
fn test_default_plot_chain() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = NexusWriter::new(dir.path());
    feed_full_run(&mut writer, "run-plot");
    assert!(writer.take_deferred_errors().is_empty());

    let file = File::open(written_file(&writer)).unwrap();
    // default-plot chain: / -> entry -> data -> signal
    assert_eq!(str_attr(&file, "default"), "entry");
    let entry = file.group("entry").unwrap();
    assert_eq!(str_attr(&entry, "default"), "data");
    let data = entry.group("data").unwrap();
    assert_eq!(str_attr(&data, "NX_class"), "NXdata");
    assert_eq!(str_attr(&data, "signal"), "d1");
    let axes = data
        .attr("axes")
        .unwrap()
        .read_raw::<VarLenUnicode>()
        .unwrap();
    assert_eq!(axes.len(), 1);
    assert_eq!(axes[0].as_str(), "m1");

    // hard links resolve to the stream data
    let signal = data.dataset("d1").unwrap();
    assert_eq!(signal.read_raw::<f64>().unwrap(), vec![5.0, 7.0]);
    let axis = data.dataset("m1").unwrap();
    assert_eq!(axis.read_raw::<f64>().unwrap(), vec![0.0, 1.0]);
}

#[test]
fn test_stream_groups_and_classification() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = NexusWriter::new(dir.path());
    feed_full_run(&mut writer, "run-streams");

    let file = File::open(written_file(&writer)).unwrap();
    let d1 = file
        .group("entry/instrument/bluesky/streams/primary/d1")
        .unwrap();
    assert_eq!(str_attr(&d1, "NX_class"), "NXdata");
    assert_eq!(str_attr(&d1, "signal"), "value");
    assert_eq!(str_attr(&d1, "signal_type"), "detector");
    let value = d1.dataset("value").unwrap();
    assert_eq!(str_attr(&value, "signal_type"), "detector");
    assert_eq!(value.read_raw::<f64>().unwrap(), vec![5.0, 7.0]);

    let m1 = file
        .group("entry/instrument/bluesky/streams/primary/m1")
        .unwrap();
    assert_eq!(str_attr(&m1, "signal_type"), "positioner");
    let m1_value = m1.dataset("value").unwrap();
    assert_eq!(str_attr(&m1_value, "units"), "mm");

    // per-key timebase: raw EPOCH plus zero-based elapsed seconds
    let epoch = d1.dataset("EPOCH").unwrap().read_raw::<f64>().unwrap();
    assert_eq!(epoch, vec![T0 + 1.0, T0 + 2.0]);
    let time = d1.dataset("time").unwrap();
    assert_eq!(time.read_raw::<f64>().unwrap(), vec![0.0, 1.0]);
    assert_eq!(str_attr(&time, "units"), "s");

    // classified hardware groups link back to the same data
    let det = file.group("entry/instrument/detectors/d1").unwrap();
    assert_eq!(str_attr(&det, "NX_class"), "NXdetector");
    assert_eq!(det.dataset("value").unwrap().read_raw::<f64>().unwrap(), vec![5.0, 7.0]);
    let pos = file.group("entry/instrument/positioners/m1").unwrap();
    assert_eq!(str_attr(&pos, "NX_class"), "NXpositioner");
}

#[test]
fn test_baseline_conventions() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = NexusWriter::new(dir.path());
    feed_full_run(&mut writer, "run-baseline");

    let file = File::open(written_file(&writer)).unwrap();

    let sample = file.group("entry/sample").unwrap();
    assert_eq!(str_attr(&sample, "NX_class"), "NXsample");
    assert!(sample.dataset("name").is_ok());

    let contact = file.group("entry/contact").unwrap();
    assert_eq!(str_attr(&contact, "NX_class"), "NXuser");
    assert!(contact.dataset("name").is_ok());

    let mono = file.group("entry/instrument/monochromator").unwrap();
    assert_eq!(str_attr(&mono, "NX_class"), "NXmonochromator");
    assert_eq!(
        mono.dataset("energy").unwrap().read_raw::<f64>().unwrap(),
        vec![12.4, 12.5]
    );

    // slowly-varying signals get before/after snapshots
    let energy = file
        .group("entry/instrument/bluesky/streams/baseline/monochromator_energy")
        .unwrap();
    let start: f64 = energy.dataset("value_start").unwrap().read_scalar().unwrap();
    let end: f64 = energy.dataset("value_end").unwrap().read_scalar().unwrap();
    assert_eq!(start, 12.4);
    assert_eq!(end, 12.5);

    let source = file.group("entry/instrument/source").unwrap();
    assert_eq!(str_attr(&source, "NX_class"), "NXsource");
    let energy: f64 = source.dataset("energy").unwrap().read_scalar().unwrap();
    assert_eq!(energy, 6.0);
}

#[test]
fn test_entry_fields_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = NexusWriter::new(dir.path());
    feed_full_run(&mut writer, "run-meta");

    let file = File::open(written_file(&writer)).unwrap();
    let entry = file.group("entry").unwrap();
    assert_eq!(str_attr(&entry, "NX_class"), "NXentry");
    let duration: f64 = entry.dataset("duration").unwrap().read_scalar().unwrap();
    assert_eq!(duration, 10.0);
    let program: VarLenUnicode = entry
        .dataset("program_name")
        .unwrap()
        .read_scalar()
        .unwrap();
    assert_eq!(program.as_str(), "bluesky");
    let title: VarLenUnicode = entry.dataset("title").unwrap().read_scalar().unwrap();
    assert!(title.as_str().starts_with("1  scan("));

    let metadata = file.group("entry/instrument/bluesky/metadata").unwrap();
    let uid: VarLenUnicode = metadata.dataset("uid").unwrap().read_scalar().unwrap();
    assert_eq!(uid.as_str(), "run-meta");
    let scan_id: i64 = metadata.dataset("scan_id").unwrap().read_scalar().unwrap();
    assert_eq!(scan_id, 1);
}

#[test]
fn test_file_name_override_and_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = NexusWriter::new(dir.path());
    writer.set_file_name(Some(PathBuf::from("custom.hdf")));
    feed_full_run(&mut writer, "run-name");
    assert_eq!(
        written_file(&writer).file_name().unwrap(),
        std::ffi::OsStr::new("custom.hdf")
    );

    // the override is consumed; the next run is named by the pattern
    feed_full_run(&mut writer, "run-name-2");
    let name = written_file(&writer)
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    assert!(name.ends_with("-S00001-run-nam.hdf"), "got {name}");
}

fn make_area_detector_file(path: &Path) -> Vec<f64> {
    let data: Vec<f64> = (0..12).map(f64::from).collect();
    let file = File::create(path).unwrap();
    let entry = file.create_group("entry").unwrap();
    let group = entry.create_group("data").unwrap();
    let ds = group
        .new_dataset::<f64>()
        .shape([2, 2, 3])
        .create("data")
        .unwrap();
    ds.write_raw(&data).unwrap();
    data
}

#[test]
fn test_external_data_copied_with_provenance() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("ad.h5");
    let expected = make_area_detector_file(&source_path);

    let mut writer = NexusWriter::new(dir.path());
    writer.receiver("start", &start_doc("run-ext", 1)).unwrap();
    writer
        .receiver(
            "descriptor",
            &json!({
                "uid": "desc-ext",
                "time": T0,
                "run_start": "run-ext",
                "name": "primary",
                "data_keys": {
                    "m1": {"dtype": "number", "source": "SIM:m1"},
                    "d1": {"dtype": "number", "source": "SIM:d1"},
                    "image": {
                        "dtype": "array",
                        "source": "SIM:image",
                        "external": "FILESTORE:",
                    },
                },
            }),
        )
        .unwrap();
    writer
        .receiver(
            "resource",
            &json!({
                "uid": "res-1",
                "spec": "AD_HDF5",
                "root": dir.path(),
                "resource_path": "ad.h5",
                "resource_kwargs": {},
                "run_start": "run-ext",
            }),
        )
        .unwrap();
    writer
        .receiver(
            "datum",
            &json!({"datum_id": "res-1/0", "resource": "res-1", "datum_kwargs": {}}),
        )
        .unwrap();
    writer
        .receiver(
            "event",
            &event_doc("desc-ext", 1, json!({"m1": 0.0, "d1": 5.0, "image": "res-1/0"})),
        )
        .unwrap();
    writer
        .receiver("stop", &stop_doc("stop-ext", "run-ext"))
        .unwrap();
    assert!(writer.take_deferred_errors().is_empty());

    let file = File::open(written_file(&writer)).unwrap();
    let value = file
        .dataset("entry/instrument/bluesky/streams/primary/image/value")
        .unwrap();
    assert_eq!(value.shape(), vec![2, 2, 3]);
    assert_eq!(value.read_raw::<f64>().unwrap(), expected);
    assert_eq!(str_attr(&value, "source_address"), "/entry/data/data");
    assert_eq!(str_attr(&value, "resource_id"), "res-1");
    assert!(str_attr(&value, "source_file").ends_with("ad.h5"));
}

#[test]
fn test_unsupported_resource_degrades_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = NexusWriter::new(dir.path());
    writer.receiver("start", &start_doc("run-bad", 1)).unwrap();
    writer
        .receiver(
            "descriptor",
            &json!({
                "uid": "desc-bad",
                "time": T0,
                "run_start": "run-bad",
                "name": "primary",
                "data_keys": {
                    "m1": {"dtype": "number", "source": "SIM:m1"},
                    "d1": {"dtype": "number", "source": "SIM:d1"},
                    "image": {
                        "dtype": "array",
                        "source": "SIM:image",
                        "external": "FILESTORE:",
                    },
                },
            }),
        )
        .unwrap();
    writer
        .receiver(
            "resource",
            &json!({
                "uid": "res-bad",
                "spec": "unknown_format",
                "root": "/",
                "resource_path": "nowhere.bin",
                "resource_kwargs": {},
                "run_start": "run-bad",
            }),
        )
        .unwrap();
    writer
        .receiver(
            "datum",
            &json!({"datum_id": "res-bad/0", "resource": "res-bad", "datum_kwargs": {}}),
        )
        .unwrap();
    writer
        .receiver(
            "event",
            &event_doc("desc-bad", 1, json!({"m1": 0.0, "d1": 5.0, "image": "res-bad/0"})),
        )
        .unwrap();
    // the stop-document write must still succeed
    writer
        .receiver("stop", &stop_doc("stop-bad", "run-bad"))
        .unwrap();

    let errors = writer.take_deferred_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], WriterError::UnsupportedResource(spec) if spec == "unknown_format"));

    // the rest of the file is intact: good keys written, bad key absent
    let file = File::open(written_file(&writer)).unwrap();
    assert!(file
        .dataset("entry/instrument/bluesky/streams/primary/d1/value")
        .is_ok());
    assert!(file
        .group("entry/instrument/bluesky/streams/primary/image")
        .is_err());
    assert!(file.group("entry/data").is_ok());
}

#[test]
fn test_comments_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = NexusWriter::new(dir.path());
    writer.receiver("start", &start_doc("run-com", 1)).unwrap();
    writer
        .receiver("descriptor", &primary_descriptor("desc-com", "run-com"))
        .unwrap();
    writer.add_comment("first point looked noisy", None);
    writer
        .receiver("event", &event_doc("desc-com", 1, json!({"m1": 0.0, "d1": 5.0})))
        .unwrap();
    writer
        .receiver("stop", &stop_doc("stop-com", "run-com"))
        .unwrap();

    let file = File::open(written_file(&writer)).unwrap();
    let comments = file.group("entry/instrument/bluesky/comments").unwrap();
    let event_lines = comments
        .dataset("event")
        .unwrap()
        .read_raw::<VarLenUnicode>()
        .unwrap();
    assert_eq!(event_lines.len(), 1);
    assert!(event_lines[0].as_str().ends_with("first point looked noisy"));
}
