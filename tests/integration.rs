use std::{path::Path, time::Instant};

use pagescribe::{BatchRunner, PageScribeBuilder};

const MODELS: &[&str] = &[
    "tests/data/models/yolov8_text.onnx",
    "tests/data/models/trocr/encoder_model.onnx",
    "tests/data/models/trocr/decoder_model.onnx",
    "tests/data/models/trocr/tokenizer.json",
];

// Needs exported models under tests/data/models, which are not checked in.
#[test]
fn transcribes_sample_pages() {
    let _ = env_logger::builder().is_test(true).try_init();
    if let Some(missing) = MODELS.iter().find(|it| !Path::new(it).exists()) {
        eprintln!("skipping test: {missing} not found");
        return;
    }

    let scribe = PageScribeBuilder::new()
        .detector_model(MODELS[0])
        .recognizer_model(MODELS[1], MODELS[2], MODELS[3])
        .build()
        .expect("Failed to build engine");

    let output = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let report = BatchRunner::new(&scribe, "tests/data/pages", output.path())
        .run()
        .expect("Failed batch");
    log::debug!("{:?}", start.elapsed());
    assert!(report.processed > 0);
    assert_eq!(report.failed, 0);

    let rerun = BatchRunner::new(&scribe, "tests/data/pages", output.path())
        .run()
        .expect("Failed batch");
    assert_eq!(rerun.skipped, report.processed + report.unreadable);
}
