use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use vidvary_core::engine::FilterChain;
use vidvary_core::{
    BatchError, BatchOrchestrator, EngineError, EngineResult, FilterStep, MediaEngine, Preset,
    ServiceError, Stage, UploadPolicy, VariantPipeline, VariationService, ARCHIVE_NAME,
    GENERIC_FAILURE,
};

const SUFFIX_LEN: usize = 10;

/// Deterministic engine: appends a description of every applied filter to
/// the input bytes, and fails on one chosen filter.
#[derive(Default)]
struct ScriptedEngine {
    fail_on: Option<&'static str>,
    calls: Mutex<Vec<Vec<FilterStep>>>,
}

impl ScriptedEngine {
    fn failing_on(label: &'static str) -> Self {
        Self {
            fail_on: Some(label),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Vec<FilterStep>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    async fn apply_filters(
        &self,
        input: &Path,
        output: &Path,
        filters: &[FilterStep],
    ) -> EngineResult<()> {
        self.calls.lock().unwrap().push(filters.to_vec());
        FilterChain::build(filters)?;
        if let Some(label) = self.fail_on {
            if filters.iter().any(|step| step.label() == label) {
                return Err(EngineError::Transform {
                    status: Some(1),
                    stderr: format!("{label}: filter rejected"),
                });
            }
        }
        let mut content = tokio::fs::read(input).await.map_err(|source| EngineError::Io {
            source,
            path: input.to_path_buf(),
        })?;
        let described: Vec<String> = filters.iter().map(ToString::to_string).collect();
        content.extend_from_slice(format!("|{}", described.join(",")).as_bytes());
        tokio::fs::write(output, content)
            .await
            .map_err(|source| EngineError::Io {
                source,
                path: output.to_path_buf(),
            })
    }
}

fn source_video(dir: &Path) -> PathBuf {
    let path = dir.join("input_video");
    std::fs::write(&path, b"frames").unwrap();
    path
}

fn pipeline(engine: Arc<ScriptedEngine>) -> VariantPipeline {
    VariantPipeline::new(engine).with_suffix_len(SUFFIX_LEN)
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn valid_presets_produce_perturbed_outputs() {
    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let engine = Arc::new(ScriptedEngine::default());
    let pipeline = pipeline(engine.clone());

    let strip_only = dir.path().join("strip_only.mp4");
    engine
        .apply_filters(&input, &strip_only, &[FilterStep::StripMetadata])
        .await
        .unwrap();
    let strip_only = std::fs::read(&strip_only).unwrap();

    for preset in Preset::ALL {
        let output = dir.path().join(preset.output_file_name());
        let variant = pipeline
            .produce_variant(&input, &output, Some(preset))
            .await
            .unwrap();

        let content = std::fs::read(&output).unwrap();
        assert!(!content.is_empty());
        assert_ne!(content, strip_only);
        assert_eq!(variant.size_bytes, content.len() as u64);
        assert_eq!(variant.sha256.len(), 64);
        assert_eq!(variant.preset, Some(preset));
        assert_eq!(variant.file_name(), Some(preset.output_file_name()));
    }

    let expected = b"frames|strip-metadata|crop(100%, 90%),saturation(1.1)|saturation(1.1)";
    let first = std::fs::read(dir.path().join("output_video_1.mp4")).unwrap();
    assert_eq!(&first[..expected.len()], expected);
    assert_eq!(first.len(), expected.len() + SUFFIX_LEN);
}

#[tokio::test]
async fn report_checksum_covers_published_bytes() {
    use sha2::{Digest, Sha256};

    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let output = dir.path().join(Preset::TimeShift.output_file_name());

    let variant = pipeline(Arc::new(ScriptedEngine::default()))
        .produce_variant(&input, &output, Some(Preset::TimeShift))
        .await
        .unwrap();

    let published = std::fs::read(&output).unwrap();
    assert_eq!(variant.sha256, hex::encode(Sha256::digest(&published)));
    assert_eq!(variant.size_bytes, published.len() as u64);
    assert_eq!(entries(dir.path()), ["input_video", "output_video_3.mp4"]);
}

#[tokio::test]
async fn stages_run_in_fixed_order() {
    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let engine = Arc::new(ScriptedEngine::default());
    pipeline(engine.clone())
        .produce_variant(&input, &dir.path().join("out.mp4"), Some(Preset::ScaleBrightness))
        .await
        .unwrap();

    assert_eq!(
        engine.calls(),
        vec![
            vec![FilterStep::StripMetadata],
            vec![
                FilterStep::Scale {
                    width_factor: 0.95,
                    height_factor: 0.95
                },
                FilterStep::Brightness { delta: 0.07 },
            ],
            vec![FilterStep::Saturation { factor: 1.1 }],
        ]
    );
}

#[tokio::test]
async fn unknown_preset_codes_skip_preset_stage() {
    for code in [0u8, 4] {
        let dir = TempDir::new().unwrap();
        let input = source_video(dir.path());
        let engine = Arc::new(ScriptedEngine::default());
        let output = dir.path().join("output_video.mp4");

        let variant = pipeline(engine.clone())
            .produce_variant_code(&input, &output, code)
            .await
            .unwrap();

        assert_eq!(variant.preset, None);
        assert_eq!(
            engine.calls(),
            vec![
                vec![FilterStep::StripMetadata],
                vec![FilterStep::Saturation { factor: 1.1 }],
            ]
        );
        let expected = b"frames|strip-metadata|saturation(1.1)";
        let content = std::fs::read(&output).unwrap();
        assert_eq!(&content[..expected.len()], expected);
        assert_eq!(content.len(), expected.len() + SUFFIX_LEN);
    }
}

#[tokio::test]
async fn failed_stage_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let engine = Arc::new(ScriptedEngine::failing_on("brightness"));
    let output = dir.path().join("output_video_2.mp4");

    let err = pipeline(engine)
        .produce_variant(&input, &output, Some(Preset::ScaleBrightness))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Preset);
    assert_eq!(err.diagnostics(), Some("brightness: filter rejected"));
    assert!(!output.exists());
    assert_eq!(entries(dir.path()), vec!["input_video"]);
}

#[tokio::test]
async fn failed_stage_keeps_previous_output() {
    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let output = dir.path().join("output_video_1.mp4");
    std::fs::write(&output, b"previous run").unwrap();

    let err = pipeline(Arc::new(ScriptedEngine::failing_on("saturation")))
        .produce_variant(&input, &output, None)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::SaturationBoost);
    assert_eq!(std::fs::read(&output).unwrap(), b"previous run");
    assert_eq!(entries(dir.path()), vec!["input_video", "output_video_1.mp4"]);
}

#[tokio::test]
async fn invalid_filter_parameter_fails_the_variant() {
    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let output = dir.path().join("out.mp4");

    let err = pipeline(Arc::new(ScriptedEngine::default()))
        .with_saturation_boost(-2.0)
        .produce_variant(&input, &output, Some(Preset::TimeShift))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::SaturationBoost);
    assert!(!output.exists());
}

#[tokio::test]
async fn repeated_runs_differ_in_trailing_bytes() {
    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let pipeline = pipeline(Arc::new(ScriptedEngine::default()));
    let first = dir.path().join("first.mp4");
    let second = dir.path().join("second.mp4");

    pipeline
        .produce_variant(&input, &first, Some(Preset::TimeShift))
        .await
        .unwrap();
    pipeline
        .produce_variant(&input, &second, Some(Preset::TimeShift))
        .await
        .unwrap();

    let first = std::fs::read(first).unwrap();
    let second = std::fs::read(second).unwrap();
    assert_eq!(first.len(), second.len());
    let body = first.len() - SUFFIX_LEN;
    assert_eq!(first[..body], second[..body]);
    assert_ne!(first[body..], second[body..]);
}

#[tokio::test]
async fn batch_packages_exactly_three_entries() {
    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let out_dir = dir.path().join("out");
    let orchestrator = BatchOrchestrator::new(pipeline(Arc::new(ScriptedEngine::default())));

    let report = orchestrator.run(&input, &out_dir).await.unwrap();

    assert_eq!(report.archive_path, out_dir.join(ARCHIVE_NAME));
    assert_eq!(report.variants.len(), 3);
    let mut archive = zip::ZipArchive::new(File::open(&report.archive_path).unwrap()).unwrap();
    assert_eq!(archive.len(), 3);
    for preset in Preset::ALL {
        let name = preset.output_file_name();
        let on_disk = std::fs::metadata(out_dir.join(&name)).unwrap().len();
        let entry = archive.by_name(&name).unwrap();
        assert_eq!(entry.size(), on_disk, "{name}");
    }
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        ["output_video_1.mp4", "output_video_2.mp4", "output_video_3.mp4"]
    );
}

#[tokio::test]
async fn parallel_batch_keeps_names_apart() {
    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let out_dir = dir.path().join("out");
    let orchestrator =
        BatchOrchestrator::new(pipeline(Arc::new(ScriptedEngine::default()))).with_parallel(true);

    let report = orchestrator.run(&input, &out_dir).await.unwrap();

    assert_eq!(report.variants.len(), 3);
    assert_eq!(
        entries(&out_dir),
        vec![
            "output_video_1.mp4",
            "output_video_2.mp4",
            "output_video_3.mp4",
            ARCHIVE_NAME
        ]
    );
}

#[tokio::test]
async fn one_failing_preset_fails_the_batch() {
    let dir = TempDir::new().unwrap();
    let input = source_video(dir.path());
    let out_dir = dir.path().join("out");
    let pipeline = pipeline(Arc::new(ScriptedEngine::failing_on("brightness")));
    let orchestrator = BatchOrchestrator::new(pipeline.clone());

    let err = orchestrator.run(&input, &out_dir).await.unwrap_err();
    match err {
        BatchError::Incomplete {
            succeeded,
            expected,
            failures,
        } => {
            assert_eq!(succeeded, 2);
            assert_eq!(expected, 3);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].preset, Preset::ScaleBrightness);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(entries(&out_dir).is_empty());

    for preset in [Preset::CropSaturation, Preset::TimeShift] {
        let output = out_dir.join(preset.output_file_name());
        pipeline
            .produce_variant(&input, &output, Some(preset))
            .await
            .unwrap();
        assert!(output.exists());
    }
}

#[tokio::test]
async fn service_returns_archive_and_discards_workspace() {
    let spool = TempDir::new().unwrap();
    let orchestrator = BatchOrchestrator::new(pipeline(Arc::new(ScriptedEngine::default())));
    let service = VariationService::new(orchestrator, UploadPolicy::default())
        .with_workspace_root(Some(spool.path().to_path_buf()));

    let download = service.process_upload("holiday.MOV", b"frames").await.unwrap();

    assert_eq!(download.file_name, "video_variations.zip");
    assert_eq!(download.content_type, "application/zip");
    let archive = zip::ZipArchive::new(std::io::Cursor::new(download.bytes)).unwrap();
    assert_eq!(archive.len(), 3);
    assert!(entries(spool.path()).is_empty());
}

#[tokio::test]
async fn service_rejects_unsupported_upload_before_processing() {
    let spool = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let service = VariationService::new(
        BatchOrchestrator::new(pipeline(engine.clone())),
        UploadPolicy::default(),
    )
    .with_workspace_root(Some(spool.path().to_path_buf()));

    let err = service.process_upload("clip.mkv", b"frames").await.unwrap_err();

    assert!(err.is_client_error());
    assert!(engine.calls().is_empty());
    assert!(entries(spool.path()).is_empty());
}

#[tokio::test]
async fn service_failure_reports_engine_diagnostics() {
    let spool = TempDir::new().unwrap();
    let service = VariationService::new(
        BatchOrchestrator::new(pipeline(Arc::new(ScriptedEngine::failing_on("crop")))),
        UploadPolicy::default(),
    )
    .with_workspace_root(Some(spool.path().to_path_buf()));

    let err = service.process_upload("clip.mp4", b"frames").await.unwrap_err();

    assert!(matches!(err, ServiceError::Batch(BatchError::Incomplete { .. })));
    assert!(!err.is_client_error());
    assert_eq!(
        err.user_messages(),
        vec![
            "An error occurred while processing the video: crop: filter rejected".to_string(),
            GENERIC_FAILURE.to_string(),
        ]
    );
    assert!(entries(spool.path()).is_empty());
}
