use serde_json::json;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use litter_bench::config::{TACO_CLASSES, TRASHNET_CLASSES};
use litter_bench::manifest::read_fold_assignment;
use litter_bench::model::dataset_name;
use litter_bench::pipeline::{run, run_baseline_evaluation, run_preprocessing};
use litter_bench::{
    BaselineModel, Dataset, DatasetManifest, DatasetPreprocessor, DetectionBackend, DetectionModel,
    DetectionResults, Evaluator, MetricsRecord, ModelSize, PipelineConfig, PipelineError, Split,
    ValidationReport,
};

const PER_CLASS: usize = 5;
const TACO_IMAGES: usize = 24;

fn write_image(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"\xFF\xD8\xFF fake jpeg").unwrap();
}

fn build_trashnet(root: &Path) {
    for class in TRASHNET_CLASSES {
        for i in 0..PER_CLASS {
            write_image(
                &root
                    .join("data/data_trashnet")
                    .join(class)
                    .join(format!("{}{}.jpg", class, i + 1)),
            );
        }
    }
    // Not an image, must be ignored.
    fs::write(root.join("data/data_trashnet/glass/notes.txt"), "x").unwrap();
}

fn build_taco(root: &Path, category_names: &[&str]) {
    let taco_dir = root.join("data/data_taco");
    let categories: Vec<_> = category_names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({"id": i + 1, "name": name, "supercategory": "litter"}))
        .collect();

    let mut images = Vec::new();
    let mut annotations = Vec::new();
    let mut next_id = 1;
    for i in 0..TACO_IMAGES {
        let file_name = format!("batch_{}/{:06}.jpg", i % 2 + 1, i);
        write_image(&taco_dir.join(&file_name));
        images.push(json!({"id": i, "file_name": file_name, "width": 640, "height": 480}));
        for offset in [0, 5] {
            annotations.push(json!({
                "id": next_id,
                "image_id": i,
                "category_id": (i + offset) % category_names.len() + 1,
                "bbox": [10.0 * i as f64, 20.0, 100.0, 50.0],
            }));
            next_id += 1;
        }
    }
    // Zero-width box and an image missing on disk.
    annotations.push(json!({"id": next_id, "image_id": 0, "category_id": 1, "bbox": [5.0, 5.0, 0.0, 10.0]}));
    images.push(json!({"id": 999, "file_name": "batch_9/missing.jpg", "width": 640, "height": 480}));

    let coco = json!({"categories": categories, "images": images, "annotations": annotations});
    fs::write(
        taco_dir.join("annotations.json"),
        serde_json::to_string_pretty(&coco).unwrap(),
    )
    .unwrap();
}

fn build_installation(root: &Path) {
    build_trashnet(root);
    build_taco(root, TACO_CLASSES);
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn file_stems(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            e.unwrap()
                .path()
                .file_stem()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

#[test]
fn test_preprocessing_end_to_end() {
    let temp_dir = tempfile::tempdir().unwrap();
    build_installation(temp_dir.path());
    let config = PipelineConfig::new(temp_dir.path());

    run_preprocessing(&config).unwrap();
    assert!(config.is_preprocessed());

    for dataset in Dataset::ALL {
        let manifest = DatasetManifest::read(&config.manifest_path(dataset)).unwrap();
        assert_eq!(manifest.nc, 6);
        assert_eq!(manifest.class_names(), TRASHNET_CLASSES);
        assert_eq!(manifest.train, "images/train");
        assert_eq!(manifest.val, "images/val");
        assert_eq!(manifest.test, "images/test");
        assert_eq!(manifest.imgsz, 640);
        assert!(manifest.path.is_absolute());
    }

    let trashnet = config.dataset_output_dir(Dataset::TrashNet);
    // 30 images: ceil(4.5) test, ceil(4.5) val, the rest train.
    assert_eq!(file_stems(&trashnet.join("images/test")).len(), 5);
    assert_eq!(file_stems(&trashnet.join("images/val")).len(), 5);
    assert_eq!(file_stems(&trashnet.join("labels/train")).len(), 20);
    let label = fs::read_to_string(trashnet.join("labels/train").join(format!(
        "{}.txt",
        file_stems(&trashnet.join("labels/train")).iter().next().unwrap()
    )))
    .unwrap();
    assert!(label.ends_with(" 0.500000 0.500000 1.000000 1.000000\n"));

    let taco = config.dataset_output_dir(Dataset::Taco);
    let taco_stems: BTreeSet<String> = Split::ALL
        .iter()
        .flat_map(|split| file_stems(&taco.join("labels").join(split.as_str())))
        .collect();
    assert_eq!(taco_stems.len(), TACO_IMAGES);
    assert!(taco_stems.contains("batch_1_000000"));
    for split in Split::ALL {
        let dir = taco.join("labels").join(split.as_str());
        for stem in file_stems(&dir) {
            for line in read_lines(&dir.join(format!("{}.txt", stem))) {
                let class_id: usize = line.split(' ').next().unwrap().parse().unwrap();
                assert!(class_id < 6, "{}", line);
            }
        }
    }

    let metadata: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(taco.join("metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["num_classes"], 6);
    assert_eq!(metadata["seed"], 42);
    assert_eq!(metadata["cv_folds"], 3);
    assert_eq!(metadata["processing"]["skipped_missing_image"], 1);
    assert_eq!(metadata["processing"]["dropped_degenerate_boxes"], 1);
}

#[test]
fn test_fold_manifests_partition_training_pool() {
    let temp_dir = tempfile::tempdir().unwrap();
    build_installation(temp_dir.path());
    let config = PipelineConfig::new(temp_dir.path());
    run_preprocessing(&config).unwrap();

    for dataset in Dataset::ALL {
        let root = config.dataset_output_dir(dataset);
        let pool = file_stems(&root.join("labels/train"));
        let assignment = read_fold_assignment(&root).unwrap();
        assert_eq!(assignment.k, 3);
        assert_eq!(assignment.seed, 42);

        let mut held_out_union = BTreeSet::new();
        let mut sizes = Vec::new();
        for index in 0..3 {
            let fold_dir = root.join(format!("folds/fold_{}", index));
            let manifest = DatasetManifest::read(&fold_dir.join("dataset.yaml")).unwrap();
            assert_eq!(manifest.nc, 6);
            assert_eq!(manifest.train, format!("folds/fold_{}/train.txt", index));
            assert_eq!(manifest.val, format!("folds/fold_{}/val.txt", index));
            assert_eq!(manifest.test, "images/test");

            let stems_of = |file: &str| -> BTreeSet<String> {
                read_lines(&fold_dir.join(file))
                    .iter()
                    .map(|line| {
                        let path = PathBuf::from(line);
                        assert!(path.is_absolute());
                        assert!(path.exists(), "{}", line);
                        path.file_stem().unwrap().to_string_lossy().into_owned()
                    })
                    .collect()
            };
            let train = stems_of("train.txt");
            let val = stems_of("val.txt");

            assert!(train.is_disjoint(&val));
            let whole: BTreeSet<String> = train.union(&val).cloned().collect();
            assert_eq!(whole, pool);

            assert!(held_out_union.is_disjoint(&val), "held-out folds overlap");
            sizes.push(val.len());
            held_out_union.extend(val);
        }
        assert_eq!(held_out_union, pool);
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
    }
}

#[test]
fn test_preprocessing_is_idempotent() {
    let temp_dir = tempfile::tempdir().unwrap();
    build_installation(temp_dir.path());
    let config = PipelineConfig::new(temp_dir.path());

    let snapshot = |config: &PipelineConfig| -> Vec<(PathBuf, Vec<u8>)> {
        let mut files = Vec::new();
        for dataset in Dataset::ALL {
            let root = config.dataset_output_dir(dataset);
            let mut paths = vec![
                root.join("dataset.yaml"),
                root.join("metadata.json"),
                root.join("folds/folds.json"),
            ];
            for index in 0..3 {
                for name in ["dataset.yaml", "train.txt", "val.txt"] {
                    paths.push(root.join(format!("folds/fold_{}/{}", index, name)));
                }
            }
            for split in Split::ALL {
                let dir = root.join("labels").join(split.as_str());
                for stem in file_stems(&dir) {
                    paths.push(dir.join(format!("{}.txt", stem)));
                }
            }
            for path in paths {
                let bytes = fs::read(&path).unwrap();
                files.push((path, bytes));
            }
        }
        files
    };

    run_preprocessing(&config).unwrap();
    let first = snapshot(&config);
    run_preprocessing(&config).unwrap();
    let second = snapshot(&config);

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_unmapped_taco_label_fails_loudly() {
    let temp_dir = tempfile::tempdir().unwrap();
    build_trashnet(temp_dir.path());
    let mut names: Vec<&str> = TACO_CLASSES.to_vec();
    names.push("Tire");
    build_taco(temp_dir.path(), &names);

    let config = PipelineConfig::new(temp_dir.path());
    match run_preprocessing(&config) {
        Err(PipelineError::Config(msg)) => assert!(msg.contains("Tire"), "{}", msg),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_bad_ratios_rejected_before_writing() {
    let temp_dir = tempfile::tempdir().unwrap();
    build_installation(temp_dir.path());
    let mut config = PipelineConfig::new(temp_dir.path());
    config.train_ratio = 0.8;

    assert!(matches!(
        DatasetPreprocessor::new(&config),
        Err(PipelineError::Config(_))
    ));
    assert!(run_preprocessing(&config).is_err());
    assert!(!config.output_dir().exists());

    config.train_ratio = 0.7;
    config.cv_folds = 1;
    assert!(run_preprocessing(&config).is_err());
    assert!(!config.output_dir().exists());
}

#[test]
fn test_unknown_trashnet_class_directory_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    build_installation(temp_dir.path());
    write_image(&temp_dir.path().join("data/data_trashnet/rubber/rubber1.jpg"));

    let config = PipelineConfig::new(temp_dir.path());
    let mut preprocessor = DatasetPreprocessor::new(&config).unwrap();
    assert!(matches!(
        preprocessor.process_trashnet(),
        Err(PipelineError::Config(_))
    ));
}

#[test]
fn test_hidden_trashnet_directories_are_skipped() {
    let temp_dir = tempfile::tempdir().unwrap();
    build_installation(temp_dir.path());
    write_image(
        &temp_dir
            .path()
            .join("data/data_trashnet/.ipynb_checkpoints/glass1-checkpoint.jpg"),
    );

    let config = PipelineConfig::new(temp_dir.path());
    let mut preprocessor = DatasetPreprocessor::new(&config).unwrap();
    let prepared = preprocessor.process_trashnet().unwrap();
    assert_eq!(prepared.split_data.len(), 6 * PER_CLASS);
    assert!(prepared
        .split_data
        .train
        .iter()
        .all(|sample| !sample.stem.contains("checkpoint")));
}

#[test]
fn test_steps_require_processed_dataset() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new(temp_dir.path());
    let mut preprocessor = DatasetPreprocessor::new(&config).unwrap();
    assert!(preprocessor.create_cross_validation_folds(Dataset::Taco).is_err());
    assert!(preprocessor.log_dataset_stats(Dataset::Taco).is_err());
    assert!(preprocessor.save_dataset_metadata(Dataset::Taco).is_err());
}

/// Backend standing in for Ultralytics; fails prediction for the named dataset.
struct FakeBackend {
    fail_load: bool,
    fail_dataset: Option<&'static str>,
}

struct FakeModel {
    name: String,
    fail_dataset: Option<&'static str>,
}

impl DetectionBackend for FakeBackend {
    fn load(&self, size: ModelSize) -> litter_bench::Result<Box<dyn DetectionModel>> {
        if self.fail_load {
            return Err(PipelineError::ModelLoad {
                model: size.weights_name(),
                msg: "weights unavailable".to_string(),
            });
        }
        Ok(Box::new(FakeModel {
            name: size.weights_name(),
            fail_dataset: self.fail_dataset,
        }))
    }
}

impl DetectionModel for FakeModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, manifest: &Path, split: Split) -> litter_bench::Result<Box<dyn DetectionResults>> {
        let dataset = dataset_name(manifest);
        assert_eq!(split, Split::Test);
        if !manifest.exists() || self.fail_dataset == Some(dataset.as_str()) {
            return Err(PipelineError::Prediction {
                dataset,
                msg: "inference crashed".to_string(),
            });
        }
        Ok(Box::new(ValidationReport {
            map50: Some(0.42),
            map: Some(0.21),
            mp: Some(0.6),
            mr: Some(0.35),
            ..Default::default()
        }))
    }
}

#[test]
fn test_baseline_model_keeps_requested_size() {
    let backend = FakeBackend {
        fail_load: false,
        fail_dataset: None,
    };
    let model = BaselineModel::load(&backend, ModelSize::M).unwrap();
    assert_eq!(model.size(), ModelSize::M);
}

#[test]
fn test_run_tolerates_per_dataset_failure() {
    let temp_dir = tempfile::tempdir().unwrap();
    build_installation(temp_dir.path());
    let config = PipelineConfig::new(temp_dir.path());
    let backend = FakeBackend {
        fail_load: false,
        fail_dataset: Some("taco"),
    };

    let records = run(&config, &backend).unwrap();
    assert_eq!(records.len(), 2);

    let trashnet = &records[&Dataset::TrashNet];
    assert_eq!(trashnet.get("mAP50"), Some(0.42));
    assert_eq!(trashnet.get("mAP50-95"), Some(0.21));
    match &records[&Dataset::Taco] {
        MetricsRecord::Error { error } => assert!(error.contains("inference crashed")),
        other => panic!("expected error record, got {:?}", other),
    }

    let evaluator = Evaluator::baseline(&config);
    assert_eq!(evaluator.summary("trashnet").as_ref(), Some(trashnet));
    assert!(evaluator.summary("taco").unwrap().is_error());
    for dir in config.results_dirs() {
        assert!(dir.is_dir());
    }
}

#[test]
fn test_model_load_failure_is_recorded_for_each_dataset() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new(temp_dir.path());
    let backend = FakeBackend {
        fail_load: true,
        fail_dataset: None,
    };

    let records = run_baseline_evaluation(&config, &backend).unwrap();
    for dataset in Dataset::ALL {
        match &records[&dataset] {
            MetricsRecord::Error { error } => {
                assert!(error.contains("failed to load model yolov8n.pt"), "{}", error)
            }
            other => panic!("expected error record, got {:?}", other),
        }
    }
}

#[test]
fn test_run_skips_preprocessing_when_sentinel_exists() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new(temp_dir.path());
    // No raw data at all: preprocessing would fail if it ran.
    let sentinel = config.manifest_path(Dataset::TrashNet);
    fs::create_dir_all(sentinel.parent().unwrap()).unwrap();
    fs::write(&sentinel, "names: {}\n").unwrap();

    let backend = FakeBackend {
        fail_load: false,
        fail_dataset: None,
    };
    let records = run(&config, &backend).unwrap();
    assert!(!records[&Dataset::TrashNet].is_error());
    // Taco was never prepared, so its manifest is missing.
    assert!(records[&Dataset::Taco].is_error());
}

#[test]
fn test_run_aborts_when_preprocessing_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new(temp_dir.path());
    let backend = FakeBackend {
        fail_load: false,
        fail_dataset: None,
    };

    assert!(run(&config, &backend).is_err());
    assert!(!config.baseline_results_dir().exists());
}
