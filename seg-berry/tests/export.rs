//! 端到端导出测试. 输入为临时目录中合成的 nii 成对文件.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array3;
use nifti::writer::WriterOptions;
use seg_berry::adapter::nnunet::{IMAGES_TR, IMAGES_TS, LABELS_TR, MANIFEST};
use seg_berry::dataset::{PairLayout, Split, SplitRatios};
use seg_berry::error::{ConfigError, JobError};
use seg_berry::{run_export, AdapterKind, ExportError, ExportOptions};
use tempfile::TempDir;

const W: usize = 8;
const H: usize = 6;
const Z: usize = 3;

/// 写出 `<key>_img.nii` 与 `<key>_seg.nii`.
///
/// 标签第 0 帧为空, 第 1, 2 帧有一个矩形前景. `empty` 为真时标签全空.
fn write_pair(dir: &Path, key: &str, empty: bool) {
    let scan = Array3::<f32>::from_shape_fn((W, H, Z), |(x, y, z)| {
        (x + y * W + z * W * H) as f32 * 10.0 - 500.0
    });
    let label = Array3::<u8>::from_shape_fn((W, H, Z), |(x, y, z)| {
        let inside = (2..6).contains(&x) && (1..5).contains(&y) && z > 0;
        u8::from(inside && !empty)
    });
    WriterOptions::new(dir.join(format!("{key}_img.nii")))
        .write_nifti(&scan)
        .unwrap();
    WriterOptions::new(dir.join(format!("{key}_seg.nii")))
        .write_nifti(&label)
        .unwrap();
}

fn input_with(keys: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for k in keys {
        write_pair(dir.path(), k, false);
    }
    dir
}

fn options(input: &Path, output: &Path, adapter: AdapterKind) -> ExportOptions {
    let mut options = ExportOptions {
        input_dir: input.to_owned(),
        output_dir: output.to_owned(),
        adapter,
        workers: 2,
        layout: PairLayout::new(["_img.nii"], ["_seg.nii"]),
        ..ExportOptions::default()
    };
    // 矩形只有 4 个顶点.
    options.kwargs.insert("min_polygons", 3);
    options
}

/// 输出目录下全部文件的相对路径与内容.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_owned();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn stems(dir: &Path, ext: &str) -> Vec<String> {
    let mut ans: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| {
            let name = e.unwrap().file_name().into_string().unwrap();
            name.strip_suffix(ext).map(str::to_string)
        })
        .collect();
    ans.sort();
    ans
}

#[test]
fn test_partial_failure_is_isolated() {
    let input = input_with(&["p1", "p2", "p4", "p5"]);
    write_pair(input.path(), "p3", false);
    fs::write(input.path().join("p3_seg.nii"), b"definitely not nifti").unwrap();
    let output = tempfile::tempdir().unwrap();

    let report = run_export(&options(input.path(), output.path(), AdapterKind::Huggingface))
        .unwrap();
    assert_eq!(report.assignment.len(), 5);
    let ok: Vec<_> = report.outcomes.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(ok, vec!["p1", "p2", "p4", "p5"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "p3");
    assert!(matches!(report.failures[0].1, JobError::Decode(_)));
    assert!(!report.is_clean());

    // 每个成功的成对文件: 丢弃 1 个空帧, 写出 2 帧, 每帧 jpg + png.
    for o in &report.outcomes {
        assert_eq!((o.frames, o.dropped, o.files), (2, 1, 4));
    }
    let summary = report.summary();
    assert_eq!((summary.succeeded, summary.failed, summary.frames), (4, 1, 8));
}

#[test]
fn test_export_is_idempotent_across_worker_counts() {
    let input = input_with(&["a", "b", "c", "d", "e", "f"]);
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let mut opts = options(input.path(), first.path(), AdapterKind::Huggingface);
    opts.workers = 1;
    run_export(&opts).unwrap();
    opts.output_dir = second.path().to_owned();
    opts.workers = 4;
    run_export(&opts).unwrap();

    let (a, b) = (snapshot(first.path()), snapshot(second.path()));
    assert_eq!(a.len(), 6 * 2 * 2);
    assert_eq!(a, b);

    // 再写一次同一目录, 结果不变.
    opts.workers = 3;
    run_export(&opts).unwrap();
    assert_eq!(snapshot(second.path()), a);
}

#[test]
fn test_formats_agree_on_membership() {
    let input = input_with(&["k1", "k2", "k3", "k4", "k5", "k6", "k7"]);
    let (poly, hf, nn) = (
        tempfile::tempdir().unwrap(),
        tempfile::tempdir().unwrap(),
        tempfile::tempdir().unwrap(),
    );
    let run = |dir: &TempDir, kind| {
        let mut opts = options(input.path(), dir.path(), kind);
        opts.ratios = SplitRatios::new(0.5, 0.25, 0.25).unwrap();
        run_export(&opts).unwrap()
    };
    let poly_report = run(&poly, AdapterKind::Polygon);
    let hf_report = run(&hf, AdapterKind::Huggingface);
    let nn_report = run(&nn, AdapterKind::Nnunet);
    assert_eq!(poly_report.assignment, hf_report.assignment);
    assert_eq!(hf_report.assignment, nn_report.assignment);

    let assignment = &hf_report.assignment;
    let frames_of = |split| -> Vec<String> {
        assignment
            .keys_in(split)
            .into_iter()
            .flat_map(|k| [format!("{k}_0"), format!("{k}_1")])
            .collect()
    };
    for split in Split::ALL {
        let images = format!("images/{split}");
        let labels = format!("labels/{split}");
        assert_eq!(stems(&poly.path().join(&images), ".jpg"), frames_of(split));
        assert_eq!(stems(&hf.path().join(&images), ".jpg"), frames_of(split));
        assert_eq!(stems(&hf.path().join(&labels), ".png"), frames_of(split));
        assert_eq!(stems(&poly.path().join(&labels), ".txt"), frames_of(split));
    }

    // NNUNet 把 val 并入训练目录.
    let mut training: Vec<String> = assignment
        .keys_in(Split::Train)
        .into_iter()
        .chain(assignment.keys_in(Split::Val))
        .map(str::to_string)
        .collect();
    training.sort();
    let test: Vec<String> = assignment
        .keys_in(Split::Test)
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(stems(&nn.path().join(IMAGES_TR), ".nii.gz"), training);
    assert_eq!(stems(&nn.path().join(IMAGES_TS), ".nii.gz"), test);
    assert_eq!(stems(&nn.path().join(LABELS_TR), ".nii.gz").len(), 7);

    let manifest_path = nn_report.manifest.clone().unwrap();
    assert_eq!(manifest_path, nn.path().join(MANIFEST));
    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(manifest_path).unwrap()).unwrap();
    assert_eq!(manifest["numTraining"], training.len());
    assert_eq!(manifest["numTest"], test.len());
    assert_eq!(
        manifest["training"][0]["image"],
        format!("./{IMAGES_TR}/{}.nii.gz", training[0])
    );
    if let Some(t) = test.first() {
        assert_eq!(
            manifest["test"][0]["label"],
            format!("./{LABELS_TR}/{t}.nii.gz")
        );
    }
    assert!(poly_report.manifest.is_none() && hf_report.manifest.is_none());
}

#[test]
fn test_zero_frame_pair_succeeds_with_no_files() {
    let input = input_with(&["full"]);
    write_pair(input.path(), "hollow", true);
    let output = tempfile::tempdir().unwrap();

    let report =
        run_export(&options(input.path(), output.path(), AdapterKind::Huggingface)).unwrap();
    assert!(report.is_clean());
    let hollow = report.outcomes.iter().find(|o| o.key == "hollow").unwrap();
    assert_eq!((hollow.frames, hollow.dropped, hollow.files), (0, Z, 0));
    let names: Vec<_> = snapshot(output.path())
        .into_keys()
        .filter(|p| p.to_string_lossy().contains("hollow"))
        .collect();
    assert!(names.is_empty());
}

#[test]
fn test_incomplete_pairs_are_reported() {
    let input = input_with(&["x", "y"]);
    fs::remove_file(input.path().join("y_seg.nii")).unwrap();
    let output = tempfile::tempdir().unwrap();

    let report =
        run_export(&options(input.path(), output.path(), AdapterKind::Huggingface)).unwrap();
    assert_eq!(report.assignment.len(), 1);
    assert_eq!(report.incomplete.len(), 1);
    assert_eq!(report.incomplete[0].key, "y");
    assert_eq!(report.summary().incomplete, 1);
}

#[test]
fn test_bad_ratios_fail_before_any_output() {
    let input = input_with(&["a"]);
    let output = tempfile::tempdir().unwrap();
    let target = output.path().join("never");

    let mut opts = options(input.path(), &target, AdapterKind::Nnunet);
    opts.ratios = SplitRatios {
        train: 0.3,
        val: 0.3,
        test: 0.3,
    };
    assert!(matches!(
        run_export(&opts),
        Err(ExportError::Config(ConfigError::RatioSum { .. }))
    ));
    assert!(!target.exists());
}

#[test]
fn test_golden_split() {
    let input = input_with(&["a", "b", "c", "d"]);
    let output = tempfile::tempdir().unwrap();
    let mut opts = options(input.path(), output.path(), AdapterKind::Huggingface);
    opts.ratios = SplitRatios::new(0.5, 0.5, 0.0).unwrap();
    opts.seed = 42;

    let report = run_export(&opts).unwrap();
    assert_eq!(report.assignment.keys_in(Split::Train), vec!["a", "c"]);
    assert_eq!(report.assignment.keys_in(Split::Val), vec!["b", "d"]);
    assert!(report.assignment.keys_in(Split::Test).is_empty());
    assert_eq!(stems(&output.path().join("images/val"), ".jpg"), vec![
        "b_0", "b_1", "d_0", "d_1"
    ]);
}

#[cfg(unix)]
#[test]
fn test_symlinked_input_exports() {
    use std::os::unix::fs::symlink;

    let store = input_with(&["a", "b"]);
    let staged = tempfile::tempdir().unwrap();
    for k in ["a", "b"] {
        for side in ["img", "seg"] {
            let name = format!("{k}_{side}.nii");
            symlink(store.path().join(&name), staged.path().join(&name)).unwrap();
        }
    }
    let output = tempfile::tempdir().unwrap();

    let report =
        run_export(&options(staged.path(), output.path(), AdapterKind::Huggingface)).unwrap();
    assert_eq!(report.assignment.len(), 2);
    assert!(report.is_clean());
    assert_eq!(report.summary().files, 2 * 2 * 2);
}
