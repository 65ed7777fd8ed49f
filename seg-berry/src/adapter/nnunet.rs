//! NNUNet 目录布局与 `dataset.json` 清单.
//!
//! ```text
//! <out>/imagesTr/<key>.nii.gz    训练集 (含验证集) 扫描
//! <out>/imagesTs/<key>.nii.gz    测试集扫描
//! <out>/labelsTr/<key>.nii.gz    所有成对文件的标签
//! <out>/dataset.json
//! ```
//!
//! NNUNet 没有验证集目录, 因此验证集通过 [`SplitFolding::FoldValIntoTrain`] 显式并入训练集.
//! 扫描体数据保存为 8-bit 灰度, 标签体数据保存为 8-bit 类别索引.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::imageops;
use ndarray::Array3;
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use serde_json::json;

use super::{AdapterKind, AdapterKwargs, FrameMode, OutputAdapter, PendingFiles, WriteSummary};
use crate::consts::suffix;
use crate::data::{LabelPalette, VolumeMeta};
use crate::dataset::{ProcessedPair, Split, SplitAssignment, SplitFolding};
use crate::error::{AdapterWriteError, JobError, ManifestError};
use crate::executor::Deadline;

/// 训练集扫描目录.
pub const IMAGES_TR: &str = "imagesTr";
/// 测试集扫描目录.
pub const IMAGES_TS: &str = "imagesTs";
/// 标签目录.
pub const LABELS_TR: &str = "labelsTr";
/// 清单文件名.
pub const MANIFEST: &str = "dataset.json";

/// `dataset.json` 中的描述性字段.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ManifestSpec {
    /// 数据集名.
    pub name: String,
    /// 描述.
    pub description: String,
    /// 参考文献.
    pub reference: String,
    /// 许可.
    pub licence: String,
    /// 版本.
    pub release: String,
    /// 张量维度描述.
    #[cfg_attr(feature = "serde", serde(rename = "tensorImageSize"))]
    pub tensor_image_size: String,
    /// 通道编号 -> 模态.
    pub modality: BTreeMap<String, String>,
    /// 类别索引 -> 名称.
    pub labels: BTreeMap<String, String>,
}

impl Default for ManifestSpec {
    fn default() -> Self {
        Self {
            name: "Dataset".to_string(),
            description: "Dataset for nnU-Net model".to_string(),
            reference: "Put your reference here".to_string(),
            licence: "Dataset license".to_string(),
            release: "1.0".to_string(),
            tensor_image_size: "4D".to_string(),
            modality: BTreeMap::from([("0".to_string(), "CT".to_string())]),
            labels: BTreeMap::from([("0".to_string(), "background".to_string())]),
        }
    }
}

/// 列出 `dir` 下的普通文件名, 升序. 隐藏文件被忽略.
fn sorted_file_names(dir: &Path) -> Result<Vec<String>, ManifestError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort_unstable();
    Ok(names)
}

/// 扫描已导出的 NNUNet 目录, 生成 `dataset.json` 的内容.
///
/// 三个目录任一不存在时返回 [`ManifestError::MissingDirectory`].
/// 测试集条目的标签同样指向 `./labelsTr/`.
pub fn build_manifest<P: AsRef<Path>>(
    dataset_dir: P,
    spec: &ManifestSpec,
) -> Result<serde_json::Value, ManifestError> {
    let dir = dataset_dir.as_ref();
    for sub in [IMAGES_TR, IMAGES_TS, LABELS_TR] {
        let p = dir.join(sub);
        if !p.is_dir() {
            return Err(ManifestError::MissingDirectory(p));
        }
    }

    let entries = |sub: &str, names: &[String]| -> Vec<serde_json::Value> {
        names
            .iter()
            .map(|f| json!({ "image": format!("./{sub}/{f}"), "label": format!("./{LABELS_TR}/{f}") }))
            .collect()
    };
    let training = sorted_file_names(&dir.join(IMAGES_TR))?;
    let test = sorted_file_names(&dir.join(IMAGES_TS))?;

    Ok(json!({
        "name": spec.name,
        "description": spec.description,
        "tensorImageSize": spec.tensor_image_size,
        "reference": spec.reference,
        "licence": spec.licence,
        "release": spec.release,
        "modality": spec.modality,
        "labels": spec.labels,
        "numTest": test.len(),
        "numTraining": training.len(),
        "training": entries(IMAGES_TR, &training),
        "test": entries(IMAGES_TS, &test),
    }))
}

/// 生成并写出 `<dataset_dir>/dataset.json`. 返回清单路径.
pub fn write_manifest<P: AsRef<Path>>(
    dataset_dir: P,
    spec: &ManifestSpec,
) -> Result<PathBuf, ManifestError> {
    let dir = dataset_dir.as_ref();
    let manifest = build_manifest(dir, spec)?;
    let path = dir.join(MANIFEST);
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(path)
}

/// NNUNet 布局适配器.
#[derive(Clone, Debug)]
pub struct NnunetAdapter {
    palette: LabelPalette,
    manifest: ManifestSpec,
}

impl NnunetAdapter {
    /// 构造适配器. `palette` 用于把标签颜色还原为类别索引.
    pub fn new(palette: LabelPalette, manifest: ManifestSpec) -> Self {
        Self { palette, manifest }
    }

    /// 扫描所在的物理目录.
    #[inline]
    fn image_dir(&self, split: Split) -> &'static str {
        match self.folding().apply(split) {
            Split::Test => IMAGES_TS,
            _ => IMAGES_TR,
        }
    }
}

/// 以体素分辨率构造参考 header.
fn reference_header(meta: &VolumeMeta) -> NiftiHeader {
    let [w, h, z] = meta.pix_dim;
    NiftiHeader {
        pixdim: [1.0, w, h, z, 1.0, 1.0, 1.0, 1.0],
        ..NiftiHeader::default()
    }
}

impl OutputAdapter for NnunetAdapter {
    #[inline]
    fn kind(&self) -> AdapterKind {
        AdapterKind::Nnunet
    }

    #[inline]
    fn frame_mode(&self) -> FrameMode {
        FrameMode::WholeVolume
    }

    #[inline]
    fn folding(&self) -> SplitFolding {
        SplitFolding::FoldValIntoTrain
    }

    fn prepare(&self, output_dir: &Path) -> io::Result<()> {
        for sub in [IMAGES_TR, IMAGES_TS, LABELS_TR] {
            fs::create_dir_all(output_dir.join(sub))?;
        }
        Ok(())
    }

    fn write(
        &self,
        pair: &ProcessedPair,
        _kwargs: &AdapterKwargs,
        output_dir: &Path,
        deadline: &Deadline,
    ) -> Result<WriteSummary, JobError> {
        let Some((first, _)) = pair.frames.first() else {
            return Ok(WriteSummary::default());
        };
        let (w, h) = first.dimensions();
        let z = pair.frames.len();

        // nifti 的逻辑索引为 [x, y, z].
        let mut scans = Array3::<u8>::zeros((w as usize, h as usize, z));
        let mut labels = Array3::<u8>::zeros((w as usize, h as usize, z));
        for (k, (scan, label)) in pair.frames.iter().enumerate() {
            if scan.dimensions() != (w, h) || label.dimensions() != (w, h) {
                return Err(AdapterWriteError::Shape(format!(
                    "第 {k} 帧大小为 {:?}, 与第 0 帧 {:?} 不一致",
                    scan.dimensions(),
                    (w, h)
                ))
                .into());
            }
            for (x, y, p) in imageops::grayscale(scan).enumerate_pixels() {
                scans[(x as usize, y as usize, k)] = p.0[0];
            }
            for (x, y, p) in label.enumerate_pixels() {
                let index = self
                    .palette
                    .colour_to_index(p.0)
                    .ok_or(AdapterWriteError::UnknownColour(p.0))?;
                labels[(x as usize, y as usize, k)] = index;
            }
            deadline.check()?;
        }

        let file_name = format!("{}.{}", pair.key, suffix::VOLUME);
        let header = reference_header(&pair.meta);
        let mut pending = PendingFiles::default();
        let image_path = output_dir.join(self.image_dir(pair.split)).join(&file_name);
        WriterOptions::new(pending.track(image_path))
            .reference_header(&header)
            .write_nifti(&scans)
            .map_err(AdapterWriteError::from)?;
        let label_path = output_dir.join(LABELS_TR).join(&file_name);
        WriterOptions::new(pending.track(label_path))
            .reference_header(&header)
            .write_nifti(&labels)
            .map_err(AdapterWriteError::from)?;

        Ok(WriteSummary {
            frames: z,
            files: pending.commit(),
        })
    }

    fn finish(
        &self,
        output_dir: &Path,
        _assignment: &SplitAssignment,
    ) -> Result<Option<PathBuf>, ManifestError> {
        write_manifest(output_dir, &self.manifest).map(Some)
    }
}
