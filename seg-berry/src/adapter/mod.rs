//! 输出适配器.
//!
//! 每种训练数据集格式实现一次 [`OutputAdapter`]. 流程只依赖该 trait,
//! 不关心具体格式.
//!
//! | 适配器 | 粒度 | 目录 |
//! |---|---|---|
//! | [`PolygonAdapter`] | 逐帧 | `images/<split>/*.jpg`, `labels/<split>/*.txt` |
//! | [`HuggingfaceAdapter`] | 逐帧 | `images/<split>/*.jpg`, `labels/<split>/*.png` |
//! | [`NnunetAdapter`] | 整个体数据 | `imagesTr`, `imagesTs`, `labelsTr`, `dataset.json` |

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{ImageFormat, RgbImage};

use crate::data::LabelPalette;
use crate::dataset::{ProcessedPair, Split, SplitAssignment, SplitFolding};
use crate::error::{AdapterWriteError, JobError, ManifestError};
use crate::executor::Deadline;

pub mod huggingface;
pub mod nnunet;
pub mod polygon;

pub use huggingface::HuggingfaceAdapter;
pub use nnunet::{ManifestSpec, NnunetAdapter};
pub use polygon::{ContourPolygonExtractor, PolygonAdapter, PolygonExtractor};

/// 适配器每次处理的数据粒度.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameMode {
    /// 每帧单独写出.
    PerFrame,
    /// 整个体数据写为一个文件.
    WholeVolume,
}

/// 输出格式.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AdapterKind {
    /// 多边形标注.
    Polygon,
    /// Huggingface 图像分割目录布局.
    Huggingface,
    /// NNUNet 目录布局.
    Nnunet,
}

impl AdapterKind {
    /// 全部格式.
    pub const ALL: [AdapterKind; 3] = [
        AdapterKind::Polygon,
        AdapterKind::Huggingface,
        AdapterKind::Nnunet,
    ];

    /// 格式名.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Polygon => "polygon",
            AdapterKind::Huggingface => "huggingface",
            AdapterKind::Nnunet => "nnunet",
        }
    }

    /// 构造对应的适配器. `manifest` 只对 NNUNet 有意义.
    pub fn build(self, palette: &LabelPalette, manifest: &ManifestSpec) -> Box<dyn OutputAdapter> {
        match self {
            AdapterKind::Polygon => Box::new(PolygonAdapter::new(palette.clone())),
            AdapterKind::Huggingface => Box::new(HuggingfaceAdapter),
            AdapterKind::Nnunet => Box::new(NnunetAdapter::new(palette.clone(), manifest.clone())),
        }
    }
}

impl fmt::Display for AdapterKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("未知的输出格式 `{s}`, 可选: polygon, huggingface, nnunet"))
    }
}

/// 适配器专用参数, 如 `min_polygons`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AdapterKwargs(pub BTreeMap<String, serde_json::Value>);

impl AdapterKwargs {
    /// 设置参数.
    pub fn insert<K: Into<String>, V: Into<serde_json::Value>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    /// 读取非负整数参数. 不存在或类型不符时返回 `default`.
    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        match self.0.get(key).and_then(serde_json::Value::as_u64) {
            Some(v) => v as usize,
            None => {
                if self.0.contains_key(key) {
                    log::warn!("参数 {key} 不是非负整数, 使用默认值 {default}");
                }
                default
            }
        }
    }
}

/// 一次写出的结果.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// 写出的帧数 (整体积模式下为体数据的 z 长度).
    pub frames: usize,
    /// 写出的文件, 按写出顺序.
    pub files: Vec<PathBuf>,
}

/// 输出适配器.
///
/// `write` 只写自己的输出目录, 不修改 [`ProcessedPair`]. 同一个适配器会在多个线程上
/// 同时处理不同的成对文件, 各任务写出的文件互不相交.
pub trait OutputAdapter: Send + Sync {
    /// 格式.
    fn kind(&self) -> AdapterKind;

    /// 数据粒度.
    fn frame_mode(&self) -> FrameMode;

    /// 逻辑划分到物理目录的策略.
    #[inline]
    fn folding(&self) -> SplitFolding {
        SplitFolding::Identity
    }

    /// 在任何任务开始前创建目录结构.
    fn prepare(&self, output_dir: &Path) -> io::Result<()>;

    /// 写出一个成对文件. 零帧的成对文件什么也不写.
    ///
    /// 每写完一帧都会检查 `deadline`.
    fn write(
        &self,
        pair: &ProcessedPair,
        kwargs: &AdapterKwargs,
        output_dir: &Path,
        deadline: &Deadline,
    ) -> Result<WriteSummary, JobError>;

    /// 所有任务结束后调用. 返回生成的清单文件 (若有).
    #[inline]
    fn finish(
        &self,
        _output_dir: &Path,
        _assignment: &SplitAssignment,
    ) -> Result<Option<PathBuf>, ManifestError> {
        Ok(None)
    }
}

/// `images/<split>` 与 `labels/<split>`.
pub(crate) fn split_dirs(output_dir: &Path, split: Split) -> (PathBuf, PathBuf) {
    (
        output_dir.join("images").join(split.as_str()),
        output_dir.join("labels").join(split.as_str()),
    )
}

/// 创建 `images/{train,val,test}` 与 `labels/{train,val,test}`.
pub(crate) fn create_split_tree(output_dir: &Path) -> io::Result<()> {
    for split in Split::ALL {
        let (images, labels) = split_dirs(output_dir, split);
        fs::create_dir_all(images)?;
        fs::create_dir_all(labels)?;
    }
    Ok(())
}

/// 逐帧文件名 `<key>_<index>.<ext>`.
#[inline]
pub(crate) fn frame_file_name(key: &str, index: usize, ext: &str) -> String {
    format!("{key}_{index}.{ext}")
}

/// 一个任务已经 (或正在) 写出的文件.
///
/// 在 [`PendingFiles::commit`] 之前被丢弃 (写出出错, 超时或 panic) 时删除全部文件,
/// 输出目录中不会留下报告里记为失败的半个成对文件. 路径应在开始写之前登记.
#[derive(Debug, Default)]
pub(crate) struct PendingFiles {
    files: Vec<PathBuf>,
    committed: bool,
}

impl PendingFiles {
    /// 登记即将写出的文件, 返回其路径.
    pub(crate) fn track(&mut self, path: PathBuf) -> &Path {
        self.files.push(path);
        &self.files[self.files.len() - 1]
    }

    /// 保留全部文件.
    pub(crate) fn commit(mut self) -> Vec<PathBuf> {
        self.committed = true;
        std::mem::take(&mut self.files)
    }
}

impl Drop for PendingFiles {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for f in self.files.iter() {
            match fs::remove_file(f) {
                Ok(()) => log::debug!("已删除未完成的输出 {}", f.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("无法删除未完成的输出 {}: {e}", f.display()),
            }
        }
    }
}

/// 以指定格式保存一帧.
pub(crate) fn save_frame(
    frame: &RgbImage,
    path: &Path,
    format: ImageFormat,
) -> Result<(), AdapterWriteError> {
    frame.save_with_format(path, format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!("NNUNet".parse::<AdapterKind>(), Ok(AdapterKind::Nnunet));
        assert_eq!("polygon".parse::<AdapterKind>(), Ok(AdapterKind::Polygon));
        assert!("yolo".parse::<AdapterKind>().is_err());
        assert_eq!(AdapterKind::Huggingface.to_string(), "huggingface");
    }

    #[test]
    fn test_kwargs() {
        let mut kw = AdapterKwargs::default();
        assert_eq!(kw.get_usize("min_polygons", 6), 6);
        kw.insert("min_polygons", 3);
        assert_eq!(kw.get_usize("min_polygons", 6), 3);
        kw.insert("min_polygons", "three");
        assert_eq!(kw.get_usize("min_polygons", 6), 6);
    }

    #[test]
    fn test_pending_files() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a.txt"), dir.path().join("b.txt"));

        let mut pending = PendingFiles::default();
        fs::write(pending.track(a.clone()), b"a").unwrap();
        pending.track(b.clone());
        drop(pending);
        assert!(!a.exists() && !b.exists());

        let mut pending = PendingFiles::default();
        fs::write(pending.track(a.clone()), b"a").unwrap();
        assert_eq!(pending.commit(), vec![a.clone()]);
        assert!(a.is_file());
    }

    #[test]
    fn test_frame_file_name() {
        assert_eq!(frame_file_name("case_01", 7, "jpg"), "case_01_7.jpg");
        let (i, l) = split_dirs(Path::new("/out"), Split::Val);
        assert_eq!(i, Path::new("/out/images/val"));
        assert_eq!(l, Path::new("/out/labels/val"));
    }
}
