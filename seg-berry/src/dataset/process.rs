//! 单个成对文件的处理: 解码, 预处理, 去掉空标签帧, 颜色替换.

use std::io;
use std::path::Path;

use image::RgbImage;

use super::discovery::FilePair;
use super::split::Split;
use crate::data::colour::is_empty_frame;
use crate::data::{
    AutoScanDecoder, ColourRemap, CropCompress, FrameKind, FramePreprocessor, LabelDecoder,
    LabelPalette, NiftiLabelDecoder, Preprocess, ScanDecoder, VolumeMeta,
};
use crate::error::DecodeError;

/// 一次导出中所有成对文件共用的处理参数.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProcessParams {
    /// 裁剪与压缩.
    pub preprocess: Preprocess,
    /// 颜色替换, 按顺序作用在每个保留下来的标签帧上.
    pub remap: ColourRemap,
}

/// 处理后的成对文件. 只在单个任务内部存在.
#[derive(Clone, Debug)]
pub struct ProcessedPair {
    /// 配对 key.
    pub key: String,
    /// 划分.
    pub split: Split,
    /// 保留下来的 (扫描帧, 标签帧), 按原 z 序排列.
    pub frames: Vec<(RgbImage, RgbImage)>,
    /// 标签体数据的几何信息.
    pub meta: VolumeMeta,
    /// 因标签为空而被丢弃的帧数.
    pub dropped: usize,
}

impl ProcessedPair {
    /// 保留的帧数.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// 是否一帧都没有保留? 这是合法结果, 适配器什么也不写.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// 成对文件处理器. 持有解码器、预处理器与调色板, 可在多个线程间共享.
pub struct PairProcessor {
    scan_decoder: Box<dyn ScanDecoder>,
    label_decoder: Box<dyn LabelDecoder>,
    preprocessor: Box<dyn FramePreprocessor>,
    palette: LabelPalette,
}

impl Default for PairProcessor {
    fn default() -> Self {
        Self::new(LabelPalette::default())
    }
}

impl std::fmt::Debug for PairProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairProcessor")
            .field("palette_seed", &self.palette.seed())
            .finish_non_exhaustive()
    }
}

impl PairProcessor {
    /// 使用默认解码器 ([`AutoScanDecoder`], [`NiftiLabelDecoder`]) 与 [`CropCompress`].
    pub fn new(palette: LabelPalette) -> Self {
        Self {
            scan_decoder: Box::new(AutoScanDecoder::default()),
            label_decoder: Box::new(NiftiLabelDecoder),
            preprocessor: Box::new(CropCompress),
            palette,
        }
    }

    /// 替换扫描解码器.
    pub fn with_scan_decoder<D: ScanDecoder + 'static>(mut self, decoder: D) -> Self {
        self.scan_decoder = Box::new(decoder);
        self
    }

    /// 替换标签解码器.
    pub fn with_label_decoder<D: LabelDecoder + 'static>(mut self, decoder: D) -> Self {
        self.label_decoder = Box::new(decoder);
        self
    }

    /// 替换帧预处理器.
    pub fn with_preprocessor<F: FramePreprocessor + 'static>(mut self, preprocessor: F) -> Self {
        self.preprocessor = Box::new(preprocessor);
        self
    }

    /// 调色板.
    #[inline]
    pub fn palette(&self) -> &LabelPalette {
        &self.palette
    }

    /// 处理一个完整的成对文件.
    ///
    /// 扫描帧数与标签帧数不同, 或同一位置的两帧大小不同时返回错误.
    /// 标签为空的帧连同对应的扫描帧一起丢弃.
    pub fn process(
        &self,
        pair: &FilePair,
        split: Split,
        params: &ProcessParams,
    ) -> Result<ProcessedPair, DecodeError> {
        let scan_path = required(pair.scan_path.as_deref(), &pair.key, "扫描")?;
        let label_path = required(pair.label_path.as_deref(), &pair.key, "标签")?;

        let scans = self.scan_decoder.decode(scan_path)?;
        let labels = self.label_decoder.decode(label_path, &self.palette)?;
        if scans.len() != labels.frames.len() {
            return Err(DecodeError::ShapeMismatch {
                scan: scans.len(),
                label: labels.frames.len(),
            });
        }

        let mut frames = Vec::with_capacity(scans.len());
        let mut dropped = 0usize;
        for (z, (scan, label)) in scans.into_iter().zip(labels.frames).enumerate() {
            if scan.dimensions() != label.dimensions() {
                return Err(DecodeError::InconsistentFrameSize(format!(
                    "第 {z} 帧: 扫描 {:?}, 标签 {:?}",
                    scan.dimensions(),
                    label.dimensions()
                )));
            }
            let p = &params.preprocess;
            let mut label = self.preprocessor.process(label, FrameKind::Label, p)?;
            if is_empty_frame(&label) {
                dropped += 1;
                continue;
            }
            let scan = self.preprocessor.process(scan, FrameKind::Scan, p)?;
            params.remap.apply(&mut label);
            frames.push((scan, label));
        }
        if dropped > 0 {
            log::debug!("{}: 丢弃 {dropped} 个空标签帧", pair.key);
        }

        Ok(ProcessedPair {
            key: pair.key.clone(),
            split,
            frames,
            meta: labels.meta,
            dropped,
        })
    }
}

#[inline]
fn required<'a>(path: Option<&'a Path>, key: &str, side: &str) -> Result<&'a Path, DecodeError> {
    path.ok_or_else(|| {
        DecodeError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("配对 {key} 缺少{side}文件"),
        ))
    })
}
