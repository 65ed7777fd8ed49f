//! 扫描与标签解码器.
//!
//! 解码器把一个体数据文件展开为按 z 升序排列的二维帧序列.
//! 扫描帧与标签帧都以 [`RgbImage`] 表示, 标签帧的颜色由 [`LabelPalette`] 决定.

use std::path::Path;

use image::RgbImage;

use super::dicom::DicomScanDecoder;
use super::{gray_to_rgb, paint_labels, LabelIndices, NiftiHeaderAttr, ScanVolume, VolumeMeta};
use crate::data::{CtWindow, LabelPalette};
use crate::error::DecodeError;

/// 扫描解码器.
pub trait ScanDecoder: Send + Sync {
    /// 把 `path` 处的扫描文件解码为有序帧序列.
    fn decode(&self, path: &Path) -> Result<Vec<RgbImage>, DecodeError>;
}

/// 解码后的标签体数据.
#[derive(Clone, Debug)]
pub struct LabelVolume {
    /// 上色后的标签帧, 与扫描帧一一对应.
    pub frames: Vec<RgbImage>,
    /// 几何元信息.
    pub meta: VolumeMeta,
}

/// 标签解码器.
pub trait LabelDecoder: Send + Sync {
    /// 把 `path` 处的标签文件解码为有序的上色帧序列.
    fn decode(&self, path: &Path, palette: &LabelPalette) -> Result<LabelVolume, DecodeError>;
}

/// nii / nii.gz 扫描解码器.
///
/// `window` 为 `None` 时, 每个体数据用自身的最小、最大值作为窗口.
#[derive(Copy, Clone, Debug, Default)]
pub struct NiftiScanDecoder {
    /// 固定窗口.
    pub window: Option<CtWindow>,
}

impl ScanDecoder for NiftiScanDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<RgbImage>, DecodeError> {
        let volume = ScanVolume::open(path)?;
        let window = match self.window {
            Some(w) => w,
            // 全是 NaN/inf 的体数据没有意义, 但仍然可以解码为全黑帧.
            None => CtWindow::min_max(volume.values()).unwrap_or(CtWindow::from_liver_visual()),
        };
        Ok(volume
            .slice_iter()
            .map(|sli| gray_to_rgb(sli, |v| window.eval(v)))
            .collect())
    }
}

/// nii / nii.gz 标签解码器.
///
/// 切片方向与 `data[:, :, z]` 先逆时针旋转 90 度再上下翻转的结果一致,
/// 即帧的行对应原第二维, 列对应原第一维.
#[derive(Copy, Clone, Debug, Default)]
pub struct NiftiLabelDecoder;

impl LabelDecoder for NiftiLabelDecoder {
    fn decode(&self, path: &Path, palette: &LabelPalette) -> Result<LabelVolume, DecodeError> {
        let volume = LabelIndices::open(path)?;
        let frames = volume
            .slice_iter()
            .map(|sli| paint_labels(sli, palette))
            .collect();
        Ok(LabelVolume {
            frames,
            meta: volume.meta(),
        })
    }
}

/// 按文件后缀分派的扫描解码器: `.dcm` / `.dicom` 交给 DICOM 解码器,
/// `.nii` / `.nii.gz` 交给 nifti 解码器.
#[derive(Copy, Clone, Debug, Default)]
pub struct AutoScanDecoder {
    /// nifti 扫描解码器.
    pub nifti: NiftiScanDecoder,
    /// DICOM 扫描解码器.
    pub dicom: DicomScanDecoder,
}

impl ScanDecoder for AutoScanDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<RgbImage>, DecodeError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if name.ends_with(".dcm") || name.ends_with(".dicom") {
            self.dicom.decode(path)
        } else if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            self.nifti.decode(path)
        } else {
            Err(DecodeError::UnknownFormat(path.to_owned()))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::Array3;
    use nifti::writer::WriterOptions;

    /// 以 nifti 惯用的 \[w, h, z\] 格式写出测试体数据.
    pub(crate) fn write_u8_volume(path: &Path, data: &Array3<u8>) {
        WriterOptions::new(path).write_nifti(data).unwrap();
    }

    pub(crate) fn write_f32_volume(path: &Path, data: &Array3<f32>) {
        WriterOptions::new(path).write_nifti(data).unwrap();
    }

    #[test]
    fn test_label_orientation_and_colours() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.nii.gz");

        // [w=3, h=2, z=2]
        let mut data = Array3::<u8>::zeros((3, 2, 2));
        data[(2, 0, 1)] = 1;
        data[(0, 1, 1)] = 2;
        write_u8_volume(&path, &data);

        let palette = LabelPalette::default();
        let volume = NiftiLabelDecoder.decode(&path, &palette).unwrap();
        assert_eq!(volume.frames.len(), 2);
        assert_eq!(volume.frames[0].dimensions(), (3, 2));
        assert!(volume.frames[0].pixels().all(|p| p.0 == [0, 0, 0]));

        let f = &volume.frames[1];
        assert_eq!(f.get_pixel(2, 0).0, palette.index_to_colour(1));
        assert_eq!(f.get_pixel(0, 1).0, palette.index_to_colour(2));
        assert_eq!(f.get_pixel(1, 1).0, [0, 0, 0]);
    }

    #[test]
    fn test_scan_min_max_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.nii");

        let mut data = Array3::<f32>::zeros((2, 2, 1));
        data[(0, 0, 0)] = -1000.0;
        data[(1, 1, 0)] = 1000.0;
        write_f32_volume(&path, &data);

        let frames = NiftiScanDecoder::default().decode(&path).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(frames[0].get_pixel(1, 1).0, [255, 255, 255]);
        assert_eq!(frames[0].get_pixel(1, 0).0, [127, 127, 127]);
    }

    #[test]
    fn test_auto_decoder_rejects_unknown() {
        let r = AutoScanDecoder::default().decode(Path::new("x.png"));
        assert!(matches!(r, Err(DecodeError::UnknownFormat(_))));
    }
}
