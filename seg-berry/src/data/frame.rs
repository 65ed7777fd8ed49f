//! 单帧预处理: 裁剪与压缩.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{ConfigError, DecodeError};

/// 裁剪区域, 以帧左上角为原点, `x` 向右, `y` 向下.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CropSpec {
    /// 左上角横坐标.
    pub x: u32,
    /// 左上角纵坐标.
    pub y: u32,
    /// 区域宽.
    pub width: u32,
    /// 区域高.
    pub height: u32,
}

/// 一次导出共用的预处理参数.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Preprocess {
    /// 裁剪区域. `None` 表示保留整帧.
    pub crop: Option<CropSpec>,
    /// 压缩系数. 输出帧宽高为 (裁剪后) 宽高整除该系数.
    pub compress: u32,
}

impl Default for Preprocess {
    #[inline]
    fn default() -> Self {
        Self {
            crop: None,
            compress: 1,
        }
    }
}

impl Preprocess {
    /// 检查参数合法性.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compress == 0 {
            return Err(ConfigError::InvalidCrop("压缩系数不能为 0".to_string()));
        }
        if let Some(c) = &self.crop {
            if c.width == 0 || c.height == 0 {
                return Err(ConfigError::InvalidCrop(format!(
                    "裁剪区域宽高不能为 0: {}x{}",
                    c.width, c.height
                )));
            }
        }
        Ok(())
    }

    /// 是否什么都不做.
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.crop.is_none() && self.compress == 1
    }
}

/// 帧的种类. 扫描帧可以插值, 标签帧不能混色.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// 扫描帧.
    Scan,
    /// 标签帧.
    Label,
}

/// 逐帧预处理器.
pub trait FramePreprocessor: Send + Sync {
    /// 按 `params` 处理一帧.
    fn process(
        &self,
        frame: RgbImage,
        kind: FrameKind,
        params: &Preprocess,
    ) -> Result<RgbImage, DecodeError>;
}

/// 默认预处理器: 先裁剪, 再按压缩系数缩小.
///
/// 扫描帧用三角滤波缩放; 标签帧按步长直接取样, 不会产生调色板之外的颜色.
#[derive(Copy, Clone, Debug, Default)]
pub struct CropCompress;

impl FramePreprocessor for CropCompress {
    fn process(
        &self,
        frame: RgbImage,
        kind: FrameKind,
        params: &Preprocess,
    ) -> Result<RgbImage, DecodeError> {
        if params.is_identity() {
            return Ok(frame);
        }

        let cropped = match &params.crop {
            None => frame,
            Some(c) => {
                let (w, h) = frame.dimensions();
                let fits = c.x.checked_add(c.width).is_some_and(|r| r <= w)
                    && c.y.checked_add(c.height).is_some_and(|b| b <= h);
                if !fits {
                    return Err(DecodeError::InconsistentFrameSize(format!(
                        "裁剪区域 {c:?} 超出帧范围 {w}x{h}"
                    )));
                }
                imageops::crop_imm(&frame, c.x, c.y, c.width, c.height).to_image()
            }
        };

        let k = params.compress;
        if k == 1 {
            return Ok(cropped);
        }
        let (w, h) = cropped.dimensions();
        let (nw, nh) = ((w / k).max(1), (h / k).max(1));
        let out = match kind {
            FrameKind::Scan => imageops::resize(&cropped, nw, nh, FilterType::Triangle),
            FrameKind::Label => {
                RgbImage::from_fn(nw, nh, |x, y| *cropped.get_pixel(x * k, y * k))
            }
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn params(crop: Option<CropSpec>, compress: u32) -> Preprocess {
        Preprocess { crop, compress }
    }

    #[test]
    fn test_validate() {
        assert!(params(None, 0).validate().is_err());
        let zero = CropSpec {
            x: 0,
            y: 0,
            width: 0,
            height: 4,
        };
        assert!(params(Some(zero), 1).validate().is_err());
        assert!(Preprocess::default().validate().is_ok());
    }

    #[test]
    fn test_crop_and_stride_label() {
        let frame = RgbImage::from_fn(8, 6, |x, y| Rgb([x as u8, y as u8, 0]));
        let crop = CropSpec {
            x: 2,
            y: 1,
            width: 4,
            height: 4,
        };
        let out = CropCompress
            .process(frame, FrameKind::Label, &params(Some(crop), 2))
            .unwrap();
        assert_eq!(out.dimensions(), (2, 2));
        assert_eq!(out.get_pixel(0, 0).0, [2, 1, 0]);
        assert_eq!(out.get_pixel(1, 1).0, [4, 3, 0]);
    }

    #[test]
    fn test_scan_and_label_sizes_agree() {
        let frame = RgbImage::new(9, 7);
        let p = params(None, 2);
        let scan = CropCompress
            .process(frame.clone(), FrameKind::Scan, &p)
            .unwrap();
        let label = CropCompress.process(frame, FrameKind::Label, &p).unwrap();
        assert_eq!(scan.dimensions(), (4, 3));
        assert_eq!(scan.dimensions(), label.dimensions());
    }

    #[test]
    fn test_crop_out_of_range() {
        let crop = CropSpec {
            x: 5,
            y: 0,
            width: 4,
            height: 1,
        };
        let r = CropCompress.process(RgbImage::new(8, 8), FrameKind::Scan, &params(Some(crop), 1));
        assert!(matches!(r, Err(DecodeError::InconsistentFrameSize(_))));
    }
}
