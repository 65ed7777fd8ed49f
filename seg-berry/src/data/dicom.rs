//! 未压缩 DICOM 扫描解码.
//!
//! 只支持 Implicit / Explicit VR Little Endian 两种传输语法.
//! 支持 8-bit 灰度与 RGB, 以及 16-bit 灰度 (按 rescale 与窗口映射到 8-bit).

use std::path::Path;

use dicom_dictionary_std::tags;
use dicom_object::{open_file, DefaultDicomObject, Tag};
use image::{Rgb as Px, RgbImage};

use super::decode::ScanDecoder;
use super::CtWindow;
use crate::error::DecodeError;

const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

/// DICOM 扫描解码器. 每一帧展开为一张图像.
///
/// 16-bit 数据的窗口按如下顺序确定: `window` 字段, 文件内的
/// WindowCenter / WindowWidth, 整个文件像素值的最小、最大值.
#[derive(Copy, Clone, Debug, Default)]
pub struct DicomScanDecoder {
    /// 固定窗口, 作用在 rescale 之后的值上.
    pub window: Option<CtWindow>,
}

impl ScanDecoder for DicomScanDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<RgbImage>, DecodeError> {
        let obj = open_file(path).map_err(|e| DecodeError::Dicom(e.to_string()))?;

        let ts = obj.meta().transfer_syntax().trim_end_matches('\0');
        if ts != IMPLICIT_VR_LE && ts != EXPLICIT_VR_LE {
            return Err(DecodeError::UnsupportedPixelData(format!(
                "不支持的传输语法 {ts}"
            )));
        }

        let layout = PixelLayout::read(&obj)?;
        let bytes = obj
            .element(tags::PIXEL_DATA)
            .map_err(|_| DecodeError::MissingTag("PixelData"))?
            .to_bytes()
            .map_err(|e| DecodeError::Dicom(e.to_string()))?;
        let expected = layout.byte_len()?;
        if bytes.len() < expected {
            return Err(DecodeError::InconsistentFrameSize(format!(
                "像素数据长度 {} 小于期望的 {expected}",
                bytes.len()
            )));
        }
        let bytes = &bytes[..expected];

        match (layout.bits_allocated, layout.samples) {
            (8, 1) => Ok(layout.decode_mono8(bytes)),
            (8, 3) => Ok(layout.decode_rgb8(bytes)),
            (16, 1) => {
                let window = match self.window {
                    Some(w) => Some(w),
                    None => file_window(&obj),
                };
                Ok(layout.decode_mono16(bytes, window))
            }
            (bits, samples) => Err(DecodeError::UnsupportedPixelData(format!(
                "BitsAllocated = {bits}, SamplesPerPixel = {samples}"
            ))),
        }
    }
}

/// 从文件头中读出的像素排布.
#[derive(Debug)]
struct PixelLayout {
    rows: u32,
    cols: u32,
    frames: usize,
    samples: u16,
    bits_allocated: u16,
    signed: bool,
    planar: bool,
    inverted: bool,
    slope: f64,
    intercept: f64,
}

impl PixelLayout {
    fn read(obj: &DefaultDicomObject) -> Result<Self, DecodeError> {
        let rows = get_int(obj, tags::ROWS).ok_or(DecodeError::MissingTag("Rows"))?;
        let cols = get_int(obj, tags::COLUMNS).ok_or(DecodeError::MissingTag("Columns"))?;
        let bits_allocated =
            get_int(obj, tags::BITS_ALLOCATED).ok_or(DecodeError::MissingTag("BitsAllocated"))?;
        let photometric = get_string(obj, tags::PHOTOMETRIC_INTERPRETATION)
            .ok_or(DecodeError::MissingTag("PhotometricInterpretation"))?;

        if rows <= 0 || cols <= 0 {
            return Err(DecodeError::InconsistentFrameSize(format!(
                "非法的帧大小 {cols}x{rows}"
            )));
        }

        Ok(Self {
            rows: rows as u32,
            cols: cols as u32,
            frames: get_string(obj, tags::NUMBER_OF_FRAMES)
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(1)
                .max(1),
            samples: get_int(obj, tags::SAMPLES_PER_PIXEL).unwrap_or(1) as u16,
            bits_allocated: bits_allocated as u16,
            signed: get_int(obj, tags::PIXEL_REPRESENTATION).unwrap_or(0) == 1,
            planar: get_int(obj, tags::PLANAR_CONFIGURATION).unwrap_or(0) == 1,
            inverted: photometric == "MONOCHROME1",
            slope: get_float(obj, tags::RESCALE_SLOPE).unwrap_or(1.0),
            intercept: get_float(obj, tags::RESCALE_INTERCEPT).unwrap_or(0.0),
        })
    }

    #[inline]
    fn pixels_per_frame(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// 像素数据应有的字节数. `NumberOfFrames` 等来自文件头, 乘积溢出时报错.
    fn byte_len(&self) -> Result<usize, DecodeError> {
        self.pixels_per_frame()
            .checked_mul(self.frames)
            .and_then(|n| n.checked_mul(self.samples as usize))
            .and_then(|n| n.checked_mul((self.bits_allocated as usize / 8).max(1)))
            .ok_or_else(|| {
                DecodeError::InconsistentFrameSize(format!(
                    "{}x{} x {} 帧 x {} 通道的像素数据长度溢出",
                    self.rows, self.cols, self.frames, self.samples
                ))
            })
    }

    fn gray_frames<F: Fn(usize) -> u8>(&self, value: F) -> Vec<RgbImage> {
        let n = self.pixels_per_frame();
        (0..self.frames)
            .map(|f| {
                RgbImage::from_fn(self.cols, self.rows, |x, y| {
                    let i = f * n + y as usize * self.cols as usize + x as usize;
                    let g = value(i);
                    let g = if self.inverted { u8::MAX - g } else { g };
                    Px([g, g, g])
                })
            })
            .collect()
    }

    fn decode_mono8(&self, bytes: &[u8]) -> Vec<RgbImage> {
        self.gray_frames(|i| bytes[i])
    }

    fn decode_rgb8(&self, bytes: &[u8]) -> Vec<RgbImage> {
        let n = self.pixels_per_frame();
        (0..self.frames)
            .map(|f| {
                let frame = &bytes[f * n * 3..(f + 1) * n * 3];
                RgbImage::from_fn(self.cols, self.rows, |x, y| {
                    let p = y as usize * self.cols as usize + x as usize;
                    if self.planar {
                        Px([frame[p], frame[n + p], frame[2 * n + p]])
                    } else {
                        Px([frame[3 * p], frame[3 * p + 1], frame[3 * p + 2]])
                    }
                })
            })
            .collect()
    }

    fn decode_mono16(&self, bytes: &[u8], window: Option<CtWindow>) -> Vec<RgbImage> {
        let values: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|b| {
                let raw = if self.signed {
                    i16::from_le_bytes([b[0], b[1]]) as f64
                } else {
                    u16::from_le_bytes([b[0], b[1]]) as f64
                };
                (raw * self.slope + self.intercept) as f32
            })
            .collect();
        let window = window
            .or_else(|| CtWindow::min_max(values.iter().copied()))
            .unwrap_or(CtWindow::from_liver_visual());
        self.gray_frames(|i| window.eval(values[i]))
    }
}

/// 文件内的 WindowCenter / WindowWidth, 多值时取第一个.
fn file_window(obj: &DefaultDicomObject) -> Option<CtWindow> {
    let level = get_float(obj, tags::WINDOW_CENTER)?;
    let width = get_float(obj, tags::WINDOW_WIDTH)?;
    CtWindow::new(level as f32, width as f32)
}

#[inline]
fn get_string(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|s| s.trim().trim_end_matches('\0').to_string())
}

#[inline]
fn get_int(obj: &DefaultDicomObject, tag: Tag) -> Option<i32> {
    obj.element(tag)
        .ok()
        .and_then(|elem| elem.to_int::<i32>().ok())
}

#[inline]
fn get_float(obj: &DefaultDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag)
        .ok()
        .and_then(|elem| elem.to_float64().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(frames: usize, samples: u16, bits: u16) -> PixelLayout {
        PixelLayout {
            rows: 2,
            cols: 2,
            frames,
            samples,
            bits_allocated: bits,
            signed: false,
            planar: false,
            inverted: false,
            slope: 1.0,
            intercept: 0.0,
        }
    }

    #[test]
    fn test_mono8_frames_and_inversion() {
        let mut l = layout(2, 1, 8);
        assert_eq!(l.byte_len().unwrap(), 8);
        let bytes = [0, 10, 20, 30, 40, 50, 60, 70];
        let frames = l.decode_mono8(&bytes);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get_pixel(1, 0).0, [10, 10, 10]);
        assert_eq!(frames[1].get_pixel(0, 1).0, [60, 60, 60]);

        l.inverted = true;
        let frames = l.decode_mono8(&bytes);
        assert_eq!(frames[0].get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_byte_len_overflow() {
        let l = layout(usize::MAX / 2, 3, 16);
        assert!(matches!(
            l.byte_len(),
            Err(DecodeError::InconsistentFrameSize(_))
        ));
    }

    #[test]
    fn test_rgb8_planar_and_interleaved() {
        let mut l = layout(1, 3, 8);
        let interleaved: Vec<u8> = (0..12).collect();
        let frames = l.decode_rgb8(&interleaved);
        assert_eq!(frames[0].get_pixel(1, 0).0, [3, 4, 5]);

        l.planar = true;
        let frames = l.decode_rgb8(&interleaved);
        assert_eq!(frames[0].get_pixel(1, 0).0, [1, 5, 9]);
    }

    #[test]
    fn test_mono16_rescale_and_window() {
        let mut l = layout(1, 1, 16);
        l.slope = 2.0;
        l.intercept = -100.0;
        // 原始值 0, 50, 100, 150 -> -100, 0, 100, 200.
        let bytes: Vec<u8> = [0u16, 50, 100, 150]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let window = CtWindow::from_bounds(0.0, 100.0);
        let frames = l.decode_mono16(&bytes, window);
        assert_eq!(frames[0].get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(frames[0].get_pixel(1, 0).0, [0, 0, 0]);
        assert_eq!(frames[0].get_pixel(0, 1).0, [255, 255, 255]);

        // 没有窗口时使用最小、最大值.
        let frames = l.decode_mono16(&bytes, None);
        assert_eq!(frames[0].get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(frames[0].get_pixel(1, 1).0, [255, 255, 255]);
    }
}
