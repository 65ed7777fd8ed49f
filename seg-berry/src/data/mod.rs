use std::path::Path;

use image::{Rgb as Px, RgbImage};
use ndarray::{Array3, ArrayView2, Axis, IxDyn};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::DecodeError;
use crate::Idx3d;

pub mod colour;
pub mod decode;
pub mod dicom;
pub mod frame;
pub mod window;

pub use colour::{ColourRemap, LabelPalette};
pub use decode::{
    AutoScanDecoder, LabelDecoder, LabelVolume, NiftiLabelDecoder, NiftiScanDecoder, ScanDecoder,
};
pub use dicom::DicomScanDecoder;
pub use frame::{CropCompress, CropSpec, FrameKind, FramePreprocessor, Preprocess};
pub use window::CtWindow;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组. 二维文件的 z 记为 1.
    let [ndim, w, h, z, ..] = h.dim;
    let z = if ndim < 3 { 1 } else { z.max(1) };
    (z as usize, h as usize, w as usize)
}

/// 体数据的几何元信息.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VolumeMeta {
    /// 体素分辨率 \[w, h, z\], 以毫米为单位. 未知时为 1.
    pub pix_dim: [f32; 3],
}

impl Default for VolumeMeta {
    #[inline]
    fn default() -> Self {
        Self {
            pix_dim: [1.0; 3],
        }
    }
}

/// 3D nii 文件 header 的共用属性.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取单个体素分辨率 \[w, h, z\]. 非正数 (未填写) 的分量记为 1.
    #[inline]
    fn meta(&self) -> VolumeMeta {
        let [_, w, h, z, ..] = self.header().pixdim;
        let fix = |v: f32| if v.is_finite() && v > 0.0 { v } else { 1.0 };
        VolumeMeta {
            pix_dim: [fix(w), fix(h), fix(z)],
        }
    }
}

/// 读取 nii 文件, 并将数据重排为行优先的 (z, H, W).
///
/// 四维文件只要多出来的维度长度为 1 (如 `[W, H, z, 1]`) 也可以读取.
macro_rules! impl_nifti_open {
    ($($volume: ident => $elem: ty),+) => {
        $(
            impl $volume {
                /// 打开 nii / nii.gz 文件. `path` 为文件的本地路径.
                pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
                    let obj = ReaderOptions::new().read_file(path.as_ref())?;
                    let header = Box::new(obj.header().clone());
                    let shape = get_shape_from_header(&header);

                    // [W, H, z, ...] -> [..., z, H, W].
                    // hint: 原第一维向下增长, 原第二维向右增长.
                    let data = obj.into_volume().into_ndarray::<$elem>()?;
                    let axes: Vec<usize> = (0..data.ndim()).rev().collect();
                    let data = data.permuted_axes(IxDyn(&axes));
                    let data = if data.is_standard_layout() {
                        data
                    } else {
                        data.as_standard_layout().into_owned()
                    };

                    let (z, h, w) = shape;
                    if data.len() != z * h * w {
                        return Err(DecodeError::InconsistentFrameSize(format!(
                            "header 形状 {shape:?} 与数据长度 {} 不一致",
                            data.len()
                        )));
                    }
                    let data = Array3::from_shape_vec(shape, data.into_raw_vec())
                        .map_err(|e| DecodeError::InconsistentFrameSize(e.to_string()))?;

                    Ok(Self { header, data })
                }

                /// 获取能按升序迭代水平切片的迭代器.
                #[inline]
                pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = ArrayView2<'_, $elem>> {
                    self.data.axis_iter(Axis(0))
                }
            }

            impl NiftiHeaderAttr for $volume {
                #[inline]
                fn header(&self) -> &NiftiHeader {
                    &self.header
                }
            }
        )+
    };
}

/// nii 格式的 3D 扫描. 体素值以 `f32` 保存 (已应用 `scl_slope` / `scl_inter`).
#[derive(Debug, Clone)]
pub struct ScanVolume {
    header: BoxedHeader,
    data: Array3<f32>,
}

/// nii 格式的 3D 分割标签. 体素值为类别索引, 以 `u8` 保存.
#[derive(Debug, Clone)]
pub struct LabelIndices {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl_nifti_open!(ScanVolume => f32, LabelIndices => u8);

impl ScanVolume {
    /// 获取能迭代所有体素值的迭代器.
    #[inline]
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied()
    }
}

/// 把一个灰度切片 (H, W) 展开成三通道图像.
pub(crate) fn gray_to_rgb<F: Fn(f32) -> u8>(sli: ArrayView2<'_, f32>, eval: F) -> RgbImage {
    let (h, w) = sli.dim();
    let mut buf = RgbImage::new(w as u32, h as u32);
    for ((y, x), &v) in sli.indexed_iter() {
        let g = eval(v);
        buf.put_pixel(x as u32, y as u32, Px([g, g, g]));
    }
    buf
}

/// 用调色板把一个类别索引切片 (H, W) 上色.
pub(crate) fn paint_labels(sli: ArrayView2<'_, u8>, palette: &LabelPalette) -> RgbImage {
    let (h, w) = sli.dim();
    let mut buf = RgbImage::new(w as u32, h as u32);
    for ((y, x), &idx) in sli.indexed_iter() {
        buf.put_pixel(x as u32, y as u32, Px(palette.index_to_colour(idx)));
    }
    buf
}
