//! 多边形标注格式.
//!
//! 每帧写出 `images/<split>/<key>_<i>.jpg`, 以及 (至少有一个多边形时)
//! `labels/<split>/<key>_<i>.txt`. 标注每行一个多边形:
//!
//! ```text
//! <class> x1 y1 x2 y2 ...
//! ```
//!
//! 坐标按帧宽高归一化到 \[0, 1\], 保留六位小数. `class` 为调色板索引减一.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use image::{GrayImage, ImageFormat, Luma, RgbImage};
use imageproc::contours::find_contours;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use itertools::Itertools;

use super::{
    create_split_tree, frame_file_name, save_frame, split_dirs, AdapterKind, AdapterKwargs,
    FrameMode, OutputAdapter, PendingFiles, WriteSummary,
};
use crate::consts::{rgb, suffix, DEFAULT_MIN_POLYGONS, POLYGON_EPSILON};
use crate::data::colour::unique_colours;
use crate::data::LabelPalette;
use crate::dataset::ProcessedPair;
use crate::error::{AdapterWriteError, JobError};
use crate::executor::Deadline;

/// 多边形顶点, 像素坐标 (x, y).
pub type Vertex = (u32, u32);

/// 按调色板索引分组的多边形.
pub type Polygons = BTreeMap<u8, Vec<Vec<Vertex>>>;

/// 从标签帧中提取多边形.
pub trait PolygonExtractor: Send + Sync {
    /// 提取 `label` 中所有前景颜色的多边形, 以调色板索引为键.
    fn extract(&self, label: &RgbImage) -> Polygons;
}

/// 轮廓跟踪 + Douglas-Peucker 近似.
///
/// 对每个前景颜色建立二值掩膜, 找出全部轮廓 (包括内孔), 再以
/// `epsilon_ratio * 周长` 为容差近似为闭合多边形.
/// 不在调色板中的颜色被忽略.
#[derive(Clone, Debug)]
pub struct ContourPolygonExtractor {
    palette: LabelPalette,
    epsilon_ratio: f64,
}

impl ContourPolygonExtractor {
    /// 以默认容差比例构造.
    pub fn new(palette: LabelPalette) -> Self {
        Self {
            palette,
            epsilon_ratio: POLYGON_EPSILON,
        }
    }

    /// 设置容差比例.
    pub fn with_epsilon_ratio(mut self, ratio: f64) -> Self {
        self.epsilon_ratio = ratio;
        self
    }
}

impl PolygonExtractor for ContourPolygonExtractor {
    fn extract(&self, label: &RgbImage) -> Polygons {
        let mut ans = Polygons::new();
        for colour in unique_colours(label) {
            if rgb::is_background(colour) {
                continue;
            }
            let Some(index) = self.palette.colour_to_index(colour) else {
                log::debug!("忽略调色板之外的颜色 {colour:?}");
                continue;
            };

            let mask = GrayImage::from_fn(label.width(), label.height(), |x, y| {
                if label.get_pixel(x, y).0 == colour {
                    Luma([u8::MAX])
                } else {
                    Luma([0])
                }
            });
            for contour in find_contours::<u32>(&mask) {
                if contour.points.is_empty() {
                    continue;
                }
                let points = simplify(&contour.points, self.epsilon_ratio);
                ans.entry(index)
                    .or_default()
                    .push(points.into_iter().map(|p| (p.x, p.y)).collect());
            }
        }
        ans
    }
}

/// 闭合曲线的 Douglas-Peucker 近似. 退化曲线 (周长为 0) 原样返回.
fn simplify(points: &[Point<u32>], ratio: f64) -> Vec<Point<u32>> {
    let epsilon = ratio * arc_length(points, true);
    if points.len() < 3 || epsilon <= 0.0 {
        return points.to_vec();
    }
    approximate_polygon_dp(points, epsilon, true)
}

/// 把多边形格式化为标注行. 顶点数少于 `min_vertices` 的多边形被丢弃.
///
/// 类别按调色板索引升序; 调色板索引 0 (背景) 不会出现.
pub fn annotation_lines(
    polygons: &Polygons,
    width: u32,
    height: u32,
    min_vertices: usize,
) -> Vec<String> {
    let (w, h) = (width.max(1) as f64, height.max(1) as f64);
    polygons
        .iter()
        .filter(|(index, _)| **index > 0)
        .flat_map(|(index, polys)| {
            polys
                .iter()
                .filter(move |p| p.len() >= min_vertices)
                .map(move |p| {
                    let coords = p
                        .iter()
                        .map(|(x, y)| format!("{:.6} {:.6}", *x as f64 / w, *y as f64 / h))
                        .join(" ");
                    format!("{} {coords}", index - 1)
                })
        })
        .collect()
}

/// 多边形标注适配器.
pub struct PolygonAdapter {
    extractor: Box<dyn PolygonExtractor>,
}

impl PolygonAdapter {
    /// 以 [`ContourPolygonExtractor`] 构造.
    pub fn new(palette: LabelPalette) -> Self {
        Self::with_extractor(ContourPolygonExtractor::new(palette))
    }

    /// 使用自定义的多边形提取器.
    pub fn with_extractor<E: PolygonExtractor + 'static>(extractor: E) -> Self {
        Self {
            extractor: Box::new(extractor),
        }
    }
}

impl OutputAdapter for PolygonAdapter {
    #[inline]
    fn kind(&self) -> AdapterKind {
        AdapterKind::Polygon
    }

    #[inline]
    fn frame_mode(&self) -> FrameMode {
        FrameMode::PerFrame
    }

    fn prepare(&self, output_dir: &Path) -> io::Result<()> {
        create_split_tree(output_dir)
    }

    fn write(
        &self,
        pair: &ProcessedPair,
        kwargs: &AdapterKwargs,
        output_dir: &Path,
        deadline: &Deadline,
    ) -> Result<WriteSummary, JobError> {
        let min_vertices = kwargs.get_usize("min_polygons", DEFAULT_MIN_POLYGONS);
        let (image_dir, label_dir) = split_dirs(output_dir, self.folding().apply(pair.split));
        let mut pending = PendingFiles::default();

        for (i, (scan, label)) in pair.frames.iter().enumerate() {
            let image_path = image_dir.join(frame_file_name(&pair.key, i, suffix::IMAGE));
            save_frame(scan, pending.track(image_path), ImageFormat::Jpeg)?;

            let polygons = self.extractor.extract(label);
            let lines = annotation_lines(&polygons, scan.width(), scan.height(), min_vertices);
            if lines.is_empty() {
                log::debug!("{} 第 {i} 帧没有合格的多边形", pair.key);
            } else {
                let path = label_dir.join(frame_file_name(&pair.key, i, suffix::ANNOTATION));
                fs::write(pending.track(path), lines.join("\n")).map_err(AdapterWriteError::from)?;
            }
            deadline.check()?;
        }
        Ok(WriteSummary {
            frames: pair.frames.len(),
            files: pending.commit(),
        })
    }
}
