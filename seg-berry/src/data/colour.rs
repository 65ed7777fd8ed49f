//! 标签颜色: 调色板、颜色替换与空帧判断.

use std::collections::{BTreeSet, HashMap};

use image::RgbImage;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::consts::rgb::{self, BLACK, PREDEFINED};
use crate::consts::{PALETTE_MIN_DISTANCE, PALETTE_SEED};
use crate::Rgb;

/// 连续拒绝这么多次之后, 把最小距离减半, 保证生成过程一定终止.
const MAX_REJECTIONS: u32 = 4096;

/// 标签类别索引与颜色之间的双向映射.
///
/// 索引 0 永远是黑色背景; 1 到 6 为预定义颜色; 其余颜色由显式种子的随机数发生器生成,
/// 并且与已有颜色保持足够的距离. 调色板在构造时一次性生成全部 255 个前景颜色,
/// 之后只读, 可以在多个任务之间共享.
#[derive(Clone, Debug)]
pub struct LabelPalette {
    /// 第 `i` 个元素对应标签 `i + 1`.
    colours: Vec<Rgb>,
    lookup: HashMap<Rgb, u8>,
    seed: u64,
}

impl Default for LabelPalette {
    #[inline]
    fn default() -> Self {
        Self::new(PALETTE_SEED)
    }
}

impl LabelPalette {
    /// 以 `seed` 构造调色板. 相同种子总是得到相同的颜色序列.
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut colours: Vec<Rgb> = PREDEFINED.to_vec();
        let mut min_distance = PALETTE_MIN_DISTANCE;
        let mut rejected = 0u32;

        while colours.len() < u8::MAX as usize {
            let candidate: Rgb = [
                rng.gen_range(0..255),
                rng.gen_range(0..255),
                rng.gen_range(0..255),
            ];
            let too_close = std::iter::once(&BLACK)
                .chain(colours.iter())
                .any(|c| distance(*c, candidate) < min_distance);
            if too_close {
                rejected += 1;
                if rejected == MAX_REJECTIONS {
                    rejected = 0;
                    min_distance /= 2.0;
                }
                continue;
            }
            rejected = 0;
            colours.push(candidate);
        }

        let lookup = colours
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, (i + 1) as u8))
            .collect();
        Self {
            colours,
            lookup,
            seed,
        }
    }

    /// 构造调色板时使用的种子.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 获取类别 `index` 对应的颜色. 0 为黑色背景.
    #[inline]
    pub fn index_to_colour(&self, index: u8) -> Rgb {
        match index {
            0 => BLACK,
            i => self.colours[i as usize - 1],
        }
    }

    /// 获取颜色 `colour` 对应的类别索引. 黑色为 0, 不认识的颜色返回 `None`.
    #[inline]
    pub fn colour_to_index(&self, colour: Rgb) -> Option<u8> {
        if rgb::is_background(colour) {
            return Some(0);
        }
        self.lookup.get(&colour).copied()
    }
}

#[inline]
fn distance(a: Rgb, b: Rgb) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// 有序的颜色替换表.
///
/// 替换按列表顺序依次进行, 后面的替换看到的是前面替换的结果,
/// 因此同一个颜色可以被链式地改写多次.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColourRemap(pub Vec<(Rgb, Rgb)>);

impl ColourRemap {
    /// 是否没有任何替换.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 就地对 `frame` 依次执行所有替换. 返回被改写的像素总数.
    pub fn apply(&self, frame: &mut RgbImage) -> usize {
        self.0
            .iter()
            .map(|(old, new)| change_colour(frame, *old, *new))
            .sum()
    }
}

/// 将 `frame` 中颜色为 `old` 的像素全部替换为 `new`.
///
/// 返回总共成功替换的个数.
pub fn change_colour(frame: &mut RgbImage, old: Rgb, new: Rgb) -> usize {
    let mut cnt = 0usize;
    frame
        .pixels_mut()
        .filter(|p| p.0 == old)
        .for_each(|p| {
            cnt += 1;
            p.0 = new;
        });
    cnt
}

/// 收集 `frame` 中出现的所有颜色, 按字典序排列.
pub fn unique_colours(frame: &RgbImage) -> Vec<Rgb> {
    frame
        .pixels()
        .map(|p| p.0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// 帧是否为全黑 (所有通道的所有像素都为 0)?
#[inline]
pub fn is_empty_frame(frame: &RgbImage) -> bool {
    frame.as_raw().iter().all(|v| *v == 0)
}
