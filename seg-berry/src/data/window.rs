/// 灰度窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 用于把 CT HU 值或 16-bit DICOM 像素值映射为 8-bit 灰度.
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CtWindow {
    level: f32,
    width: f32,
}

impl CtWindow {
    /// 构建窗口.
    ///
    /// `level` 和 `width` 必须是有限值且 `width > 0`, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<CtWindow> {
        if level.is_finite() && width.is_finite() && width > 0.0 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 构建一个便于展示腹部 CT 肝脏结构的窗口. 窗位 60, 窗宽 200.
    #[inline]
    pub const fn from_liver_visual() -> CtWindow {
        Self {
            level: 60.0,
            width: 200.0,
        }
    }

    /// 以 `[lower, upper]` 为上下限构建窗口.
    ///
    /// 若 `lower == upper` (如整个体数据是常数), 窗宽取 1, 以免除零.
    /// 非有限值返回 `None`.
    pub fn from_bounds(lower: f32, upper: f32) -> Option<CtWindow> {
        if !lower.is_finite() || !upper.is_finite() || upper < lower {
            return None;
        }
        let width = (upper - lower).max(1.0);
        Some(Self {
            level: lower + width / 2.0,
            width,
        })
    }

    /// 用 `values` 中有限值的最小、最大值构建窗口. 没有有限值时返回 `None`.
    pub fn min_max<I: IntoIterator<Item = f32>>(values: I) -> Option<CtWindow> {
        let (lo, hi) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f32, f32)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })?;
        Self::from_bounds(lo, hi)
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前窗口设置下, `v` 对应的灰度值 (0 <= value <= 255).
    ///
    /// 无意义的值 (inf, NaN) 映射为 0.
    pub fn eval(&self, v: f32) -> u8 {
        if !v.is_finite() {
            return u8::MIN;
        }
        let lb = self.lower_bound();
        if v <= lb {
            u8::MIN
        } else if v >= self.upper_bound() {
            u8::MAX
        } else {
            // 255, not 256.
            (((v - lb) / self.width) * 255.0) as u8
        }
    }
}
