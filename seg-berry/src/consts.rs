//! 通用常量.

/// 三通道颜色.
pub mod rgb {
    use crate::Rgb;

    /// 背景色.
    pub const BLACK: Rgb = [0, 0, 0];

    /// 标签 1, 红色.
    pub const LABEL1: Rgb = [255, 0, 0];

    /// 标签 2, 绿色.
    pub const LABEL2: Rgb = [0, 255, 0];

    /// 标签 3, 蓝色.
    pub const LABEL3: Rgb = [0, 0, 255];

    /// 标签 4, 黄色.
    pub const LABEL4: Rgb = [255, 255, 0];

    /// 标签 5, 蓝绿色.
    pub const LABEL5: Rgb = [0, 128, 128];

    /// 标签 6, 紫色.
    pub const LABEL6: Rgb = [128, 0, 128];

    /// 预定义的标签颜色, 与 ITK-SNAP 的顺序一致. 第 `i` 个元素对应标签 `i + 1`.
    pub const PREDEFINED: [Rgb; 6] = [LABEL1, LABEL2, LABEL3, LABEL4, LABEL5, LABEL6];

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: Rgb) -> bool {
        matches!(p, [0, 0, 0])
    }
}

/// 成对文件的默认后缀.
pub mod suffix {
    /// 默认扫描文件后缀.
    pub const SCAN: &[&str] = &[".dcm"];

    /// 默认标签文件后缀.
    pub const LABEL: &[&str] = &[".nii.gz", ".nii"];

    /// 导出的扫描图像后缀.
    pub const IMAGE: &str = "jpg";

    /// Huggingface 布局导出的标签图像后缀.
    pub const LABEL_IMAGE: &str = "png";

    /// Polygon 布局导出的标注后缀.
    pub const ANNOTATION: &str = "txt";

    /// NNUNet 布局导出的体数据后缀.
    pub const VOLUME: &str = "nii.gz";
}

/// 默认训练集比例.
pub const DEFAULT_TRAIN: f64 = 0.7;

/// 默认验证集比例.
pub const DEFAULT_VAL: f64 = 0.2;

/// 默认测试集比例.
pub const DEFAULT_TEST: f64 = 0.1;

/// 默认划分随机种子.
pub const DEFAULT_SEED: u64 = 42;

/// 默认调色板随机种子.
pub const PALETTE_SEED: u64 = 42;

/// 生成新标签颜色时, 与已有颜色的最小欧氏距离.
pub const PALETTE_MIN_DISTANCE: f64 = 100.0;

/// Polygon 布局中, 一个多边形至少需要的顶点数.
pub const DEFAULT_MIN_POLYGONS: usize = 6;

/// Douglas-Peucker 多边形近似的容差 (相对周长).
pub const POLYGON_EPSILON: f64 = 0.01;
