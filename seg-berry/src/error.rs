//! 错误类型.
//!
//! 整个导出流程的失败粒度分为两层:
//!
//! 1. **运行级** ([`ExportError`]): 配置非法、输入目录无法读取、一个成对文件都没有、
//!   输出目录无法创建、NNUNet 清单生成失败. 这类错误会直接终止本次运行.
//! 2. **成对文件级** ([`JobError`]): 解码失败、形状不一致、写盘失败、取消或超时.
//!   这类错误只记录在报告中, 不会影响其它成对文件的导出.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 配置错误. 总是在任何 I/O 和任务分发之前同步返回.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 三个划分比例之和不为 1 (以十倍定点比较).
    #[error("划分比例之和必须为 1, 当前为 {sum}")]
    RatioSum {
        /// 实际求得的比例之和.
        sum: f64,
    },

    /// 存在负数或非有限的比例.
    #[error("划分比例必须为非负有限数, 但发现了 `{0}`")]
    InvalidRatio(f64),

    /// 工作线程数为 0.
    #[error("工作线程数必须大于 0")]
    ZeroWorkers,

    /// 裁剪区域宽高为 0, 或压缩系数为 0.
    #[error("裁剪参数非法: {0}")]
    InvalidCrop(String),

    /// 后缀配置为空, 或扫描后缀与标签后缀完全相同.
    #[error("成对文件后缀配置非法: {0}")]
    InvalidLayout(String),
}

/// 成对文件发现阶段的错误.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// 输入路径不是目录.
    #[error("输入路径 `{}` 不是目录", .0.display())]
    NotADirectory(PathBuf),

    /// 读取目录时的底层 I/O 错误.
    #[error("读取输入目录失败: {0}")]
    Io(#[from] std::io::Error),

    /// 两个不同的同侧文件推导出了同一个键. 静默覆盖会丢数据, 因此直接报错.
    #[error("键 `{key}` 重复: `{}` 与 `{}`", .first.display(), .second.display())]
    DuplicateKey {
        /// 重复的键.
        key: String,
        /// 先发现的文件.
        first: PathBuf,
        /// 后发现的文件.
        second: PathBuf,
    },
}

/// 单个成对文件的解码错误.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// nifti 文件读取或转换失败.
    #[error("nifti 解码失败: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// DICOM 文件读取失败.
    #[error("DICOM 解码失败: {0}")]
    Dicom(String),

    /// DICOM 缺少必需的标签.
    #[error("DICOM 缺少标签 {0}")]
    MissingTag(&'static str),

    /// 不支持的像素数据 (如压缩传输语法, 或非常规位深).
    #[error("不支持的像素数据: {0}")]
    UnsupportedPixelData(String),

    /// 扫描与标签的帧数不一致.
    #[error("扫描帧数 ({scan}) 与标签帧数 ({label}) 不一致")]
    ShapeMismatch {
        /// 扫描帧数.
        scan: usize,
        /// 标签帧数.
        label: usize,
    },

    /// 同一体数据内帧大小不一致, 或裁剪区域越出帧范围.
    #[error("帧大小不一致: {0}")]
    InconsistentFrameSize(String),

    /// 不认识的文件后缀.
    #[error("没有可处理 `{}` 的解码器", .0.display())]
    UnknownFormat(PathBuf),

    /// 其它底层 I/O 错误.
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 输出适配器写盘错误.
#[derive(Debug, Error)]
pub enum AdapterWriteError {
    /// 底层 I/O 错误.
    #[error("写入失败: {0}")]
    Io(#[from] std::io::Error),

    /// 图像编码错误.
    #[error("图像编码失败: {0}")]
    Image(#[from] image::ImageError),

    /// nifti 写出错误.
    #[error("nifti 写出失败: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 数据无法组织成体数据 (帧大小不一致等).
    #[error("无法组织体数据: {0}")]
    Shape(String),

    /// 标签帧中出现了调色板之外的颜色, 无法转换为类别索引.
    #[error("颜色 {0:?} 不在调色板中")]
    UnknownColour([u8; 3]),
}

/// NNUNet `dataset.json` 清单生成错误.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// 期望存在的目录不存在.
    #[error("目录不存在: `{}`", .0.display())]
    MissingDirectory(PathBuf),

    /// 底层 I/O 错误.
    #[error("清单 I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化错误.
    #[error("清单序列化失败: {0}")]
    Json(#[from] serde_json::Error),
}

/// 单个任务 (一个成对文件) 的失败原因.
#[derive(Debug, Error)]
pub enum JobError {
    /// 解码阶段失败.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// 写盘阶段失败.
    #[error(transparent)]
    Write(#[from] AdapterWriteError),

    /// 任务开始前收到了取消信号.
    #[error("任务已取消")]
    Cancelled,

    /// 任务超出时间预算.
    #[error("任务超出时间预算 {budget:?}")]
    TimedOut {
        /// 预算.
        budget: Duration,
    },

    /// 任务内部 panic. 载荷为 panic 信息.
    #[error("任务 panic: {0}")]
    Panicked(String),
}

/// 运行级错误.
#[derive(Debug, Error)]
pub enum ExportError {
    /// 配置错误.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 成对文件发现失败.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// 输入目录中没有任何完整的成对文件.
    #[error("输入目录 `{}` 中没有完整的成对文件", .0.display())]
    NoPairs(PathBuf),

    /// 无法创建输出目录结构.
    #[error("无法创建输出目录: {0}")]
    Prepare(std::io::Error),

    /// 线程池构建失败.
    #[error("线程池构建失败: {0}")]
    Pool(String),

    /// NNUNet 清单生成失败.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}
