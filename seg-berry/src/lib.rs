#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 把一个目录中成对的医学影像扫描 (nii / DICOM) 与分割标签 (nii)
//! 划分为 train / val / test, 并导出为训练框架可以直接使用的数据集格式.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 划分只由排序后的 key 集合与随机种子决定, 与文件系统的遍历顺序、
//!   工作线程数和任务完成顺序都无关. 同样的输入与配置总是得到同样的输出.
//! 2. 单个成对文件的失败 (解码错误、形状不一致、panic、超时) 只记录在报告中,
//!   不会中断其它成对文件的导出.
//! 3. 配置错误总是在任何 I/O 之前返回.
//!
//! # 功能
//!
//! ### 成对文件发现 ✅
//!
//! 根据扫描后缀与标签后缀把文件归组为 `FilePair`. 缺少一侧的成对文件只记录警告.
//!
//! 实现位于 `seg-berry/src/dataset/discovery.rs`.
//!
//! ### 可复现的 train / val / test 划分 ✅
//!
//! ChaCha8 打乱后按比例向下取整分配, 余数归入 test (test 比例为 0 时归入 train).
//!
//! 实现位于 `seg-berry/src/dataset/split.rs`.
//!
//! ### 解码与逐帧预处理 ✅
//!
//! 1. nii 扫描按 CT 窗口转换为 8-bit 灰度, DICOM 支持未压缩的 8 / 16 位像素数据. ✅
//! 2. nii 标签按调色板上色. ✅
//! 3. 裁剪 + 整数倍压缩, 标签使用最近邻, 扫描使用三角 (双线性) 插值缩放. ✅
//! 4. 颜色替换, 空标签帧丢弃. ✅
//!
//! 实现位于 `seg-berry/src/data/*` 与 `seg-berry/src/dataset/process.rs`.
//!
//! ### 输出格式 ✅
//!
//! 1. 多边形标注 (每帧 jpg + txt). ✅
//! 2. Huggingface 图像分割目录 (每帧 jpg + png). ✅
//! 3. NNUNet (每个成对文件一个 nii.gz, 以及 `dataset.json` 清单). ✅
//!
//! 实现位于 `seg-berry/src/adapter/*`.
//!
//! ### 并行执行 ✅
//!
//! 固定线程数, 任务失败隔离, 取消信号与单任务时间预算.
//!
//! 实现位于 `seg-berry/src/executor.rs`.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// RGB 颜色.
pub type Rgb = [u8; 3];

pub mod adapter;
pub mod consts;
pub mod data;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod prelude;

pub use adapter::{AdapterKind, AdapterKwargs, OutputAdapter};
pub use data::{CtWindow, LabelPalette, NiftiHeaderAttr};
pub use error::{ConfigError, ExportError, JobError};
pub use pipeline::{run_export, run_export_with, ExportOptions, ExportReport, ExportSummary};
