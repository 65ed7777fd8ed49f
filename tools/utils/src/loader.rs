//! 对 `seg-berry::dataset` 的更一层封装. 提供默认的输入、输出目录.

use std::env;
use std::path::PathBuf;

use seg_berry::dataset::home_dataset_dir_with;

/// 输入目录的环境变量.
pub const INPUT_DIR_ENV: &str = "SEG_BERRY_INPUT_DIR";

/// 输出目录的环境变量.
pub const OUTPUT_DIR_ENV: &str = "SEG_BERRY_OUTPUT_DIR";

fn from_env_or_home(var: &str, sub: &str) -> Option<PathBuf> {
    match env::var_os(var) {
        Some(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with([sub]),
    }
}

/// 获取成对文件输入目录.
///
/// 1. 若环境变量 `$SEG_BERRY_INPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/pairs`. 无法确定主目录时返回 `None`.
#[inline]
pub fn input_dir_from_env_or_home() -> Option<PathBuf> {
    from_env_or_home(INPUT_DIR_ENV, "pairs")
}

/// 获取导出目录.
///
/// 1. 若环境变量 `$SEG_BERRY_OUTPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/export`. 无法确定主目录时返回 `None`.
#[inline]
pub fn output_dir_from_env_or_home() -> Option<PathBuf> {
    from_env_or_home(OUTPUT_DIR_ENV, "export")
}
