//! 数据集操作: 成对文件发现, 划分, 单对处理.

use std::path::{Path, PathBuf};

pub mod discovery;
pub mod process;
pub mod split;

pub use discovery::{discover_pairs, Discovery, FilePair, PairLayout, Side};
pub use process::{PairProcessor, ProcessParams, ProcessedPair};
pub use split::{
    assign_splits, Split, SplitAssignment, SplitCounts, SplitFolding, SplitRatios,
};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}
