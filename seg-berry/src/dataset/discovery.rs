//! 成对文件发现.
//!
//! 扫描输入目录, 按文件名去掉后缀后的 key 把扫描文件和标签文件配对.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::consts::suffix;
use crate::error::{ConfigError, DiscoveryError};

/// 文件命名约定: 哪些后缀是扫描文件, 哪些是标签文件.
///
/// 文件名匹配多个后缀时, 最长的后缀生效. 因此 `a.nii.gz` 匹配 `.nii.gz` 而不是 `.gz`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairLayout {
    /// 扫描文件后缀.
    pub scan_suffixes: Vec<String>,
    /// 标签文件后缀.
    pub label_suffixes: Vec<String>,
}

impl Default for PairLayout {
    fn default() -> Self {
        Self {
            scan_suffixes: suffix::SCAN.iter().map(|s| s.to_string()).collect(),
            label_suffixes: suffix::LABEL.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PairLayout {
    /// 用给定后缀构造约定.
    pub fn new<S: Into<String>>(
        scan: impl IntoIterator<Item = S>,
        label: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            scan_suffixes: scan.into_iter().map(Into::into).collect(),
            label_suffixes: label.into_iter().map(Into::into).collect(),
        }
    }

    /// 检查约定: 两侧都不能为空, 后缀不能为空串, 同一个后缀不能同时出现在两侧.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_suffixes.is_empty() || self.label_suffixes.is_empty() {
            return Err(ConfigError::InvalidLayout(
                "扫描与标签后缀都至少需要一个".to_string(),
            ));
        }
        if let Some(s) = self
            .scan_suffixes
            .iter()
            .chain(self.label_suffixes.iter())
            .find(|s| s.is_empty())
        {
            return Err(ConfigError::InvalidLayout(format!("空后缀 {s:?}")));
        }
        if let Some(s) = self
            .scan_suffixes
            .iter()
            .find(|s| self.label_suffixes.contains(s))
        {
            return Err(ConfigError::InvalidLayout(format!(
                "后缀 {s} 同时属于扫描与标签"
            )));
        }
        Ok(())
    }

    /// 对文件名分类. 返回 (种类, key). 不匹配任何后缀, 或去掉后缀后为空时返回 `None`.
    pub fn classify<'a>(&self, file_name: &'a str) -> Option<(Side, &'a str)> {
        let scan = self.scan_suffixes.iter().map(|s| (Side::Scan, s));
        let label = self.label_suffixes.iter().map(|s| (Side::Label, s));
        let (side, suf) = scan
            .chain(label)
            .filter(|(_, s)| file_name.ends_with(s.as_str()))
            .max_by_key(|(_, s)| s.len())?;
        let key = &file_name[..file_name.len() - suf.len()];
        (!key.is_empty()).then_some((side, key))
    }
}

/// 文件属于扫描还是标签.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    /// 扫描文件.
    Scan,
    /// 标签文件.
    Label,
}

/// 以 key 配对的一组文件. 两侧都存在时才算完整.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePair {
    /// 文件名去掉后缀后的公共部分.
    pub key: String,
    /// 扫描文件路径.
    pub scan_path: Option<PathBuf>,
    /// 标签文件路径.
    pub label_path: Option<PathBuf>,
}

impl FilePair {
    /// 完整的配对.
    pub fn complete<K: Into<String>, P: Into<PathBuf>>(key: K, scan: P, label: P) -> Self {
        Self {
            key: key.into(),
            scan_path: Some(scan.into()),
            label_path: Some(label.into()),
        }
    }

    /// 扫描与标签是否都存在?
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.scan_path.is_some() && self.label_path.is_some()
    }
}

/// 一次发现的结果. 两个列表都按 key 升序.
#[derive(Clone, Debug, Default)]
pub struct Discovery {
    /// 完整的配对.
    pub complete: Vec<FilePair>,
    /// 只有一侧的配对. 它们不会被导出, 只用于提示.
    pub incomplete: Vec<FilePair>,
}

impl Discovery {
    /// 所有完整配对的 key, 升序.
    pub fn keys(&self) -> Vec<String> {
        self.complete.iter().map(|p| p.key.clone()).collect()
    }
}

/// 扫描 `dir` (不递归), 按 `layout` 把文件配对.
///
/// 符号链接按其指向的文件处理. 隐藏文件 (以 `.` 开头) 与子目录被忽略. 两个文件在同一侧映射到同一 key 时报错,
/// 而不是静默地丢弃其中一个.
pub fn discover_pairs<P: AsRef<Path>>(
    dir: P,
    layout: &PairLayout,
) -> Result<Discovery, DiscoveryError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(DiscoveryError::NotADirectory(dir.to_owned()));
    }

    let mut found: BTreeMap<String, FilePair> = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        // 跟随符号链接; 断开的链接与目录一样跳过.
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            log::warn!("跳过非 UTF-8 文件名: {}", path.display());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let Some((side, key)) = layout.classify(name) else {
            log::debug!("跳过无关文件: {name}");
            continue;
        };

        let pair = found.entry(key.to_string()).or_insert_with(|| FilePair {
            key: key.to_string(),
            scan_path: None,
            label_path: None,
        });
        let slot = match side {
            Side::Scan => &mut pair.scan_path,
            Side::Label => &mut pair.label_path,
        };
        if let Some(first) = slot.as_ref() {
            return Err(DiscoveryError::DuplicateKey {
                key: key.to_string(),
                first: first.clone(),
                second: path,
            });
        }
        *slot = Some(path);
    }

    let (complete, incomplete): (Vec<_>, Vec<_>) =
        found.into_values().partition(FilePair::is_complete);
    for p in incomplete.iter() {
        let missing = if p.scan_path.is_none() { "扫描" } else { "标签" };
        log::warn!("配对 {} 缺少{missing}文件, 已跳过", p.key);
    }
    log::info!(
        "在 {} 中发现 {} 组完整配对, {} 组不完整",
        dir.display(),
        complete.len(),
        incomplete.len()
    );

    Ok(Discovery {
        complete,
        incomplete,
    })
}
