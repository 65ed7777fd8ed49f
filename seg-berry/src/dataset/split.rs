//! 训练集 / 验证集 / 测试集划分.
//!
//! 划分是 (keys, ratios, seed) 的纯函数: 没有 I/O, 没有全局随机状态.
//! 不同的导出格式只要使用相同的参数, 就会得到完全相同的划分.

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::consts::{DEFAULT_TEST, DEFAULT_TRAIN, DEFAULT_VAL};
use crate::error::ConfigError;

/// 数据集划分.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Split {
    /// 训练集.
    Train,
    /// 验证集.
    Val,
    /// 测试集.
    Test,
}

impl Split {
    /// 全部划分, 按输出顺序.
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// 目录名.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 把逻辑划分映射到物理目录的策略.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SplitFolding {
    /// 三个划分各自独立.
    #[default]
    Identity,
    /// 验证集并入训练集. 用于没有验证集目录的布局.
    FoldValIntoTrain,
}

impl SplitFolding {
    /// 应用策略.
    #[inline]
    pub const fn apply(self, split: Split) -> Split {
        match (self, split) {
            (SplitFolding::FoldValIntoTrain, Split::Val) => Split::Train,
            (_, s) => s,
        }
    }
}

/// 三个划分的比例. 各分量非负, 且和为 1.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SplitRatios {
    /// 训练集比例.
    pub train: f64,
    /// 验证集比例.
    pub val: f64,
    /// 测试集比例.
    pub test: f64,
}

impl Default for SplitRatios {
    #[inline]
    fn default() -> Self {
        Self {
            train: DEFAULT_TRAIN,
            val: DEFAULT_VAL,
            test: DEFAULT_TEST,
        }
    }
}

impl SplitRatios {
    /// 放大十倍后比较和时允许的误差.
    const SCALED_TOLERANCE: f64 = 1e-6;

    /// 构造并检查比例.
    pub fn new(train: f64, val: f64, test: f64) -> Result<Self, ConfigError> {
        let ans = Self { train, val, test };
        ans.validate()?;
        Ok(ans)
    }

    /// 检查比例. 各分量必须是非负有限值, 且 `train*10 + val*10 + test*10 == 10`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for r in [self.train, self.val, self.test] {
            if !r.is_finite() || r < 0.0 {
                return Err(ConfigError::InvalidRatio(r));
            }
        }
        let scaled = self.train * 10.0 + self.val * 10.0 + self.test * 10.0;
        if (scaled - 10.0).abs() > Self::SCALED_TOLERANCE {
            return Err(ConfigError::RatioSum { sum: scaled / 10.0 });
        }
        Ok(())
    }
}

/// 各划分的数量.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitCounts {
    /// 训练集数量.
    pub train: usize,
    /// 验证集数量.
    pub val: usize,
    /// 测试集数量.
    pub test: usize,
}

/// 不可变的 key -> 划分映射. 每个 key 恰好出现一次.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitAssignment {
    map: BTreeMap<String, Split>,
}

impl SplitAssignment {
    /// 查询 `key` 的划分.
    #[inline]
    pub fn get(&self, key: &str) -> Option<Split> {
        self.map.get(key).copied()
    }

    /// key 总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// 是否没有任何 key?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// 按 key 升序迭代.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Split)> + '_ {
        self.map.iter().map(|(k, s)| (k.as_str(), *s))
    }

    /// 属于 `split` 的全部 key, 升序.
    pub fn keys_in(&self, split: Split) -> Vec<&str> {
        self.iter()
            .filter(|(_, s)| *s == split)
            .map(|(k, _)| k)
            .collect()
    }

    /// 各划分的数量.
    pub fn counts(&self) -> SplitCounts {
        self.map
            .values()
            .fold(SplitCounts::default(), |mut acc, s| {
                match s {
                    Split::Train => acc.train += 1,
                    Split::Val => acc.val += 1,
                    Split::Test => acc.test += 1,
                }
                acc
            })
    }
}

/// 把 `keys` 确定性地划分为三部分.
///
/// key 先排序去重, 再用 `seed` 初始化的 ChaCha8 打乱. 之后前 `floor(train * N)` 个进入训练集,
/// 接下来 `floor(val * N)` 个进入验证集, 其余进入测试集. 若 `test == 0`,
/// 取整剩下的 key 并入训练集.
///
/// 同样的 key 集合、比例、种子在任何平台上都得到同样的结果.
pub fn assign_splits<I, S>(
    keys: I,
    ratios: &SplitRatios,
    seed: u64,
) -> Result<SplitAssignment, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ratios.validate()?;

    let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
    keys.sort_unstable();
    keys.dedup();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    keys.shuffle(&mut rng);

    let n = keys.len();
    let train_count = ((ratios.train * n as f64).floor() as usize).min(n);
    let val_count = ((ratios.val * n as f64).floor() as usize).min(n - train_count);
    let test_split = if ratios.test == 0.0 {
        Split::Train
    } else {
        Split::Test
    };

    let map = keys
        .into_iter()
        .enumerate()
        .map(|(i, k)| {
            let split = if i < train_count {
                Split::Train
            } else if i < train_count + val_count {
                Split::Val
            } else {
                test_split
            };
            (k, split)
        })
        .collect();
    let ans = SplitAssignment { map };

    let c = ans.counts();
    log::info!(
        "划分 {n} 组配对 (seed = {seed}): train {}, val {}, test {}",
        c.train,
        c.val,
        c.test
    );
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratios(train: f64, val: f64, test: f64) -> SplitRatios {
        SplitRatios::new(train, val, test).unwrap()
    }

    #[test]
    fn test_every_key_exactly_once() {
        let keys: Vec<String> = (0..37).map(|i| format!("case_{i:03}")).collect();
        let a = assign_splits(keys.clone(), &SplitRatios::default(), 3).unwrap();
        assert_eq!(a.len(), 37);
        assert!(keys.iter().all(|k| a.get(k).is_some()));
        let c = a.counts();
        assert_eq!(c.train + c.val + c.test, 37);
        assert_eq!((c.train, c.val), (25, 7));
    }

    #[test]
    fn test_deterministic() {
        let keys = ["x", "y", "z", "w", "v", "u", "t"];
        let a = assign_splits(keys, &SplitRatios::default(), 99).unwrap();
        let b = assign_splits(keys, &SplitRatios::default(), 99).unwrap();
        assert_eq!(a, b);

        // 输入顺序不影响结果.
        let mut rev = keys;
        rev.reverse();
        assert_eq!(a, assign_splits(rev, &SplitRatios::default(), 99).unwrap());
    }

    #[test]
    fn test_remainder_folds_into_train_without_test() {
        let a = assign_splits(["a", "b", "c", "d", "e", "f"], &ratios(0.5, 0.5, 0.0), 1).unwrap();
        assert_eq!(a.counts(), SplitCounts { train: 3, val: 3, test: 0 });

        let a = assign_splits(["a", "b", "c", "d", "e"], &ratios(0.5, 0.5, 0.0), 1).unwrap();
        assert_eq!(a.counts(), SplitCounts { train: 3, val: 2, test: 0 });
    }

    #[test]
    fn test_golden_split() {
        let a = assign_splits(["a", "b", "c", "d"], &ratios(0.5, 0.5, 0.0), 42).unwrap();
        assert_eq!(a.keys_in(Split::Train), vec!["a", "c"]);
        assert_eq!(a.keys_in(Split::Val), vec!["b", "d"]);
        assert!(a.keys_in(Split::Test).is_empty());

        let a = assign_splits(["a", "b", "c", "d", "e"], &SplitRatios::default(), 7).unwrap();
        assert_eq!(a.keys_in(Split::Train), vec!["c", "d", "e"]);
        assert_eq!(a.keys_in(Split::Val), vec!["a"]);
        assert_eq!(a.keys_in(Split::Test), vec!["b"]);
    }

    #[test]
    fn test_invalid_ratios() {
        assert!(matches!(
            SplitRatios::new(0.3, 0.3, 0.3),
            Err(ConfigError::RatioSum { .. })
        ));
        assert!(matches!(
            SplitRatios::new(1.2, -0.2, 0.0),
            Err(ConfigError::InvalidRatio(_))
        ));
        assert!(SplitRatios::new(0.7, 0.2, 0.1).is_ok());
        assert!(SplitRatios::new(1.0, 0.0, 0.0).is_ok());

        let bad = SplitRatios {
            train: 0.3,
            val: 0.3,
            test: 0.3,
        };
        assert!(assign_splits(["a"], &bad, 0).is_err());
    }

    #[test]
    fn test_empty_and_folding() {
        let a = assign_splits(Vec::<String>::new(), &SplitRatios::default(), 0).unwrap();
        assert!(a.is_empty());

        let fold = SplitFolding::FoldValIntoTrain;
        assert_eq!(fold.apply(Split::Val), Split::Train);
        assert_eq!(fold.apply(Split::Test), Split::Test);
        assert_eq!(SplitFolding::Identity.apply(Split::Val), Split::Val);
    }
}
