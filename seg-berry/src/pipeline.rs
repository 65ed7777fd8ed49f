//! 完整的导出流程.
//!
//! 配置检查 -> 成对文件发现 -> 划分 (一次, 同步) -> 并行处理与写出 -> 清单 (若有).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapter::{AdapterKind, AdapterKwargs, ManifestSpec};
use crate::consts::{DEFAULT_SEED, PALETTE_SEED};
use crate::data::{
    AutoScanDecoder, ColourRemap, CtWindow, DicomScanDecoder, LabelPalette, NiftiScanDecoder,
    Preprocess,
};
use crate::dataset::{
    assign_splits, discover_pairs, FilePair, PairLayout, PairProcessor, ProcessParams,
    SplitAssignment, SplitRatios,
};
use crate::error::{ExportError, JobError};
use crate::executor::{AdapterJobSpec, CancelToken, JobOutcome, ParallelExecutor};

/// 一次导出的全部配置.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExportOptions {
    /// 输入目录.
    pub input_dir: PathBuf,
    /// 输出目录.
    pub output_dir: PathBuf,
    /// 输出格式.
    pub adapter: AdapterKind,
    /// 工作线程数.
    pub workers: usize,
    /// 划分比例.
    pub ratios: SplitRatios,
    /// 划分随机种子.
    pub seed: u64,
    /// 调色板随机种子.
    pub palette_seed: u64,
    /// 颜色替换.
    pub colour_changes: ColourRemap,
    /// 裁剪与压缩.
    pub preprocess: Preprocess,
    /// 适配器专用参数.
    pub kwargs: AdapterKwargs,
    /// 单个任务的时间预算 (秒).
    pub job_timeout_secs: Option<u64>,
    /// 成对文件命名约定.
    pub layout: PairLayout,
    /// 扫描灰度窗口. `None` 时使用文件自带窗口或最小、最大值.
    pub window: Option<CtWindow>,
    /// NNUNet 清单描述.
    pub manifest: ManifestSpec,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            adapter: AdapterKind::Huggingface,
            workers: std::thread::available_parallelism().map_or(1, usize::from),
            ratios: SplitRatios::default(),
            seed: DEFAULT_SEED,
            palette_seed: PALETTE_SEED,
            colour_changes: ColourRemap::default(),
            preprocess: Preprocess::default(),
            kwargs: AdapterKwargs::default(),
            job_timeout_secs: None,
            layout: PairLayout::default(),
            window: None,
            manifest: ManifestSpec::default(),
        }
    }
}

/// 一次导出的报告.
#[derive(Debug)]
pub struct ExportReport {
    /// 输出格式.
    pub adapter: AdapterKind,
    /// 划分结果.
    pub assignment: SplitAssignment,
    /// 成功的任务, 按 key 升序.
    pub outcomes: Vec<JobOutcome>,
    /// 失败的任务, 按 key 升序.
    pub failures: Vec<(String, JobError)>,
    /// 不完整的成对文件.
    pub incomplete: Vec<FilePair>,
    /// 清单文件路径.
    pub manifest: Option<PathBuf>,
}

/// 报告的数量统计.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// 参与划分的成对文件数.
    pub pairs: usize,
    /// 成功数.
    pub succeeded: usize,
    /// 失败数.
    pub failed: usize,
    /// 不完整的成对文件数.
    pub incomplete: usize,
    /// 写出的帧数.
    pub frames: usize,
    /// 写出的文件数.
    pub files: usize,
    /// 训练集成对文件数.
    pub train: usize,
    /// 验证集成对文件数.
    pub val: usize,
    /// 测试集成对文件数.
    pub test: usize,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pairs (train {}, val {}, test {}): {} ok, {} failed, {} incomplete; {} frames, {} files",
            self.pairs,
            self.train,
            self.val,
            self.test,
            self.succeeded,
            self.failed,
            self.incomplete,
            self.frames,
            self.files
        )
    }
}

impl ExportReport {
    /// 数量统计.
    pub fn summary(&self) -> ExportSummary {
        let c = self.assignment.counts();
        ExportSummary {
            pairs: self.assignment.len(),
            succeeded: self.outcomes.len(),
            failed: self.failures.len(),
            incomplete: self.incomplete.len(),
            frames: self.outcomes.iter().map(|o| o.frames).sum(),
            files: self.outcomes.iter().map(|o| o.files).sum(),
            train: c.train,
            val: c.val,
            test: c.test,
        }
    }

    /// 是否所有成对文件都成功导出?
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 执行一次导出.
#[inline]
pub fn run_export(options: &ExportOptions) -> Result<ExportReport, ExportError> {
    run_export_with(options, &CancelToken::new())
}

/// 执行一次导出, 并接受外部的取消信号.
///
/// 配置错误在任何 I/O 之前返回. 单个成对文件的失败记录在报告中.
/// 只有配置非法, 输入目录无法读取, 没有任何完整成对文件, 输出目录无法创建,
/// 或清单生成失败时才返回 `Err`.
pub fn run_export_with(
    options: &ExportOptions,
    cancel: &CancelToken,
) -> Result<ExportReport, ExportError> {
    options.ratios.validate()?;
    options.preprocess.validate()?;
    options.layout.validate()?;
    let executor = ParallelExecutor::new(options.workers)?
        .with_cancel_token(cancel.clone())
        .with_budget(options.job_timeout_secs.map(Duration::from_secs));

    let discovery = discover_pairs(&options.input_dir, &options.layout)?;
    if discovery.complete.is_empty() {
        return Err(ExportError::NoPairs(options.input_dir.clone()));
    }
    let assignment = assign_splits(discovery.keys(), &options.ratios, options.seed)?;

    let palette = LabelPalette::new(options.palette_seed);
    let processor = PairProcessor::new(palette.clone()).with_scan_decoder(AutoScanDecoder {
        nifti: NiftiScanDecoder {
            window: options.window,
        },
        dicom: DicomScanDecoder {
            window: options.window,
        },
    });
    let adapter = options.adapter.build(&palette, &options.manifest);
    adapter
        .prepare(&options.output_dir)
        .map_err(ExportError::Prepare)?;

    let params = ProcessParams {
        preprocess: options.preprocess,
        remap: options.colour_changes.clone(),
    };
    let jobs: Vec<AdapterJobSpec<'_>> = discovery
        .complete
        .iter()
        .filter_map(|pair| {
            let split = assignment.get(&pair.key)?;
            Some(AdapterJobSpec {
                pair: pair.clone(),
                split,
                output_dir: &options.output_dir,
                params: &params,
                kwargs: &options.kwargs,
                frame_mode: adapter.frame_mode(),
            })
        })
        .collect();

    let results = executor.run(&jobs, &processor, adapter.as_ref())?;
    let mut outcomes = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(o) => outcomes.push(o),
            Err(e) => failures.push((job.pair.key.clone(), e)),
        }
    }

    let manifest = adapter
        .finish(&options.output_dir, &assignment)
        .map_err(|e| {
            log::error!("{} 清单生成失败: {e}", adapter.kind());
            e
        })?;
    if let Some(p) = manifest.as_ref() {
        log::info!("清单已写出: {}", p.display());
    }

    let report = ExportReport {
        adapter: options.adapter,
        assignment,
        outcomes,
        failures,
        incomplete: discovery.incomplete,
        manifest,
    };
    log::info!("{}: {}", report.adapter, report.summary());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_config_errors_before_io() {
        // 输入目录不存在, 但比例非法先被发现.
        let options = ExportOptions {
            input_dir: PathBuf::from("/definitely/not/here"),
            ratios: SplitRatios {
                train: 0.3,
                val: 0.3,
                test: 0.3,
            },
            ..ExportOptions::default()
        };
        assert!(matches!(
            run_export(&options),
            Err(ExportError::Config(ConfigError::RatioSum { .. }))
        ));

        let options = ExportOptions {
            input_dir: PathBuf::from("/definitely/not/here"),
            workers: 0,
            ..ExportOptions::default()
        };
        assert!(matches!(
            run_export(&options),
            Err(ExportError::Config(ConfigError::ZeroWorkers))
        ));
    }

    #[test]
    fn test_no_pairs() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("lonely.dcm"), b"").unwrap();
        let options = ExportOptions {
            input_dir: input.path().to_owned(),
            output_dir: output.path().to_owned(),
            ..ExportOptions::default()
        };
        assert!(matches!(run_export(&options), Err(ExportError::NoPairs(_))));
    }

    #[test]
    fn test_summary_display() {
        let s = ExportSummary {
            pairs: 5,
            succeeded: 4,
            failed: 1,
            train: 3,
            val: 1,
            test: 1,
            ..ExportSummary::default()
        };
        assert_eq!(
            s.to_string(),
            "5 pairs (train 3, val 1, test 1): 4 ok, 1 failed, 0 incomplete; 0 frames, 0 files"
        );
    }
}
