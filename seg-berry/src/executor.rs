//! 并行任务执行.
//!
//! 每个成对文件对应一个任务: 解码处理, 然后交给输出适配器写盘.
//! 任务之间没有共享的可变状态, 写出的文件互不相交, 因此可以以任意顺序完成.
//! 单个任务的失败 (包括 panic) 只记录在结果中, 不会中断其它任务.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapter::{AdapterKwargs, FrameMode, OutputAdapter};
use crate::dataset::{FilePair, PairProcessor, ProcessParams, Split};
use crate::error::{ConfigError, ExportError, JobError};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 取消信号. 可以克隆后交给其它线程.
///
/// 收到信号后, 尚未开始的任务以 [`JobError::Cancelled`] 结束, 已经开始的任务正常完成.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// 新的未取消信号.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 发出取消信号.
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// 是否已取消?
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 单个任务的时间预算.
#[derive(Copy, Clone, Debug)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// 从现在开始计时.
    #[inline]
    pub fn start(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// 没有预算限制.
    #[inline]
    pub fn unlimited() -> Self {
        Self::start(None)
    }

    /// 已用时间.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 用完预算时返回 [`JobError::TimedOut`].
    #[inline]
    pub fn check(&self) -> Result<(), JobError> {
        match self.budget {
            Some(budget) if self.elapsed() >= budget => Err(JobError::TimedOut { budget }),
            _ => Ok(()),
        }
    }
}

/// 一个任务需要的全部输入.
#[derive(Clone, Debug)]
pub struct AdapterJobSpec<'a> {
    /// 成对文件 (含输入路径).
    pub pair: FilePair,
    /// 该成对文件的划分.
    pub split: Split,
    /// 输出根目录.
    pub output_dir: &'a Path,
    /// 裁剪、压缩与颜色替换.
    pub params: &'a ProcessParams,
    /// 适配器专用参数.
    pub kwargs: &'a AdapterKwargs,
    /// 逐帧还是整体积写出.
    pub frame_mode: FrameMode,
}

/// 成功任务的结果.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobOutcome {
    /// 配对 key.
    pub key: String,
    /// 划分.
    pub split: Split,
    /// 写出的帧数.
    pub frames: usize,
    /// 因标签为空而丢弃的帧数.
    pub dropped: usize,
    /// 写出的文件数.
    pub files: usize,
    /// 耗时.
    pub elapsed: Duration,
}

/// 单个任务的结果.
pub type JobResult = Result<JobOutcome, JobError>;

/// 固定线程数的执行器.
#[derive(Clone, Debug)]
pub struct ParallelExecutor {
    workers: usize,
    cancel: CancelToken,
    budget: Option<Duration>,
}

impl ParallelExecutor {
    /// 以 `workers` 个工作线程构造. `workers` 不能为 0.
    pub fn new(workers: usize) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(Self {
            workers,
            cancel: CancelToken::new(),
            budget: None,
        })
    }

    /// 使用外部的取消信号.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// 设置单个任务的时间预算.
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget = budget;
        self
    }

    /// 工作线程数.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 取消信号.
    #[inline]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// 执行所有任务. 每个任务恰好尝试一次, 结果按 `jobs` 的顺序返回.
    ///
    /// 只有线程池本身无法建立时才返回 `Err`.
    pub fn run(
        &self,
        jobs: &[AdapterJobSpec<'_>],
        processor: &PairProcessor,
        adapter: &dyn OutputAdapter,
    ) -> Result<Vec<JobResult>, ExportError> {
        log::info!(
            "开始执行 {} 个 {} 任务, {} 个工作线程",
            jobs.len(),
            adapter.kind(),
            self.workers
        );

        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(self.workers)
                    .thread_name(|i| format!("seg-berry-{i}"))
                    .build()
                    .map_err(|e| ExportError::Pool(e.to_string()))?;
                let results = pool.install(|| {
                    jobs.par_iter()
                        .map(|job| self.run_one(job, processor, adapter))
                        .collect::<Vec<_>>()
                });
            } else {
                let results = jobs
                    .iter()
                    .map(|job| self.run_one(job, processor, adapter))
                    .collect::<Vec<_>>();
            }
        }
        Ok(results)
    }

    fn run_one(
        &self,
        job: &AdapterJobSpec<'_>,
        processor: &PairProcessor,
        adapter: &dyn OutputAdapter,
    ) -> JobResult {
        let key = job.pair.key.as_str();
        if self.cancel.is_cancelled() {
            log::debug!("{key}: 已取消");
            return Err(JobError::Cancelled);
        }

        let deadline = Deadline::start(self.budget);
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> JobResult {
            let processed = processor.process(&job.pair, job.split, job.params)?;
            deadline.check()?;
            let summary = adapter.write(&processed, job.kwargs, job.output_dir, &deadline)?;
            Ok(JobOutcome {
                key: processed.key,
                split: processed.split,
                frames: summary.frames,
                dropped: processed.dropped,
                files: summary.files.len(),
                elapsed: deadline.elapsed(),
            })
        }));
        let result =
            attempt.unwrap_or_else(|payload| Err(JobError::Panicked(panic_message(&*payload))));

        match &result {
            Ok(o) => log::info!(
                "{key} ({}, {:?}): 写出 {} 帧, {} 个文件, 用时 {:?}",
                o.split,
                job.frame_mode,
                o.frames,
                o.files,
                o.elapsed
            ),
            Err(e) => log::warn!("{key} ({}): 处理失败: {e}", job.split),
        }
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
