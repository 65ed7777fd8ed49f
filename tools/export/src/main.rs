//! 成对医学影像的划分与导出工具.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use log::LevelFilter;
use seg_berry::adapter::AdapterKind;
use seg_berry::data::{CropSpec, CtWindow};
use seg_berry::Rgb;

mod result;
mod runner;

/// 把成对的扫描与分割标签划分为 train / val / test, 并导出为训练数据集格式.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// 输入目录. 缺省时依次使用配置文件, `$SEG_BERRY_INPUT_DIR`, `$HOME/dataset/pairs`.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// 输出目录. 缺省时依次使用配置文件, `$SEG_BERRY_OUTPUT_DIR`, `$HOME/dataset/export`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON 配置文件. 命令行参数优先于配置文件.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 输出格式: polygon, huggingface, nnunet.
    #[arg(short, long)]
    pub adapter: Option<AdapterKind>,

    /// 工作线程数.
    #[arg(short = 'j', long, env = "SEG_BERRY_WORKERS")]
    pub workers: Option<usize>,

    /// 训练集比例.
    #[arg(long)]
    pub train: Option<f64>,

    /// 验证集比例.
    #[arg(long)]
    pub val: Option<f64>,

    /// 测试集比例.
    #[arg(long)]
    pub test: Option<f64>,

    /// 划分随机种子.
    #[arg(long)]
    pub seed: Option<u64>,

    /// 调色板随机种子.
    #[arg(long)]
    pub palette_seed: Option<u64>,

    /// 裁剪区域 `x,y,width,height`.
    #[arg(long, value_parser = parse_crop)]
    pub crop: Option<CropSpec>,

    /// 压缩系数.
    #[arg(long)]
    pub compress: Option<u32>,

    /// 颜色替换 `r,g,b=r,g,b`, 可重复.
    #[arg(long = "change-colour", value_parser = parse_colour_change)]
    pub colour_changes: Vec<(Rgb, Rgb)>,

    /// 扫描灰度窗口 `level,width`.
    #[arg(long, value_parser = parse_window)]
    pub window: Option<CtWindow>,

    /// 多边形最少顶点数 (仅 polygon).
    #[arg(long)]
    pub min_polygons: Option<u64>,

    /// 单个成对文件的时间预算 (秒).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// 扫描文件后缀, 可重复.
    #[arg(long = "scan-suffix")]
    pub scan_suffixes: Vec<String>,

    /// 标签文件后缀, 可重复.
    #[arg(long = "label-suffix")]
    pub label_suffixes: Vec<String>,

    /// 有成对文件导出失败时以非零状态退出.
    #[arg(long)]
    pub strict: bool,

    /// 更详细的日志, 可重复.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// 只输出错误日志.
    #[arg(short, long)]
    pub quiet: bool,

    /// 直接指定日志级别 (off, error, warn, info, debug, trace). 优先于 `-v` / `-q`.
    #[arg(long, value_parser = parse_level)]
    pub log_level: Option<LevelFilter>,
}

impl Args {
    fn log_level(&self) -> LevelFilter {
        if let Some(l) = self.log_level {
            return l;
        }
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn split_numbers<T: std::str::FromStr>(s: &str, n: usize) -> Result<Vec<T>, String> {
    let ans = s
        .split(',')
        .map(|p| p.trim().parse::<T>().map_err(|_| format!("无法解析 `{p}`")))
        .collect::<Result<Vec<_>, _>>()?;
    if ans.len() != n {
        return Err(format!("需要 {n} 个逗号分隔的数, 得到 `{s}`"));
    }
    Ok(ans)
}

fn parse_crop(s: &str) -> Result<CropSpec, String> {
    let v = split_numbers::<u32>(s, 4)?;
    Ok(CropSpec {
        x: v[0],
        y: v[1],
        width: v[2],
        height: v[3],
    })
}

fn parse_rgb(s: &str) -> Result<Rgb, String> {
    let v = split_numbers::<u8>(s, 3)?;
    Ok([v[0], v[1], v[2]])
}

fn parse_colour_change(s: &str) -> Result<(Rgb, Rgb), String> {
    let (old, new) = s
        .split_once('=')
        .ok_or_else(|| format!("颜色替换应形如 `r,g,b=r,g,b`, 得到 `{s}`"))?;
    Ok((parse_rgb(old)?, parse_rgb(new)?))
}

fn parse_window(s: &str) -> Result<CtWindow, String> {
    let v = split_numbers::<f32>(s, 2)?;
    CtWindow::new(v[0], v[1]).ok_or_else(|| format!("非法窗口 `{s}`"))
}

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    s.parse().map_err(|_| format!("未知的日志级别 `{s}`"))
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(args.log_level())
        .init()
    {
        eprintln!("日志初始化失败: {e}");
    }

    let options = match runner::options_from(&args) {
        Ok(o) => o,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(2);
        }
    };
    match runner::run(&options) {
        Ok(report) => {
            result::analyze(&report);
            if args.strict && !report.is_clean() {
                ExitCode::from(3)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            log::error!("导出失败: {e}");
            ExitCode::FAILURE
        }
    }
}
