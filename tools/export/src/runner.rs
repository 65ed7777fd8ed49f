//! 程序运行函数.

use std::fs;
use std::path::Path;

use seg_berry::data::ColourRemap;
use seg_berry::{run_export, ExportError, ExportOptions, ExportReport};
use utils::loader;

use crate::Args;

/// 读取 JSON 配置文件. 缺省字段取默认值.
fn load_config(path: &Path) -> Result<ExportOptions, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("无法读取配置文件 `{}`: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("配置文件 `{}` 格式错误: {e}", path.display()))
}

/// 合并配置文件与命令行参数. 命令行参数优先.
pub fn options_from(args: &Args) -> Result<ExportOptions, String> {
    let mut o = match &args.config {
        Some(p) => load_config(p)?,
        None => ExportOptions {
            workers: utils::cpus(),
            ..ExportOptions::default()
        },
    };

    if let Some(i) = &args.input {
        o.input_dir = i.clone();
    } else if o.input_dir.as_os_str().is_empty() {
        o.input_dir = loader::input_dir_from_env_or_home().ok_or("无法确定输入目录")?;
    }
    if let Some(d) = &args.output {
        o.output_dir = d.clone();
    } else if o.output_dir.as_os_str().is_empty() {
        o.output_dir = loader::output_dir_from_env_or_home().ok_or("无法确定输出目录")?;
    }

    if let Some(a) = args.adapter {
        o.adapter = a;
    }
    if let Some(n) = args.workers {
        o.workers = n;
    }
    if let Some(t) = args.train {
        o.ratios.train = t;
    }
    if let Some(v) = args.val {
        o.ratios.val = v;
    }
    if let Some(t) = args.test {
        o.ratios.test = t;
    }
    if let Some(s) = args.seed {
        o.seed = s;
    }
    if let Some(s) = args.palette_seed {
        o.palette_seed = s;
    }
    if args.crop.is_some() {
        o.preprocess.crop = args.crop;
    }
    if let Some(c) = args.compress {
        o.preprocess.compress = c;
    }
    if !args.colour_changes.is_empty() {
        o.colour_changes = ColourRemap(args.colour_changes.clone());
    }
    if args.window.is_some() {
        o.window = args.window;
    }
    if let Some(n) = args.min_polygons {
        o.kwargs.insert("min_polygons", n);
    }
    if args.timeout.is_some() {
        o.job_timeout_secs = args.timeout;
    }
    if !args.scan_suffixes.is_empty() {
        o.layout.scan_suffixes = args.scan_suffixes.clone();
    }
    if !args.label_suffixes.is_empty() {
        o.layout.label_suffixes = args.label_suffixes.clone();
    }
    Ok(o)
}

/// 实际运行.
pub fn run(options: &ExportOptions) -> Result<ExportReport, ExportError> {
    log::info!(
        "导出 `{}` -> `{}` ({}, {} 个工作线程)",
        options.input_dir.display(),
        options.output_dir.display(),
        options.adapter,
        options.workers
    );
    run_export(options)
}
