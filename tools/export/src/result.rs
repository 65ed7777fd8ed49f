//! 导出结果报告.

use std::io::{self, Write};

use seg_berry::ExportReport;

/// 将 `report` 的结果写进 `w` 中.
fn describe_into<W: Write>(report: &ExportReport, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    let s = report.summary();
    writeln!(w, "Export `{}`:", report.adapter)?;
    writeln!(w, "{S4}Pairs: {} (train {}, val {}, test {})", s.pairs, s.train, s.val, s.test)?;
    writeln!(w, "{S4}Succeeded: {}", s.succeeded)?;
    writeln!(w, "{S4}Failed: {}", s.failed)?;
    writeln!(w, "{S4}Incomplete: {}", s.incomplete)?;
    writeln!(w, "{S4}Frames written: {}", s.frames)?;
    writeln!(w, "{S4}Files written: {}", s.files)?;
    if let Some(m) = &report.manifest {
        writeln!(w, "{S4}Manifest: {}", m.display())?;
    }
    for (key, e) in &report.failures {
        writeln!(w, "{S4}[failed] {key}: {e}")?;
    }
    for pair in &report.incomplete {
        let missing = if pair.scan_path.is_none() { "scan" } else { "label" };
        writeln!(w, "{S4}[incomplete] {}: missing {missing}", pair.key)?;
    }
    let slowest = report.outcomes.iter().max_by_key(|o| o.elapsed);
    match slowest {
        Some(o) => write!(w, "{S4}Slowest pair `{}` costs {} ms", o.key, o.elapsed.as_millis()),
        None => write!(w, "{S4}Slowest pair: /"),
    }
}

/// 打印运行结果.
pub fn analyze(report: &ExportReport) {
    utils::sep();
    let mut buf = Vec::with_capacity(512);
    match describe_into(report, &mut buf) {
        Ok(()) => println!("{}", String::from_utf8_lossy(&buf)),
        Err(e) => log::error!("无法生成报告: {e}"),
    }
    utils::sep();
}
