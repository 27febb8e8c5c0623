// ── DPC fallback rendering ──
//
// Which candidate port configuration is active, which higher-priority ones
// were skipped and why, and how many backups remain.

use std::io;

use crate::model::PortConfigList;
use crate::report::{Report, Severity};

/// Render the fallback lines for `list`.
///
/// `testing` switches the wording from "Using" to "Testing" while the
/// active configuration is still under test. An empty list renders
/// nothing.
pub fn fallback_lines(list: &PortConfigList, testing: bool) -> Vec<(Severity, String)> {
    let (upcase, downcase) = if testing {
        ("Testing", "testing")
    } else {
        ("Using", "using")
    };
    let entries = &list.port_config_list;
    let Some(first) = entries.first() else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    let Ok(current) = usize::try_from(list.current_index) else {
        lines.push((
            Severity::Warning,
            "Have no currently working DevicePortConfig".to_owned(),
        ));
        return lines;
    };

    if current == 0 {
        lines.push((
            Severity::Info,
            format!("{upcase} highest priority DevicePortConfig key {}", first.key),
        ));
        if entries.len() > 1 {
            lines.push((
                Severity::Info,
                format!("Have {} backup DevicePortConfig", entries.len() - 1),
            ));
        }
        return lines;
    }

    lines.push((
        Severity::Warning,
        format!(
            "Not {downcase} highest priority DevicePortConfig key {} due to {}",
            first.key,
            first.last_error()
        ),
    ));
    for (i, dpc) in entries.iter().enumerate().skip(1) {
        if i == current {
            lines.push((
                Severity::Info,
                format!("{upcase} priority {i} DevicePortConfig key {}", dpc.key),
            ));
            break;
        }
        lines.push((
            Severity::Warning,
            format!(
                "Not {downcase} priority {i} DevicePortConfig key {} due to {}",
                dpc.key,
                dpc.last_error()
            ),
        ));
    }
    if entries.len() - 1 > current {
        lines.push((
            Severity::Info,
            format!("Have {} backup DevicePortConfig", entries.len() - 1 - current),
        ));
    }
    lines
}

pub fn render(report: &mut Report, list: &PortConfigList, testing: bool) -> io::Result<()> {
    for (severity, line) in fallback_lines(list, testing) {
        report.line(severity, line)?;
    }
    Ok(())
}
