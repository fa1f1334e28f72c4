use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};

use crate::catalog::NOASSERTION;
use crate::models::PackageReport;

/// Render a colored terminal report.
pub fn render(
    reports: &[PackageReport],
    path: &Path,
    license_root: &Path,
    verbose: bool,
    quiet: bool,
) -> Result<()> {
    let total = reports.len();
    let resolved_count = reports.iter().filter(|r| r.is_resolved()).count();
    let unresolved_count = total - resolved_count;
    let file_count: usize = reports.iter().map(|r| r.licenses.len()).sum();

    if quiet {
        println!(
            "Packages: {}  Resolved: {}  Unresolved: {}",
            total,
            resolved_count.to_string().green(),
            unresolved_count.to_string().red(),
        );
        return Ok(());
    }

    println!(
        "\n {} v{}",
        "license-fetchr".bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!(" Scanning: {}", path.display());
    println!(" Licenses: {}\n", license_root.display());

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Packages      : {}", total));
    println!(" │  {:<48} │", format!("License files : {}", file_count));
    println!(
        " │  {:<48} │",
        format!(
            "{}  Resolved   : {:>4}  {}",
            "✓".green(),
            resolved_count,
            summarize_licenses(reports)
        )
    );
    println!(
        " │  {:<48} │",
        format!("{}  Unresolved : {:>4}", "✗".red(), unresolved_count)
    );
    println!(" └────────────────────────────────────────────────────┘\n");

    if unresolved_count > 0 {
        println!(" {} Packages requiring attention:\n", "[ERROR]".red().bold());
        render_table(reports.iter().filter(|r| !r.is_resolved()));
        println!();
    }

    if verbose && resolved_count > 0 {
        println!(" {} Resolved packages:\n", "[OK]".green().bold());
        render_table(reports.iter().filter(|r| r.is_resolved()));
        println!();
    }

    Ok(())
}

fn render_table<'a>(reports: impl Iterator<Item = &'a PackageReport>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("File").add_attribute(Attribute::Bold),
            Cell::new("SPDX").add_attribute(Attribute::Bold),
            Cell::new("Copyright / Error").add_attribute(Attribute::Bold),
        ]);

    for report in reports {
        if report.licenses.is_empty() {
            table.add_row(vec![
                Cell::new(&report.id),
                Cell::new(&report.version),
                Cell::new("-"),
                Cell::new(NOASSERTION).fg(comfy_table::Color::DarkGrey),
                Cell::new("no license declared").fg(comfy_table::Color::Red),
            ]);
            continue;
        }

        for license in &report.licenses {
            let spdx_color = if license.spdx_id == NOASSERTION {
                comfy_table::Color::DarkGrey
            } else {
                comfy_table::Color::Green
            };
            let detail = match &license.error {
                Some(error) => Cell::new(error).fg(comfy_table::Color::Red),
                None => {
                    let copyright = if license.copyright.is_empty() {
                        report.copyright.clone().unwrap_or_default()
                    } else {
                        license.copyright.join("\n")
                    };
                    Cell::new(copyright)
                }
            };

            table.add_row(vec![
                Cell::new(&report.id),
                Cell::new(&report.version),
                Cell::new(license.path.display()),
                Cell::new(&license.spdx_id).fg(spdx_color),
                detail,
            ]);
        }
    }

    println!("{}", table);
}

/// Top three identified licenses across resolved files, e.g. `[MIT (12), Apache-2.0 (4)]`.
fn summarize_licenses(reports: &[PackageReport]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for license in reports.iter().flat_map(|r| &r.licenses) {
        if license.is_resolved() {
            *counts.entry(license.spdx_id.as_str()).or_insert(0) += 1;
        }
    }

    let mut pairs: Vec<(&str, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let summary: Vec<String> = pairs
        .iter()
        .take(3)
        .map(|(lic, cnt)| format!("{} ({})", lic, cnt))
        .collect();

    if summary.is_empty() {
        String::new()
    } else {
        format!("[{}]", summary.join(", "))
    }
}
