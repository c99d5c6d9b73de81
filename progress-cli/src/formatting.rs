//! Console Output
//!
//! Progress banners around every sample and a summary per target: a table of
//! metric means when it worked, an explicit "Not Working" when it did not.

use colored::Colorize;
use comfy_table::{presets::ASCII_FULL, CellAlignment, Table};

/// Dash rule as wide as `title`
fn rule(title: &str) -> String {
    "-".repeat(title.chars().count())
}

/// Title and rule printed before a sample runs
pub fn sample_header(index: u32, samples: u32, name: &str) -> String {
    let title = format!("Sample #{index} (over {samples}) of {name}");
    format!("\n{}\n{}", title.yellow(), rule(&title).cyan())
}

/// Rule printed after a sample, whatever its outcome
pub fn sample_footer(index: u32, samples: u32, name: &str) -> String {
    let title = format!("Sample #{index} (over {samples}) of {name}");
    rule(&title).cyan().to_string()
}

/// Summary of a working target: `label | mean` rows with six decimals
pub fn working_summary(name: &str, samples: u32, rows: &[(String, f64)]) -> String {
    let title = format!("{name} over {samples} samples");

    let mut table = Table::new();
    table.load_preset(ASCII_FULL);
    for (label, mean) in rows {
        table.add_row(vec![label.clone(), format!("{mean:.6}")]);
    }
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }

    let body = if rows.is_empty() {
        String::new()
    } else {
        format!("{table}\n")
    };
    format!(
        "\n{}\n{}\n{}{}",
        title.green(),
        rule(&title).cyan(),
        body,
        rule(&title).cyan()
    )
}

/// Summary of a target with a failed sample
pub fn not_working_summary(name: &str, samples: u32) -> String {
    let title = format!("{name} over {samples} samples");
    format!(
        "\n{}\n{}\nNot Working\n{}",
        title.red(),
        rule(&title).cyan(),
        rule(&title).cyan()
    )
}

/// Table of what a run would do: id, name and sample count per target
pub fn plan(entries: &[(String, String, u32)]) -> String {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL);
    table.set_header(vec!["Target", "Name", "Samples"]);
    for (id, name, samples) in entries {
        table.add_row(vec![id.clone(), name.clone(), samples.to_string()]);
    }
    if let Some(column) = table.column_mut(2) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    format!("{table}\n{} target(s)", entries.len())
}
