//! Terminal UI utilities.
//!
//! `Table` renders rows inside Unicode box-drawing borders, shrinking the
//! widest columns until the table fits the terminal.

use crate::deps::{InstallState, ListEntry};
use crate::lock::Pin;
use crate::vcs::short_hash;
use colored::*;
use console::{measure_text_width, truncate_str};

/// Columns are never squeezed below this many characters.
const MIN_COLUMN: usize = 8;

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are ignored.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    fn column_widths(&self, max_width: usize) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| measure_text_width(h)).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(measure_text_width(&sanitize(cell)));
            }
        }

        let overhead = 3 + 3 * self.headers.len();
        let available = max_width.saturating_sub(overhead);
        while widths.iter().sum::<usize>() > available {
            let Some(widest) = widths
                .iter_mut()
                .filter(|w| **w > MIN_COLUMN)
                .max_by_key(|w| **w)
            else {
                break;
            };
            *widest -= 1;
        }
        widths
    }

    /// Render for a terminal `max_width` columns wide.
    pub fn render(&self, max_width: usize) -> String {
        if self.headers.is_empty() {
            return String::new();
        }
        let widths = self.column_widths(max_width);

        let border = |left: &str, mid: &str, right: &str| {
            let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {}{}{}\n", left, segments.join(mid), right)
        };
        let line = |cells: Vec<String>| {
            let mut out = String::from("  │");
            for (cell, width) in cells.iter().zip(&widths) {
                let padding = width.saturating_sub(measure_text_width(cell));
                out.push_str(&format!(" {}{} │", cell, " ".repeat(padding)));
            }
            out.push('\n');
            out
        };

        let mut out = border("┌", "┬", "┐");
        out.push_str(&line(
            self.headers
                .iter()
                .zip(&widths)
                .map(|(h, w)| truncate_str(h, *w, "...").bold().to_string())
                .collect(),
        ));
        out.push_str(&border("├", "┼", "┤"));
        for row in &self.rows {
            out.push_str(&line(
                row.iter()
                    .zip(&widths)
                    .map(|(cell, w)| truncate_str(&sanitize(cell), *w, "...").into_owned())
                    .collect(),
            ));
        }
        out.push_str(&border("└", "┴", "┘"));
        out
    }

    pub fn print(&self) {
        let (_rows, cols) = console::Term::stdout().size();
        print!("{}", self.render(cols as usize));
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            _ => c,
        })
        .collect()
}

/// Table for `vend list`.
pub fn dependency_table(entries: &[ListEntry]) -> Table {
    let mut table = Table::new(&["Name", "Kind", "Specifier", "Locked", "Status"]);
    for entry in entries {
        let locked = match &entry.pin {
            Some(Pin::Commit(rev)) => short_hash(rev).to_string(),
            Some(pin) => pin.to_string(),
            None => "-".to_string(),
        };
        let status = match &entry.state {
            Some(InstallState::Installed(_)) => "installed".green().to_string(),
            Some(InstallState::NotInstalled) => "missing".yellow().to_string(),
            Some(InstallState::Corrupt) => "corrupt".red().to_string(),
            None => "invalid".red().to_string(),
        };
        table.add_row(vec![
            entry.name.clone(),
            entry.kind.label().to_string(),
            entry.specifier.clone(),
            locked,
            status,
        ]);
    }
    table
}
