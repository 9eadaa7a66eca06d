//! Styled terminal output helpers.

use std::io::{self, Write};

use console::style;

/// Print an info message to stderr.
pub fn info(message: &str) {
    eprintln!("{} {}", style("→").cyan(), message);
}

/// Print a success message to stderr.
pub fn success(message: &str) {
    eprintln!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message to stderr.
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message to stderr.
pub fn warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

/// Print a section title to stdout.
pub fn header(message: &str) {
    println!("\n{}", style(message).bold());
}

/// Print a dimmed, indented line to stdout.
pub fn dim(message: &str) {
    println!("  {}", style(message).dim());
}

/// Print a `key: value` line to stdout.
pub fn field(key: &str, value: impl std::fmt::Display) {
    println!("  {} {}", style(format!("{key}:")).dim(), value);
}

/// A markdown table builder.
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    alignments: Vec<Alignment>,
}

/// Column alignment.
#[derive(Clone, Copy, Default)]
pub enum Alignment {
    #[default]
    Left,
    Right,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| (*h).to_string()).collect(),
            rows: Vec::new(),
            alignments: vec![Alignment::Left; headers.len()],
        }
    }

    #[must_use]
    pub fn with_alignments(mut self, alignments: Vec<Alignment>) -> Self {
        self.alignments = alignments;
        self
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Render as a markdown table.
    pub fn render(&self) -> String {
        if self.headers.is_empty() {
            return String::new();
        }

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut output = String::new();

        output.push('|');
        for (header, &w) in self.headers.iter().zip(&widths) {
            output.push_str(&format!(" {header:^w$} |"));
        }
        output.push('\n');

        output.push('|');
        for (i, &w) in widths.iter().enumerate() {
            let sep = match self.alignments.get(i).copied().unwrap_or_default() {
                Alignment::Left => format!(":{:-<w$}|", "", w = w + 1),
                Alignment::Right => format!("{:-<w$}:|", "", w = w + 1),
            };
            output.push_str(&sep);
        }
        output.push('\n');

        for row in &self.rows {
            output.push('|');
            for (i, cell) in row.iter().enumerate() {
                let w = widths.get(i).copied().unwrap_or(0);
                let cell = match self.alignments.get(i).copied().unwrap_or_default() {
                    Alignment::Left => format!(" {cell:<w$} |"),
                    Alignment::Right => format!(" {cell:>w$} |"),
                };
                output.push_str(&cell);
            }
            output.push('\n');
        }

        output
    }

    pub fn print(&self) {
        print!("{}", self.render());
        let _ = io::stdout().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_render() {
        let mut table = Table::new(&["ps", "entry"])
            .with_alignments(vec![Alignment::Right, Alignment::Left]);
        table.add_row(vec!["0".to_string(), "0x218".to_string()]);
        table.add_row(vec!["12".to_string(), "none".to_string()]);

        let rendered = table.render();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "| ps | entry |");
        assert_eq!(lines[1], "|---:|:------|");
        assert_eq!(lines[2], "|  0 | 0x218 |");
        assert_eq!(lines[3], "| 12 | none  |");
    }

    #[test]
    fn test_empty_table() {
        assert!(Table::new(&[]).render().is_empty());
    }
}
