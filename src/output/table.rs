#![forbid(unsafe_code)]

use std::io;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Right,
}

/// Plain aligned table for non-interactive output, with a CSV twin.
#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    align: Vec<Align>,
    max_width: Option<usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        Self {
            align: vec![Align::Left; headers.len()],
            headers,
            max_width: None,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn align(mut self, column: usize, align: Align) -> Self {
        if column >= self.align.len() {
            self.align.resize(column + 1, Align::Left);
        }
        self.align[column] = align;
        self
    }

    /// Cells wider than this are cut and end in `…`. Text output only.
    #[must_use]
    pub fn max_width(mut self, width: usize) -> Self {
        self.max_width = Some(width.max(2));
        self
    }

    pub fn row(&mut self, cols: impl IntoIterator<Item = impl Into<String>>) {
        self.rows.push(cols.into_iter().map(Into::into).collect());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self) -> io::Result<()> {
        self.write_to(io::stdout().lock())
    }

    pub fn print_csv(&self) -> io::Result<()> {
        self.write_csv_to(io::stdout().lock())
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn write_csv_to(&self, out: impl io::Write) -> io::Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_to(&self, mut out: impl io::Write) -> io::Result<()> {
        let cells: Vec<Vec<String>> = std::iter::once(&self.headers)
            .chain(&self.rows)
            .map(|row| row.iter().map(|c| self.clip(c)).collect())
            .collect();

        let cols = cells.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0usize; cols];
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(visible_width(cell));
            }
        }

        for row in &cells {
            writeln!(out, "{}", self.format_row(row, &widths))?;
        }
        Ok(())
    }

    fn clip(&self, cell: &str) -> String {
        match self.max_width {
            Some(max) if visible_width(cell) > max => {
                let mut s: String = cell.chars().take(max - 1).collect();
                s.push('…');
                s
            }
            _ => cell.to_owned(),
        }
    }

    fn format_row(&self, row: &[String], widths: &[usize]) -> String {
        let mut out = String::new();
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            let pad = widths[i].saturating_sub(visible_width(cell));
            let last = i + 1 == row.len();
            match self.align.get(i).copied().unwrap_or_default() {
                Align::Left => {
                    out.push_str(cell);
                    if !last {
                        out.extend(std::iter::repeat_n(' ', pad));
                    }
                }
                Align::Right => {
                    out.extend(std::iter::repeat_n(' ', pad));
                    out.push_str(cell);
                }
            }
        }
        out
    }
}

fn visible_width(s: &str) -> usize {
    s.chars().count()
}
