use crate::sheet::{Cell, Worksheet};
use anyhow::{bail, Context};
use std::path::Path;

pub fn read_csv_file(path: &Path) -> anyhow::Result<Worksheet> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let text = String::from_utf8_lossy(&bytes);
    parse_csv(&text).with_context(|| format!("failed to parse {}", path.to_string_lossy()))
}

/// Parses a published-sheet CSV export. The first record is the header.
pub fn parse_csv(text: &str) -> anyhow::Result<Worksheet> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = split_records(text)?;
    while records
        .last()
        .map(|r| r.iter().all(|f| f.trim().is_empty()))
        .unwrap_or(false)
    {
        records.pop();
    }
    if records.is_empty() {
        bail!("csv has no header row");
    }

    let header = records.remove(0);
    let columns: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    if let Some(pos) = columns.iter().position(|c| c.is_empty()) {
        bail!("header column {} is blank", pos + 1);
    }

    let mut rows = Vec::with_capacity(records.len());
    for (i, rec) in records.into_iter().enumerate() {
        if rec.len() > columns.len() {
            bail!(
                "record {} has {} fields, header has {}",
                i + 2,
                rec.len(),
                columns.len()
            );
        }
        let mut row: Vec<Cell> = rec.iter().map(|f| to_cell(f)).collect();
        row.resize(columns.len(), Cell::Empty);
        rows.push(row);
    }
    Ok(Worksheet { columns, rows })
}

fn to_cell(field: &str) -> Cell {
    let t = field.trim();
    if t.is_empty() {
        return Cell::Empty;
    }
    match t.parse::<f64>() {
        Ok(v) if v.is_finite() => Cell::Number(v),
        _ => Cell::Text(t.to_string()),
    }
}

fn split_records(text: &str) -> anyhow::Result<Vec<Vec<String>>> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                line += 1;
            }
            _ => field.push(ch),
        }
    }
    if in_quotes {
        bail!("unterminated quoted field starting before line {}", line);
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

fn escape_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn export_csv(ws: &Worksheet) -> String {
    let mut out = String::new();
    let header: Vec<String> = ws.columns.iter().map(|c| escape_field(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &ws.rows {
        let fields: Vec<String> = row.iter().map(|c| escape_field(&c.text())).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_numbers_and_blanks() {
        let ws = parse_csv("class_no,student_id,math_a,math_b\r\n1,101,40,\r\n2,102,35.5,12\r\n\r\n")
            .expect("parse");
        assert_eq!(ws.columns, vec!["class_no", "student_id", "math_a", "math_b"]);
        assert_eq!(ws.rows.len(), 2);
        assert_eq!(ws.rows[0][3], Cell::Empty);
        assert_eq!(ws.rows[1][2], Cell::Number(35.5));
    }

    #[test]
    fn quoted_fields_keep_commas_and_quotes() {
        let ws = parse_csv("\u{feff}student_id,first_name\n1,\"Lee, \"\"Ann\"\"\"\n").expect("parse");
        assert_eq!(ws.columns[0], "student_id");
        assert_eq!(ws.rows[0][1], Cell::Text("Lee, \"Ann\"".into()));
    }

    #[test]
    fn short_rows_are_padded_long_rows_rejected() {
        let ws = parse_csv("a,b,c\n1\n").expect("parse");
        assert_eq!(ws.rows[0], vec![Cell::Number(1.0), Cell::Empty, Cell::Empty]);
        assert!(parse_csv("a,b\n1,2,3\n").is_err());
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(parse_csv("").is_err());
        assert!(parse_csv("a,,c\n").is_err());
        assert!(parse_csv("a\n\"open\n").is_err());
    }

    #[test]
    fn export_then_parse_preserves_cells() {
        let ws = parse_csv("student_id,first_name,math_a\n1,\"Lee, Ann\",40\n2,Bo,\n").expect("parse");
        let again = parse_csv(&export_csv(&ws)).expect("reparse");
        assert_eq!(again, ws);
    }
}
