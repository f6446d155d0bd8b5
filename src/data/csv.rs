/// Split CSV text into records.
///
/// Handles double-quoted fields with `""` escapes, commas and newlines inside
/// quotes, CRLF line endings and a leading UTF-8 BOM. Blank lines are skipped.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        push_record(&mut records, record);
    }
    records
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.len() == 1 && record[0].trim().is_empty();
    if !blank {
        records.push(record);
    }
}

/// Position of each `required` column in `header`, by exact trimmed name.
pub fn column_indices(header: &[String], required: &[&str]) -> Result<Vec<usize>, String> {
    required
        .iter()
        .map(|name| {
            header
                .iter()
                .position(|h| h.trim() == *name)
                .ok_or_else(|| format!("missing column '{}' (got {:?})", name, header))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_records() {
        let recs = parse_records("a,b,c\n1,2,3\n");
        assert_eq!(recs, vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]);
    }

    #[test]
    fn test_quoted_commas_newlines_and_escapes() {
        let recs = parse_records("id,desc\r\n1,\"x, \"\"y\"\"\nz\"\r\n2,plain");
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[1], vec!["1", "x, \"y\"\nz"]);
        assert_eq!(recs[2], vec!["2", "plain"]);
    }

    #[test]
    fn test_blank_lines_and_bom() {
        let recs = parse_records("\u{feff}h\n\n1\n   \n2");
        assert_eq!(recs, vec![vec!["h"], vec!["1"], vec!["2"]]);
    }

    #[test]
    fn test_leading_empty_index_column() {
        let recs = parse_records(",cve.id,epss\n0,CVE-1,0.1\n");
        assert_eq!(recs[0], vec!["", "cve.id", "epss"]);
        let idx = column_indices(&recs[0], &["cve.id", "epss"]).unwrap();
        assert_eq!(idx, vec![1, 2]);
    }

    #[test]
    fn test_missing_column_reported() {
        let header = vec!["cve.id".to_string()];
        let err = column_indices(&header, &["cve.id", "epss"]).unwrap_err();
        assert!(err.contains("epss"));
    }
}
