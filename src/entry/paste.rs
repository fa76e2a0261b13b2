use super::model::Subject;
use serde::Serialize;
use std::num::IntErrorKind;
use tracing::debug;

/// One resolved pasted line: `values[i]` holds `[correct, wrong, empty]` for
/// the i-th subject in entry order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPasteRow {
    pub line: usize,
    pub student_id: String,
    pub values: Vec<[i64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PasteWarning {
    UnmatchedStudent { line: usize, token: String },
    ShortRow { line: usize, expected: usize, found: usize },
    ExtraColumns { line: usize, expected: usize, found: usize },
    NonNumeric { line: usize, column: usize, text: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PasteImport {
    pub rows: Vec<ParsedPasteRow>,
    pub warnings: Vec<PasteWarning>,
}

impl PasteImport {
    pub fn unmatched_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, PasteWarning::UnmatchedStudent { .. }))
            .count()
    }
}

/// Parses a count typed or pasted into a cell.
///
/// Blank text is 0. Returns `None` for anything that is not an integer; callers
/// treat that as 0 as well.
pub fn parse_count(text: &str) -> Option<i64> {
    let t = text.trim();
    if t.is_empty() {
        return Some(0);
    }
    match t.parse::<i64>() {
        Ok(v) => Some(v),
        // Integers too wide for i64 are still integers; saturate so the
        // validator reports them as out of range.
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

/// Counts the non-blank lines of a pasted block.
pub fn count_lines(raw: &str) -> usize {
    raw.split('\n').filter(|l| !l.trim().is_empty()).count()
}

/// Best-effort parse of a tab/newline-delimited block.
///
/// Each non-blank line is `student<TAB>c1<TAB>w1<TAB>e1<TAB>c2...`. Lines whose
/// first column does not resolve are dropped, short lines are zero-filled and
/// non-numeric cells become 0; each of these is recorded as a warning. Never
/// fails.
pub fn parse<F>(raw: &str, subjects: &[Subject], resolve: F) -> PasteImport
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = PasteImport::default();
    let expected = subjects.len() * 3;

    for (i, raw_line) in raw.split('\n').enumerate() {
        let line_no = i + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.trim().is_empty() {
            continue;
        }

        let mut cols = line.split('\t');
        let token = cols.next().unwrap_or("").trim();
        let Some(student_id) = resolve(token) else {
            debug!(line = line_no, token, "paste row skipped: student not matched");
            out.warnings.push(PasteWarning::UnmatchedStudent {
                line: line_no,
                token: token.to_string(),
            });
            continue;
        };

        let cells: Vec<&str> = cols.collect();
        if cells.len() < expected {
            out.warnings.push(PasteWarning::ShortRow {
                line: line_no,
                expected,
                found: cells.len(),
            });
        } else if cells.len() > expected {
            out.warnings.push(PasteWarning::ExtraColumns {
                line: line_no,
                expected,
                found: cells.len(),
            });
        }

        let mut values = vec![[0i64; 3]; subjects.len()];
        for (c, text) in cells.iter().take(expected).enumerate() {
            let v = match parse_count(text) {
                Some(v) => v,
                None => {
                    out.warnings.push(PasteWarning::NonNumeric {
                        line: line_no,
                        // Column 1 is the student token.
                        column: c + 2,
                        text: text.trim().to_string(),
                    });
                    0
                }
            };
            values[c / 3][c % 3] = v;
        }

        out.rows.push(ParsedPasteRow {
            line: line_no,
            student_id,
            values,
        });
    }

    out
}
