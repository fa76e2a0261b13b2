use super::model::{Field, Subject, SubjectResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellErrorKind {
    NegativeValue,
    ExceedsQuestionCount,
    RowTotalExceeds,
}

impl CellErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            CellErrorKind::NegativeValue => "negative_value",
            CellErrorKind::ExceedsQuestionCount => "exceeds_question_count",
            CellErrorKind::RowTotalExceeds => "row_total_exceeds",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellValidationError {
    pub kind: CellErrorKind,
    pub message: String,
}

/// Checks a proposed value for one cell against the subject's question count.
///
/// Rules apply in order and the first failure wins: negative values, values
/// above the question count, then the row total using the other two fields'
/// current values (unset counts as 0).
pub fn validate(
    subject: &Subject,
    field: Field,
    proposed: i64,
    current: Option<&SubjectResult>,
) -> Option<CellValidationError> {
    let max = i64::from(subject.question_count);

    if proposed < 0 {
        return Some(CellValidationError {
            kind: CellErrorKind::NegativeValue,
            message: "negative value not allowed".to_string(),
        });
    }
    if proposed > max {
        return Some(CellValidationError {
            kind: CellErrorKind::ExceedsQuestionCount,
            message: format!("exceeds question count (max {})", max),
        });
    }

    let others: i64 = field
        .others()
        .iter()
        .map(|f| current.map(|r| i64::from(r.get(*f))).unwrap_or(0))
        .sum();
    let total = proposed + others;
    if total > max {
        return Some(CellValidationError {
            kind: CellErrorKind::RowTotalExceeds,
            message: format!("row total exceeds question count ({} > {})", total, max),
        });
    }

    None
}
