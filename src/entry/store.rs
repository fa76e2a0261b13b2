use super::error::EntryError;
use super::model::{Field, ResultRecord, Student, StudentResult, Subject, SubjectResult};
use super::nav::GridShape;
use super::net::{compute_net, PenaltyDivisor};
use super::paste::{parse_count, ParsedPasteRow};
use super::roster::StudentDirectory;
use super::validate::{validate, CellErrorKind, CellValidationError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct CellKey {
    student: usize,
    subject: usize,
    field: Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellError {
    pub student_id: String,
    pub subject_id: String,
    pub field: Field,
    pub code: &'static str,
    pub message: String,
    #[serde(skip)]
    kind: CellErrorKind,
}

impl CellError {
    #[cfg(test)]
    pub fn kind(&self) -> CellErrorKind {
        self.kind
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpdate {
    pub cell: SubjectResult,
    pub total_net: f64,
    pub error: Option<CellError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkApplyReport {
    pub applied_rows: usize,
    pub skipped_rows: usize,
    pub cells_written: usize,
    pub invalid_cells: usize,
}

#[derive(Debug, Clone)]
struct StudentEntry {
    cells: Vec<Option<SubjectResult>>,
    total_net: f64,
}

/// In-memory result grid for one entry session.
///
/// Students and subjects are addressed by their position in the roster and
/// subject list; string ids are mapped once at construction. A student's
/// entry is created the first time any of its cells receives a value.
#[derive(Debug, Clone)]
pub struct ResultGridStore {
    subjects: Vec<Subject>,
    subject_index: HashMap<String, usize>,
    roster: StudentDirectory,
    divisor: PenaltyDivisor,
    entries: Vec<StudentEntry>,
    slots: Vec<Option<usize>>,
    errors: BTreeMap<CellKey, CellError>,
}

impl ResultGridStore {
    pub fn new(subjects: Vec<Subject>, students: Vec<Student>, divisor: PenaltyDivisor) -> Self {
        let subject_index = subjects
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let roster = StudentDirectory::new(students);
        let slots = vec![None; roster.len()];
        Self {
            subjects,
            subject_index,
            roster,
            divisor,
            entries: Vec::new(),
            slots,
            errors: BTreeMap::new(),
        }
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn roster(&self) -> &StudentDirectory {
        &self.roster
    }

    pub fn divisor(&self) -> PenaltyDivisor {
        self.divisor
    }

    pub fn shape(&self) -> GridShape {
        GridShape {
            students: self.roster.len(),
            subjects: self.subjects.len(),
        }
    }

    fn student_position(&self, student_id: &str) -> Result<usize, EntryError> {
        self.roster
            .index_of(student_id)
            .ok_or_else(|| EntryError::UnknownStudent(student_id.to_string()))
    }

    fn subject_position(&self, subject_id: &str) -> Result<usize, EntryError> {
        self.subject_index
            .get(subject_id)
            .copied()
            .ok_or_else(|| EntryError::UnknownSubject(subject_id.to_string()))
    }

    /// Parses `raw` as a count and stores it. Text that is not an integer is
    /// stored as 0. Invalid values are still stored; the returned update
    /// carries the cell's error, which also blocks save until corrected.
    pub fn set_cell(
        &mut self,
        student_id: &str,
        subject_id: &str,
        field: Field,
        raw: &str,
    ) -> Result<CellUpdate, EntryError> {
        let student = self.student_position(student_id)?;
        let subject = self.subject_position(subject_id)?;
        let value = parse_count(raw).unwrap_or(0);
        Ok(self.apply_value(student, subject, field, value))
    }

    pub fn get_cell(&self, student_id: &str, subject_id: &str) -> Option<&SubjectResult> {
        let student = self.roster.index_of(student_id)?;
        let subject = self.subject_index.get(subject_id).copied()?;
        let slot = self.slots.get(student).copied().flatten()?;
        self.entries[slot].cells[subject].as_ref()
    }

    #[cfg(test)]
    pub fn total_net(&self, student_id: &str) -> Option<f64> {
        let student = self.roster.index_of(student_id)?;
        let slot = self.slots.get(student).copied().flatten()?;
        Some(self.entries[slot].total_net)
    }

    /// Applies parsed paste rows. Rows whose student is not on the roster are
    /// skipped and counted.
    pub fn bulk_apply(&mut self, rows: &[ParsedPasteRow]) -> BulkApplyReport {
        let mut report = BulkApplyReport::default();
        for row in rows {
            let Some(student) = self.roster.resolve_index(&row.student_id) else {
                debug!(line = row.line, student = %row.student_id, "bulk row skipped");
                report.skipped_rows += 1;
                continue;
            };
            for (subject, triple) in row.values.iter().enumerate().take(self.subjects.len()) {
                for field in Field::ALL {
                    let update = self.apply_value(student, subject, field, triple[field.index()]);
                    report.cells_written += 1;
                    if update.error.is_some() {
                        report.invalid_cells += 1;
                    }
                }
            }
            report.applied_rows += 1;
        }
        report
    }

    /// Applies already-parsed result records, e.g. persisted rows when the
    /// grid reopens. Records for unknown students or subjects are skipped.
    pub fn apply_records(&mut self, records: &[ResultRecord]) -> BulkApplyReport {
        let mut report = BulkApplyReport::default();
        for rec in records {
            let (Some(student), Some(subject)) = (
                self.roster.index_of(&rec.student_id),
                self.subject_index.get(&rec.subject_id).copied(),
            ) else {
                debug!(student = %rec.student_id, subject = %rec.subject_id, "record skipped");
                report.skipped_rows += 1;
                continue;
            };
            let values = [rec.correct_count, rec.wrong_count, rec.empty_count];
            for field in Field::ALL {
                let update =
                    self.apply_value(student, subject, field, i64::from(values[field.index()]));
                report.cells_written += 1;
                if update.error.is_some() {
                    report.invalid_cells += 1;
                }
            }
            report.applied_rows += 1;
        }
        report
    }

    /// Students with at least one non-zero subject, in roster order.
    pub fn snapshot(&self) -> Vec<StudentResult> {
        let mut out = Vec::new();
        for (roster_index, slot) in self.slots.iter().enumerate() {
            let Some(slot) = *slot else {
                continue;
            };
            let entry = &self.entries[slot];
            if entry.cells.iter().flatten().all(SubjectResult::is_empty) {
                continue;
            }
            let Some(student) = self.roster.get(roster_index) else {
                continue;
            };
            out.push(StudentResult {
                student_id: student.id.clone(),
                student_name: student.display_name(),
                subjects: entry.cells.iter().flatten().cloned().collect(),
                total_net: entry.total_net,
            });
        }
        out
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.slots.iter_mut().for_each(|s| *s = None);
        self.errors.clear();
    }

    pub fn has_blocking_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> Vec<CellError> {
        self.errors.values().cloned().collect()
    }

    fn ensure_entry(&mut self, student: usize) -> usize {
        if let Some(slot) = self.slots[student] {
            return slot;
        }
        let slot = self.entries.len();
        self.entries.push(StudentEntry {
            cells: vec![None; self.subjects.len()],
            total_net: 0.0,
        });
        self.slots[student] = Some(slot);
        slot
    }

    fn apply_value(&mut self, student: usize, subject: usize, field: Field, value: i64) -> CellUpdate {
        let slot = self.ensure_entry(student);
        let verdict = validate(
            &self.subjects[subject],
            field,
            value,
            self.entries[slot].cells[subject].as_ref(),
        );

        let stored = u32::try_from(value.max(0)).unwrap_or(u32::MAX);
        let subject_id = &self.subjects[subject].id;
        let cell = self.entries[slot].cells[subject]
            .get_or_insert_with(|| SubjectResult::new(subject_id.clone()));
        cell.set(field, stored);
        let cell = cell.clone();

        let key = CellKey {
            student,
            subject,
            field,
        };
        let error = match verdict {
            Some(v) => {
                let e = self.cell_error(key, v);
                self.errors.insert(key, e.clone());
                Some(e)
            }
            None => {
                self.errors.remove(&key);
                None
            }
        };
        self.refresh_row_total_errors(key, &cell);
        self.recompute_total(slot);

        CellUpdate {
            cell,
            total_net: self.entries[slot].total_net,
            error,
        }
    }

    /// Sibling cells can only gain or lose a row-total error through another
    /// cell's edit; their own per-cell errors are left alone.
    fn refresh_row_total_errors(&mut self, edited: CellKey, row: &SubjectResult) {
        for other in edited.field.others() {
            let key = CellKey {
                field: other,
                ..edited
            };
            let Some(existing) = self.errors.get(&key) else {
                continue;
            };
            if existing.kind != CellErrorKind::RowTotalExceeds {
                continue;
            }
            let subject = &self.subjects[edited.subject];
            match validate(subject, other, i64::from(row.get(other)), Some(row)) {
                None => {
                    self.errors.remove(&key);
                }
                Some(v) => {
                    let e = self.cell_error(key, v);
                    self.errors.insert(key, e);
                }
            }
        }
    }

    fn cell_error(&self, key: CellKey, v: CellValidationError) -> CellError {
        let student_id = self
            .roster
            .get(key.student)
            .map(|s| s.id.clone())
            .unwrap_or_default();
        CellError {
            student_id,
            subject_id: self.subjects[key.subject].id.clone(),
            field: key.field,
            code: v.kind.code(),
            message: v.message,
            kind: v.kind,
        }
    }

    fn recompute_total(&mut self, slot: usize) {
        let divisor = self.divisor;
        let entry = &mut self.entries[slot];
        entry.total_net = entry
            .cells
            .iter()
            .flatten()
            .map(|c| compute_net(c.correct_count, c.wrong_count, divisor))
            .sum();
    }
}
