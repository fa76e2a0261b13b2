use super::model::Student;
use std::collections::HashMap;

/// Lookup tables for resolving a pasted student token to a roster entry.
///
/// Tokens are tried as an id or student number first, then as the full
/// "First Last" name, then with all whitespace removed.
#[derive(Debug, Clone, Default)]
pub struct StudentDirectory {
    students: Vec<Student>,
    by_id: HashMap<String, usize>,
    by_number: HashMap<String, usize>,
    by_full_name: HashMap<String, usize>,
    by_compact_name: HashMap<String, usize>,
}

fn normalize_name(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn compact_name(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

impl StudentDirectory {
    pub fn new(students: Vec<Student>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_number = HashMap::new();
        let mut by_full_name = HashMap::new();
        let mut by_compact_name = HashMap::new();

        for (i, s) in students.iter().enumerate() {
            by_id.insert(s.id.clone(), i);
            if let Some(no) = s.student_no.as_deref().map(str::trim) {
                if !no.is_empty() {
                    by_number.entry(no.to_string()).or_insert(i);
                }
            }
            // First roster entry wins on duplicate names.
            let full = format!("{} {}", s.first_name, s.last_name);
            by_full_name.entry(normalize_name(&full)).or_insert(i);
            by_compact_name.entry(compact_name(&full)).or_insert(i);
        }

        Self {
            students,
            by_id,
            by_number,
            by_full_name,
            by_compact_name,
        }
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn get(&self, index: usize) -> Option<&Student> {
        self.students.get(index)
    }

    /// Roster position of an exact student id.
    pub fn index_of(&self, student_id: &str) -> Option<usize> {
        self.by_id.get(student_id).copied()
    }

    pub fn resolve_index(&self, token: &str) -> Option<usize> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if let Some(i) = self.by_id.get(token).or_else(|| self.by_number.get(token)) {
            return Some(*i);
        }
        if let Some(i) = self.by_full_name.get(&normalize_name(token)) {
            return Some(*i);
        }
        let compact = compact_name(token);
        if compact.is_empty() {
            return None;
        }
        self.by_compact_name.get(&compact).copied()
    }

    pub fn resolve(&self, token: &str) -> Option<&Student> {
        self.resolve_index(token).and_then(|i| self.students.get(i))
    }
}
