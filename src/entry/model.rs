use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub question_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub student_no: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// One of the three answer counts entered per subject, in entry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Correct,
    Wrong,
    Empty,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Correct, Field::Wrong, Field::Empty];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "correct" => Some(Field::Correct),
            "wrong" => Some(Field::Wrong),
            "empty" => Some(Field::Empty),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Field::Correct => 0,
            Field::Wrong => 1,
            Field::Empty => 2,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Field::ALL.get(i).copied()
    }

    /// The two fields that share a row total with `self`.
    pub fn others(self) -> [Field; 2] {
        match self {
            Field::Correct => [Field::Wrong, Field::Empty],
            Field::Wrong => [Field::Correct, Field::Empty],
            Field::Empty => [Field::Correct, Field::Wrong],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_id: String,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub empty_count: u32,
}

impl SubjectResult {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            correct_count: 0,
            wrong_count: 0,
            empty_count: 0,
        }
    }

    pub fn get(&self, field: Field) -> u32 {
        match field {
            Field::Correct => self.correct_count,
            Field::Wrong => self.wrong_count,
            Field::Empty => self.empty_count,
        }
    }

    pub fn set(&mut self, field: Field, value: u32) {
        match field {
            Field::Correct => self.correct_count = value,
            Field::Wrong => self.wrong_count = value,
            Field::Empty => self.empty_count = value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.correct_count == 0 && self.wrong_count == 0 && self.empty_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub student_id: String,
    pub student_name: String,
    pub subjects: Vec<SubjectResult>,
    pub total_net: f64,
}

/// A persisted or externally parsed result row for one student and subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub student_id: String,
    pub subject_id: String,
    #[serde(default)]
    pub correct_count: u32,
    #[serde(default)]
    pub wrong_count: u32,
    #[serde(default)]
    pub empty_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_parse_is_case_insensitive() {
        assert_eq!(Field::parse("Correct"), Some(Field::Correct));
        assert_eq!(Field::parse(" wrong "), Some(Field::Wrong));
        assert_eq!(Field::parse("EMPTY"), Some(Field::Empty));
        assert_eq!(Field::parse("blank"), None);
    }

    #[test]
    fn field_order_round_trips_through_index() {
        for f in Field::ALL {
            assert_eq!(Field::from_index(f.index()), Some(f));
        }
        assert_eq!(Field::from_index(3), None);
    }

    #[test]
    fn display_name_tolerates_missing_parts() {
        let s = Student {
            id: "s1".into(),
            first_name: "Ayse".into(),
            last_name: "".into(),
            student_no: None,
        };
        assert_eq!(s.display_name(), "Ayse");
    }
}
