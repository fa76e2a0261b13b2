use super::model::Field;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub students: usize,
    pub subjects: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellPos {
    pub student_index: usize,
    pub subject_index: usize,
    pub field: Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Enter,
    ArrowDown,
    ArrowUp,
    Tab,
    ShiftTab,
}

impl NavKey {
    /// Maps a DOM-style key name; `shift` only changes `Tab`.
    pub fn parse(key: &str, shift: bool) -> Option<Self> {
        match key {
            "Enter" => Some(NavKey::Enter),
            "ArrowDown" => Some(NavKey::ArrowDown),
            "ArrowUp" => Some(NavKey::ArrowUp),
            "Tab" if shift => Some(NavKey::ShiftTab),
            "Tab" => Some(NavKey::Tab),
            _ => None,
        }
    }
}

impl GridShape {
    fn contains(self, pos: CellPos) -> bool {
        pos.student_index < self.students && pos.subject_index < self.subjects
    }

    fn cells_per_row(self) -> usize {
        self.subjects * Field::ALL.len()
    }

    fn linear(self, pos: CellPos) -> usize {
        pos.student_index * self.cells_per_row()
            + pos.subject_index * Field::ALL.len()
            + pos.field.index()
    }

    fn from_linear(self, i: usize) -> Option<CellPos> {
        let per_row = self.cells_per_row();
        if per_row == 0 || i >= per_row * self.students {
            return None;
        }
        let within = i % per_row;
        Some(CellPos {
            student_index: i / per_row,
            subject_index: within / Field::ALL.len(),
            field: Field::from_index(within % Field::ALL.len())?,
        })
    }
}

/// Next focus target for a key press, or `None` when focus stays put.
pub fn next_position(shape: GridShape, from: CellPos, key: NavKey) -> Option<CellPos> {
    if !shape.contains(from) {
        return None;
    }

    match key {
        NavKey::Enter | NavKey::ArrowDown => {
            if from.student_index + 1 >= shape.students {
                return None;
            }
            Some(CellPos {
                student_index: from.student_index + 1,
                ..from
            })
        }
        NavKey::ArrowUp => {
            if from.student_index == 0 {
                return None;
            }
            Some(CellPos {
                student_index: from.student_index - 1,
                ..from
            })
        }
        NavKey::Tab => shape.from_linear(shape.linear(from) + 1),
        NavKey::ShiftTab => {
            let i = shape.linear(from);
            if i == 0 {
                return None;
            }
            shape.from_linear(i - 1)
        }
    }
}
