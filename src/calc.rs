use crate::entry::net::{compute_net, PenaltyDivisor};
use crate::entry::{ResultRecord, Student, Subject};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Rounds half away from zero to `decimals` places. Display only; stored and
/// summed nets stay unrounded.
pub fn round_net(x: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (x * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject_id: String,
    pub name: String,
    pub question_count: u32,
    pub student_count: usize,
    pub avg_correct: f64,
    pub avg_wrong: f64,
    pub avg_empty: f64,
    pub avg_net: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTotal {
    pub student_id: String,
    pub student_name: String,
    pub total_net: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub subjects: Vec<SubjectAverage>,
    pub students: Vec<StudentTotal>,
    pub avg_total_net: f64,
}

#[derive(Default)]
struct SubjectAcc {
    count: usize,
    correct: u64,
    wrong: u64,
    empty: u64,
    net: f64,
}

fn mean(sum: f64, n: usize) -> f64 {
    if n > 0 {
        sum / (n as f64)
    } else {
        0.0
    }
}

/// Per-subject averages and a net ranking over a session's persisted rows.
///
/// All-zero rows count as "not entered" and are left out of every
/// denominator. Students tie on equal totals and share the higher rank
/// (1, 2, 2, 4).
pub fn session_summary(
    subjects: &[Subject],
    students: &[Student],
    records: &[ResultRecord],
    divisor: PenaltyDivisor,
) -> SessionSummary {
    let subject_pos: HashMap<&str, usize> = subjects
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    let student_pos: HashMap<&str, usize> = students
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut acc: Vec<SubjectAcc> = subjects.iter().map(|_| SubjectAcc::default()).collect();
    // Per-student nets by subject position, summed in subject order below so
    // equal rows give bit-equal totals whatever order the records came in.
    let mut nets: Vec<Vec<Option<f64>>> = vec![vec![None; subjects.len()]; students.len()];

    for r in records {
        if r.correct_count == 0 && r.wrong_count == 0 && r.empty_count == 0 {
            continue;
        }
        let (Some(&si), Some(&pi)) = (
            subject_pos.get(r.subject_id.as_str()),
            student_pos.get(r.student_id.as_str()),
        ) else {
            continue;
        };
        let net = compute_net(r.correct_count, r.wrong_count, divisor);
        let a = &mut acc[si];
        a.count += 1;
        a.correct += u64::from(r.correct_count);
        a.wrong += u64::from(r.wrong_count);
        a.empty += u64::from(r.empty_count);
        a.net += net;
        nets[pi][si] = Some(net);
    }

    let totals = nets.into_iter().map(|row| {
        row.into_iter()
            .flatten()
            .fold(None, |acc: Option<f64>, n| Some(acc.unwrap_or(0.0) + n))
    });

    let subject_rows = subjects
        .iter()
        .zip(acc)
        .map(|(s, a)| SubjectAverage {
            subject_id: s.id.clone(),
            name: s.name.clone(),
            question_count: s.question_count,
            student_count: a.count,
            avg_correct: mean(a.correct as f64, a.count),
            avg_wrong: mean(a.wrong as f64, a.count),
            avg_empty: mean(a.empty as f64, a.count),
            avg_net: mean(a.net, a.count),
        })
        .collect();

    let mut ranked: Vec<StudentTotal> = students
        .iter()
        .zip(totals)
        .filter_map(|(s, t)| {
            t.map(|total_net| StudentTotal {
                student_id: s.id.clone(),
                student_name: s.display_name(),
                total_net,
                rank: 0,
            })
        })
        .collect();
    // Stable sort keeps roster order among ties.
    ranked.sort_by(|a, b| b.total_net.partial_cmp(&a.total_net).unwrap_or(Ordering::Equal));
    let mut prev: Option<f64> = None;
    for i in 0..ranked.len() {
        let rank = match prev {
            Some(p) if p == ranked[i].total_net => ranked[i - 1].rank,
            _ => i + 1,
        };
        prev = Some(ranked[i].total_net);
        ranked[i].rank = rank;
    }

    let avg_total_net = mean(ranked.iter().map(|s| s.total_net).sum(), ranked.len());

    SessionSummary {
        subjects: subject_rows,
        students: ranked,
        avg_total_net,
    }
}
