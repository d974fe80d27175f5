use serde::Serialize;

use super::averages::round2;
use super::domain::StudentId;

/// One student's place in the class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStudent {
    pub student_id: StudentId,
    pub general_average: f64,
    pub rank: usize,
    pub is_ex_aequo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassStatistics {
    pub ranked_count: usize,
    pub cohort_average: Option<f64>,
    pub top: Option<f64>,
    pub bottom: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassRanking {
    pub entries: Vec<RankedStudent>,
    pub statistics: ClassStatistics,
}

impl ClassRanking {
    pub fn position_of(&self, student_id: &StudentId) -> Option<&RankedStudent> {
        self.entries
            .iter()
            .find(|entry| entry.student_id == *student_id)
    }
}

/// Averages compare in hundredths so float noise below the rounding never splits a tie.
fn hundredths(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Competition ranking: tied averages share a rank and the next rank skips ahead.
pub struct RankingEngine;

impl RankingEngine {
    pub fn rank(averages: Vec<(StudentId, f64)>) -> ClassRanking {
        let mut sorted: Vec<(StudentId, f64)> = averages
            .into_iter()
            .filter(|(_, average)| average.is_finite())
            .map(|(student_id, average)| (student_id, round2(average)))
            .collect();
        sorted.sort_by(|(a_id, a), (b_id, b)| {
            hundredths(*b)
                .cmp(&hundredths(*a))
                .then_with(|| a_id.cmp(b_id))
        });

        let mut entries: Vec<RankedStudent> = Vec::with_capacity(sorted.len());
        for (position, (student_id, general_average)) in sorted.into_iter().enumerate() {
            let (rank, is_ex_aequo) = match entries.last() {
                Some(previous)
                    if hundredths(previous.general_average) == hundredths(general_average) =>
                {
                    (previous.rank, true)
                }
                _ => (position + 1, false),
            };
            entries.push(RankedStudent {
                student_id,
                general_average,
                rank,
                is_ex_aequo,
            });
        }

        let statistics = Self::statistics(&entries);
        ClassRanking {
            entries,
            statistics,
        }
    }

    fn statistics(entries: &[RankedStudent]) -> ClassStatistics {
        let ranked_count = entries.len();
        if ranked_count == 0 {
            return ClassStatistics {
                ranked_count,
                cohort_average: None,
                top: None,
                bottom: None,
            };
        }

        let total: f64 = entries.iter().map(|entry| entry.general_average).sum();
        ClassStatistics {
            ranked_count,
            cohort_average: Some(round2(total / ranked_count as f64)),
            top: entries.first().map(|entry| entry.general_average),
            bottom: entries.last().map(|entry| entry.general_average),
        }
    }
}
