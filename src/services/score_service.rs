use crate::models::assessment::{ScoreMap, ScoreSummary};
use crate::models::rubric::Criterion;

/// Every criterion is assumed to top out at this score.
pub const MAX_SCORE_PER_CRITERION: i64 = 3;

/// Totals for the criteria currently in the rubric.
///
/// Scores for ids not in `criteria` are ignored, as are zero and negative
/// entries. The average divides by the number of criteria that were actually
/// scored, not by the criteria count.
pub fn aggregate(criteria: &[Criterion], scores: &ScoreMap) -> ScoreSummary {
    let recorded: Vec<i64> = criteria
        .iter()
        .map(|criterion| scores.get(&criterion.id).copied().unwrap_or(0))
        .filter(|score| *score > 0)
        .collect();

    let total_score: i64 = recorded.iter().sum();
    let count = i64::try_from(recorded.len()).unwrap_or(i64::MAX);
    let max_score = i64::try_from(criteria.len())
        .unwrap_or(i64::MAX)
        .saturating_mul(MAX_SCORE_PER_CRITERION);

    ScoreSummary {
        total_score,
        max_score,
        average_score: format_average(total_score, count),
    }
}

/// `total / count` to one decimal place; "0.0" when nothing was scored.
///
/// Rounds the exact binary value of the quotient, so `23 / 20` (stored as
/// 1.149999...) gives "1.1". Only quotients that sit exactly on a tie, which
/// are odd multiples of 0.25, round up.
pub fn format_average(total: i64, count: i64) -> String {
    if count <= 0 || total <= 0 {
        return "0.0".to_string();
    }

    let quotient = total as f64 / count as f64;
    let quarters = quotient * 4.0;
    if quarters.fract() == 0.0 && quarters.abs() < 1e15 && (quarters as i64) % 2 == 1 {
        let tenths = (5 * quarters as i64 + 1) / 2;
        return format!("{}.{}", tenths / 10, tenths % 10);
    }

    format!("{quotient:.1}")
}
