pub const DEFAULT_MAX_SCORE: f64 = 100.0;

/// Percent thresholds, highest first.
///
/// | percent >= | grade |
/// |------------|-------|
/// | 80         | 4.0   |
/// | 75         | 3.5   |
/// | 70         | 3.0   |
/// | 65         | 2.5   |
/// | 60         | 2.0   |
/// | 55         | 1.5   |
/// | 50         | 1.0   |
/// | otherwise  | 0.0   |
const GRADE_THRESHOLDS: [(f64, f64); 7] = [
    (80.0, 4.0),
    (75.0, 3.5),
    (70.0, 3.0),
    (65.0, 2.5),
    (60.0, 2.0),
    (55.0, 1.5),
    (50.0, 1.0),
];

/// Maps a raw score to a grade point on the fixed 0.0–4.0 scale.
///
/// A zero `max_score` means no credit was possible and yields 0.0. Scores are
/// not clamped: anything at or above 80 % (including over 100 %) is 4.0.
pub fn grade_point(score: f64, max_score: f64) -> f64 {
    if max_score == 0.0 {
        return 0.0;
    }
    let percent = 100.0 * score / max_score;
    GRADE_THRESHOLDS
        .iter()
        .find(|(min, _)| percent >= *min)
        .map(|(_, grade)| *grade)
        .unwrap_or(0.0)
}
