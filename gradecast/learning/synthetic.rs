//! Seeded generator of student-performance tables for demos and tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::dataset::{Frame, CATEGORICAL_COLUMNS, NUMERIC_COLUMNS, TARGET_COLUMN};

const GENDERS: [&str; 2] = ["female", "male"];
const GROUPS: [&str; 5] = ["group A", "group B", "group C", "group D", "group E"];
const EDUCATION: [&str; 6] = [
    "some high school",
    "high school",
    "some college",
    "associate's degree",
    "bachelor's degree",
    "master's degree",
];
const LUNCH: [&str; 2] = ["free/reduced", "standard"];
const PREP: [&str; 2] = ["completed", "none"];

fn normal(rng: &mut ChaCha8Rng) -> f64 {
    // Box-Muller; the open interval keeps ln() finite.
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn pick<'a>(rng: &mut ChaCha8Rng, values: &[&'a str]) -> (usize, &'a str) {
    let idx = rng.gen_range(0..values.len());
    (idx, values[idx])
}

/// Generates `rows` records with the full schema, target included.
///
/// Scores follow a linear model of the categorical effects plus noise, clamped to `0..=100`.
#[must_use]
pub fn student_frame(rows: usize, seed: u64) -> Frame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut categorical: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows); 5];
    let mut reading = Vec::with_capacity(rows);
    let mut writing = Vec::with_capacity(rows);
    let mut math = Vec::with_capacity(rows);
    for _ in 0..rows {
        let (gender, gender_label) = pick(&mut rng, &GENDERS);
        let (group, group_label) = pick(&mut rng, &GROUPS);
        let (education, education_label) = pick(&mut rng, &EDUCATION);
        let (lunch, lunch_label) = pick(&mut rng, &LUNCH);
        let (prep, prep_label) = pick(&mut rng, &PREP);
        #[allow(clippy::cast_precision_loss)]
        let [gender, group, education, lunch, prep] =
            [gender, group, education, lunch, prep].map(|idx| idx as f64);
        let ability = 55.0 + 2.0 * education + 3.0 * group + 8.0 * lunch + 6.0 * (1.0 - prep)
            + 12.0 * normal(&mut rng);
        let reading_score =
            (ability + 4.0 - 5.0 * gender + 4.0 * normal(&mut rng)).round().clamp(0.0, 100.0);
        let writing_score =
            (reading_score - 2.0 - 4.0 * gender + 3.0 * normal(&mut rng)).round().clamp(0.0, 100.0);
        let math_score = (0.85 * reading_score + 9.0 * gender + 3.0 * lunch - 4.0
            + 5.0 * normal(&mut rng))
        .round()
        .clamp(0.0, 100.0);
        for (column, label) in categorical.iter_mut().zip([
            gender_label,
            group_label,
            education_label,
            lunch_label,
            prep_label,
        ]) {
            column.push(Some(label.to_string()));
        }
        reading.push(Some(reading_score.to_string()));
        writing.push(Some(writing_score.to_string()));
        math.push(Some(math_score.to_string()));
    }
    let mut columns: Vec<(String, Vec<Option<String>>)> = CATEGORICAL_COLUMNS
        .iter()
        .map(|name| (*name).to_string())
        .zip(categorical)
        .collect();
    columns.push((TARGET_COLUMN.to_string(), math));
    columns.push((NUMERIC_COLUMNS[0].to_string(), reading));
    columns.push((NUMERIC_COLUMNS[1].to_string(), writing));
    Frame::from_columns(columns).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    #[test]
    fn generator_is_deterministic_and_in_range() {
        let first = student_frame(64, 3);
        assert_eq!(first, student_frame(64, 3));
        let dataset = Dataset::from_frame(first, TARGET_COLUMN).unwrap();
        assert_eq!(dataset.len(), 64);
        assert!(dataset.target.iter().all(|v| (0.0..=100.0).contains(v)));
        let spread = dataset.target.iter().copied().fold(f64::MIN, f64::max)
            - dataset.target.iter().copied().fold(f64::MAX, f64::min);
        assert!(spread > 10.0);
    }
}
