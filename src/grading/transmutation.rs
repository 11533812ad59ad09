use super::domain::TransmutationRow;
use super::errors::ConfigurationError;

/// Map a raw weighted percentage to the official scale value.
///
/// Floor match: the greatest threshold at or below `raw_grade` wins. A raw
/// grade below every declared threshold fails deterministically — tables
/// are expected to cover the full theoretical range, and inventing a value
/// here would corrupt official grades.
pub fn transmute(rows: &[TransmutationRow], raw_grade: f64) -> Result<f64, ConfigurationError> {
    let mut best: Option<&TransmutationRow> = None;
    let mut lowest = f64::INFINITY;

    for row in rows.iter().filter(|row| row.archived_at.is_none()) {
        lowest = lowest.min(row.initial_grade);
        if row.initial_grade <= raw_grade {
            match best {
                Some(current) if current.initial_grade >= row.initial_grade => {}
                _ => best = Some(row),
            }
        }
    }

    match best {
        Some(row) => Ok(row.transmuted_grade),
        None => Err(ConfigurationError::UnmappedRawGrade {
            raw_grade,
            lowest_threshold: if lowest.is_finite() { lowest } else { 0.0 },
        }),
    }
}

/// Fail-fast duplicate check applied to a replacement batch before any
/// storage mutation. Thresholds must be unique within a table.
pub fn check_unique_thresholds(rows: &[TransmutationRow]) -> Result<(), ConfigurationError> {
    let mut seen: Vec<f64> = Vec::with_capacity(rows.len());
    for row in rows {
        if seen
            .iter()
            .any(|threshold| (threshold - row.initial_grade).abs() < f64::EPSILON)
        {
            return Err(ConfigurationError::DuplicateThreshold {
                value: row.initial_grade,
            });
        }
        seen.push(row.initial_grade);
    }
    Ok(())
}
