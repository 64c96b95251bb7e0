use serde::Serialize;

use crate::error::{RepoError, RepoResult};

pub const GRADE_MIN: f64 = 0.0;
pub const GRADE_MAX: f64 = 20.0;

/// Presentation band of a grade on the 0-20 scale, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeBand {
    Excellent,
    VeryGood,
    Good,
    Pass,
    Fail,
}

impl GradeBand {
    /// Lower bounds are inclusive. Anything that is not at least 10
    /// (including NaN) is a fail.
    pub fn classify(grade: f64) -> GradeBand {
        if grade >= 16.0 {
            GradeBand::Excellent
        } else if grade >= 14.0 {
            GradeBand::VeryGood
        } else if grade >= 12.0 {
            GradeBand::Good
        } else if grade >= 10.0 {
            GradeBand::Pass
        } else {
            GradeBand::Fail
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GradeBand::Excellent => "excellent",
            GradeBand::VeryGood => "very_good",
            GradeBand::Good => "good",
            GradeBand::Pass => "pass",
            GradeBand::Fail => "fail",
        }
    }
}

/// Input-time range check for a grade about to be stored.
pub fn validate_grade(grade: f64) -> RepoResult<f64> {
    if !grade.is_finite() {
        return Err(RepoError::validation("grade must be a number"));
    }
    if !(GRADE_MIN..=GRADE_MAX).contains(&grade) {
        return Err(RepoError::validation("grade must be between 0 and 20"));
    }
    Ok(grade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries_are_lower_inclusive() {
        assert_eq!(GradeBand::classify(20.0), GradeBand::Excellent);
        assert_eq!(GradeBand::classify(16.0), GradeBand::Excellent);
        assert_eq!(GradeBand::classify(15.99), GradeBand::VeryGood);
        assert_eq!(GradeBand::classify(14.0), GradeBand::VeryGood);
        assert_eq!(GradeBand::classify(13.99), GradeBand::Good);
        assert_eq!(GradeBand::classify(12.0), GradeBand::Good);
        assert_eq!(GradeBand::classify(11.99), GradeBand::Pass);
        assert_eq!(GradeBand::classify(10.0), GradeBand::Pass);
        assert_eq!(GradeBand::classify(9.99), GradeBand::Fail);
        assert_eq!(GradeBand::classify(0.0), GradeBand::Fail);
    }

    #[test]
    fn bands_are_monotonic_over_the_scale() {
        let mut prev = GradeBand::classify(0.0);
        let mut g = 0.0;
        while g <= 20.0 {
            let band = GradeBand::classify(g);
            assert!(band <= prev, "band regressed at {}", g);
            prev = band;
            g += 0.01;
        }
    }

    #[test]
    fn nan_classifies_as_fail() {
        assert_eq!(GradeBand::classify(f64::NAN), GradeBand::Fail);
    }

    #[test]
    fn validate_grade_rejects_out_of_range() {
        assert!(validate_grade(0.0).is_ok());
        assert!(validate_grade(20.0).is_ok());
        assert!(matches!(validate_grade(-0.5), Err(RepoError::Validation(_))));
        assert!(matches!(validate_grade(20.01), Err(RepoError::Validation(_))));
        assert!(matches!(validate_grade(f64::INFINITY), Err(RepoError::Validation(_))));
    }
}
