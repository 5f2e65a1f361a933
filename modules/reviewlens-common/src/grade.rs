use std::fmt;

use serde::{Deserialize, Serialize};

/// Letter grade for a product's review authenticity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

/// Upper bound (inclusive) on fake percentage for each grade, best first.
/// Anything above the last bound is an F. Every code path that derives a
/// grade goes through [`Grade::from_fake_percentage`].
pub const GRADE_THRESHOLDS: [(f64, Grade); 4] = [
    (15.0, Grade::A),
    (30.0, Grade::B),
    (50.0, Grade::C),
    (70.0, Grade::D),
];

impl Grade {
    pub fn from_fake_percentage(fake_percentage: f64) -> Self {
        GRADE_THRESHOLDS
            .iter()
            .find(|(bound, _)| fake_percentage <= *bound)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::F)
    }

    /// Higher is better: A=4 down to F=0.
    pub fn rank(&self) -> u8 {
        match self {
            Grade::A => 4,
            Grade::B => 3,
            Grade::C => 2,
            Grade::D => 1,
            Grade::F => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "A" | "a" => Some(Grade::A),
            "B" | "b" => Some(Grade::B),
            "C" | "c" => Some(Grade::C),
            "D" | "d" => Some(Grade::D),
            "F" | "f" => Some(Grade::F),
            _ => None,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_inclusive() {
        assert_eq!(Grade::from_fake_percentage(0.0), Grade::A);
        assert_eq!(Grade::from_fake_percentage(15.0), Grade::A);
        assert_eq!(Grade::from_fake_percentage(15.1), Grade::B);
        assert_eq!(Grade::from_fake_percentage(30.0), Grade::B);
        assert_eq!(Grade::from_fake_percentage(50.0), Grade::C);
        assert_eq!(Grade::from_fake_percentage(70.0), Grade::D);
        assert_eq!(Grade::from_fake_percentage(70.1), Grade::F);
        assert_eq!(Grade::from_fake_percentage(100.0), Grade::F);
    }

    #[test]
    fn lower_fake_percentage_never_grades_worse() {
        let mut previous = Grade::from_fake_percentage(0.0);
        for tenths in 1..=1000 {
            let grade = Grade::from_fake_percentage(tenths as f64 / 10.0);
            assert!(
                grade.rank() <= previous.rank(),
                "grade improved from {previous} to {grade} at {}%",
                tenths as f64 / 10.0
            );
            previous = grade;
        }
    }

    #[test]
    fn parse_round_trips_display() {
        for grade in [Grade::A, Grade::B, Grade::C, Grade::D, Grade::F] {
            assert_eq!(Grade::parse(&grade.to_string()), Some(grade));
        }
        assert_eq!(Grade::parse("E"), None);
    }
}
