//! Course-name heuristics and primary-course selection

use serde::{Deserialize, Serialize};

use crate::services::lms::Enrollment;

fn contains_any(name: &str, needles: &[&str]) -> bool {
    let lower = name.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

pub fn is_prelicensing(name: &str) -> bool {
    contains_any(name, &["pre-licens", "prelicens", "pre licens"])
}

pub fn is_module_or_chapter(name: &str) -> bool {
    contains_any(name, &["module", "chapter", "lesson", "unit"])
}

pub fn is_exam_prep(name: &str) -> bool {
    contains_any(name, &["practice", "prep", "study"])
}

pub fn is_practice_exam(name: &str) -> bool {
    contains_any(name, &["practice"])
}

pub fn is_state_law(name: &str) -> bool {
    contains_any(name, &["law", "specific"])
}

pub fn is_video(name: &str) -> bool {
    contains_any(name, &["video"])
}

pub fn is_life_video(name: &str) -> bool {
    is_video(name) && contains_any(name, &["life"])
}

pub fn is_health_video(name: &str) -> bool {
    is_video(name) && contains_any(name, &["health"])
}

/// Table filter bucket for a course name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourseCategory {
    PreLicensing,
    ExamPrep,
    Other,
}

impl CourseCategory {
    pub fn of(course_name: &str) -> Self {
        if is_prelicensing(course_name) || is_module_or_chapter(course_name) {
            CourseCategory::PreLicensing
        } else if is_exam_prep(course_name) {
            CourseCategory::ExamPrep
        } else {
            CourseCategory::Other
        }
    }
}

/// The enrollment that represents a student on the dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryCourse {
    /// Index into the enrollment slice, `None` when there are no enrollments
    pub index: Option<usize>,
    pub progress: f64,
    pub time_spent: i64,
    pub display_name: String,
}

/// Pick the primary course.
///
/// The main pre-licensing course wins and its progress is used directly.
/// Without one, chapter progress is averaged. Students with no pre-licensing
/// material fall back to exam prep, then the first unfinished course, then
/// the first enrollment.
pub fn find_primary_course(enrollments: &[Enrollment]) -> PrimaryCourse {
    if enrollments.is_empty() {
        return PrimaryCourse {
            index: None,
            progress: 0.0,
            time_spent: 0,
            display_name: "No Course".to_string(),
        };
    }

    let mut main: Option<usize> = None;
    let mut chapters: Vec<usize> = Vec::new();
    let mut exam_prep: Vec<usize> = Vec::new();
    let mut other_in_progress: Option<usize> = None;

    for (i, e) in enrollments.iter().enumerate() {
        let name = e.course_name.as_str();
        if is_prelicensing(name) {
            if is_module_or_chapter(name) {
                chapters.push(i);
            } else {
                main = Some(i);
            }
        } else if is_module_or_chapter(name) {
            chapters.push(i);
        } else if is_exam_prep(name) {
            exam_prep.push(i);
        } else if e.status != 2 && other_in_progress.is_none() {
            other_in_progress = Some(i);
        }
    }

    if let Some(m) = main {
        let primary = &enrollments[m];
        return PrimaryCourse {
            index: Some(m),
            progress: primary.progress,
            time_spent: primary.time_spent,
            display_name: if primary.course_name.is_empty() {
                "Pre-License Course".to_string()
            } else {
                primary.course_name.clone()
            },
        };
    }

    if let Some(&first) = chapters.first() {
        let total: f64 = chapters.iter().map(|&i| enrollments[i].progress).sum();
        return PrimaryCourse {
            index: Some(first),
            progress: total / chapters.len() as f64,
            time_spent: enrollments[first].time_spent,
            display_name: "Pre-License Course".to_string(),
        };
    }

    let index = exam_prep.first().copied().or(other_in_progress).unwrap_or(0);
    let primary = &enrollments[index];
    PrimaryCourse {
        index: Some(index),
        progress: primary.progress,
        time_spent: primary.time_spent,
        display_name: if primary.course_name.is_empty() {
            "No Course".to_string()
        } else {
            primary.course_name.clone()
        },
    }
}

/// Combined minutes across every exam-prep enrollment
pub fn exam_prep_minutes(enrollments: &[Enrollment]) -> i64 {
    enrollments
        .iter()
        .filter(|e| is_exam_prep(&e.course_name))
        .map(|e| e.time_spent)
        .sum()
}

/// Totals across all pre-licensing material for the student detail view
#[derive(Debug, Clone, PartialEq)]
pub struct PrelicensingTotals {
    pub time_spent: i64,
    pub average_progress: f64,
    pub course_name: String,
    pub status: i64,
}

pub fn prelicensing_totals(enrollments: &[Enrollment]) -> PrelicensingTotals {
    let related: Vec<&Enrollment> = enrollments
        .iter()
        .filter(|e| is_prelicensing(&e.course_name) || is_module_or_chapter(&e.course_name))
        .collect();

    if related.is_empty() {
        return match enrollments.first() {
            Some(e) => PrelicensingTotals {
                time_spent: e.time_spent,
                average_progress: e.progress,
                course_name: e.course_name.clone(),
                status: e.status,
            },
            None => PrelicensingTotals {
                time_spent: 0,
                average_progress: 0.0,
                course_name: "No Course".to_string(),
                status: 0,
            },
        };
    }

    let mut course_name = "Pre-License Course".to_string();
    let mut status = 0;
    for e in &related {
        if is_prelicensing(&e.course_name) && !is_module_or_chapter(&e.course_name) {
            course_name = e.course_name.clone();
            status = e.status;
        }
    }

    PrelicensingTotals {
        time_spent: related.iter().map(|e| e.time_spent).sum(),
        average_progress: related.iter().map(|e| e.progress).sum::<f64>() / related.len() as f64,
        course_name,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment(name: &str, progress: f64, minutes: i64, status: i64) -> Enrollment {
        Enrollment {
            course_name: name.to_string(),
            progress,
            time_spent: minutes,
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_name_heuristics() {
        assert!(is_prelicensing("Alabama Life & Health Pre-License Course"));
        assert!(is_prelicensing("PRELICENSING basics"));
        assert!(is_prelicensing("Pre Licensing Intro"));
        assert!(is_module_or_chapter("Chapter 3: Annuities"));
        assert!(is_exam_prep("Life Practice Exam 2"));
        assert!(is_exam_prep("Study Guide"));
        assert!(is_state_law("Texas State Laws"));
        assert!(is_state_law("State Specific Rules"));
        assert!(is_life_video("Life Insurance Video Series"));
        assert!(!is_life_video("Life Insurance Reading"));
        assert!(is_health_video("Health Video Pack"));
    }

    #[test]
    fn test_category_of() {
        assert_eq!(CourseCategory::of("Ohio Pre-License Course"), CourseCategory::PreLicensing);
        assert_eq!(CourseCategory::of("Module 4"), CourseCategory::PreLicensing);
        assert_eq!(CourseCategory::of("Practice Exam A"), CourseCategory::ExamPrep);
        assert_eq!(CourseCategory::of("Ethics Refresher"), CourseCategory::Other);
    }

    #[test]
    fn test_primary_prefers_main_prelicensing_course() {
        let enrollments = vec![
            enrollment("Practice Exam 1", 90.0, 30, 2),
            enrollment("Pre-License Chapter 1", 100.0, 60, 2),
            enrollment("Ohio Life Pre-License Course", 42.0, 600, 1),
        ];
        let primary = find_primary_course(&enrollments);

        assert_eq!(primary.index, Some(2));
        assert_eq!(primary.progress, 42.0);
        assert_eq!(primary.time_spent, 600);
        assert_eq!(primary.display_name, "Ohio Life Pre-License Course");
    }

    #[test]
    fn test_primary_averages_chapters_without_main() {
        let enrollments = vec![
            enrollment("Chapter 1", 100.0, 60, 2),
            enrollment("Chapter 2", 50.0, 30, 1),
            enrollment("Practice Exam 1", 90.0, 30, 2),
        ];
        let primary = find_primary_course(&enrollments);

        assert_eq!(primary.index, Some(0));
        assert_eq!(primary.progress, 75.0);
        assert_eq!(primary.time_spent, 60);
        assert_eq!(primary.display_name, "Pre-License Course");
    }

    #[test]
    fn test_primary_falls_back_to_exam_prep_then_unfinished() {
        let with_prep = vec![
            enrollment("Ethics", 100.0, 10, 2),
            enrollment("Practice Exam 1", 70.0, 20, 1),
        ];
        assert_eq!(find_primary_course(&with_prep).index, Some(1));

        let without_prep = vec![
            enrollment("Ethics", 100.0, 10, 2),
            enrollment("Compliance", 10.0, 5, 1),
        ];
        assert_eq!(find_primary_course(&without_prep).index, Some(1));

        let all_done = vec![enrollment("Ethics", 100.0, 10, 2)];
        assert_eq!(find_primary_course(&all_done).index, Some(0));
    }

    #[test]
    fn test_primary_with_no_enrollments() {
        let primary = find_primary_course(&[]);
        assert_eq!(primary.index, None);
        assert_eq!(primary.display_name, "No Course");
        assert_eq!(primary.progress, 0.0);
    }

    #[test]
    fn test_exam_prep_minutes_sums_all_prep() {
        let enrollments = vec![
            enrollment("Practice Exam 1", 90.0, 30, 2),
            enrollment("Study Guide", 50.0, 45, 1),
            enrollment("Pre-License Course", 50.0, 600, 1),
        ];
        assert_eq!(exam_prep_minutes(&enrollments), 75);
    }

    #[test]
    fn test_prelicensing_totals() {
        let enrollments = vec![
            enrollment("Texas Pre-License Course", 40.0, 300, 1),
            enrollment("Chapter 1", 100.0, 60, 3),
            enrollment("Practice Exam", 90.0, 30, 2),
        ];
        let totals = prelicensing_totals(&enrollments);

        assert_eq!(totals.time_spent, 360);
        assert_eq!(totals.average_progress, 70.0);
        assert_eq!(totals.course_name, "Texas Pre-License Course");
        assert_eq!(totals.status, 1);
    }

    #[test]
    fn test_prelicensing_totals_fallback() {
        let totals = prelicensing_totals(&[enrollment("Ethics", 20.0, 15, 1)]);
        assert_eq!(totals.course_name, "Ethics");
        assert_eq!(totals.time_spent, 15);

        let empty = prelicensing_totals(&[]);
        assert_eq!(empty.course_name, "No Course");
    }
}
