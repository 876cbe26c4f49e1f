//! Exam readiness scorecard
//!
//! Four independent criteria are evaluated over a student's enrollments:
//!
//! 1. Practice exams: the three most recent attempts all scored 80 or more
//! 2. Time in course: pre-licensing hours reach 30 (Life & Health) or 20
//! 3. State laws: one completed law course and at least 1.5 hours
//! 4. Videos: 30 minutes of video for each required line of authority
//!
//! All four met is GREEN, two or three is YELLOW, fewer is RED. An exam two
//! days out or closer without every criterion met is always RED.

use serde::Serialize;

use super::courses::{
    is_health_video, is_life_video, is_practice_exam, is_prelicensing, is_state_law, is_video,
};
use super::format::round1;
use crate::services::lms::Enrollment;

pub const PASSING_SCORE: f64 = 80.0;
pub const REQUIRED_CONSECUTIVE_PASSES: usize = 3;
pub const LIFE_AND_HEALTH_HOURS: i64 = 30;
pub const SINGLE_LINE_HOURS: i64 = 20;
pub const STATE_LAW_HOURS: f64 = 1.5;
pub const VIDEO_MINUTES: i64 = 30;
const URGENT_EXAM_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadinessStatus {
    Green,
    Yellow,
    Red,
}

impl ReadinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessStatus::Green => "GREEN",
            ReadinessStatus::Yellow => "YELLOW",
            ReadinessStatus::Red => "RED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeAttempt {
    pub name: String,
    pub score: f64,
    pub minutes: i64,
    pub date: String,
    pub status: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeExamsCriterion {
    pub met: bool,
    pub label: &'static str,
    pub requirement: &'static str,
    pub consecutive_passing: usize,
    /// Up to five most recent scores
    pub scores: Vec<f64>,
    pub total_exams: usize,
    pub hours_spent: f64,
    /// Up to ten most recent attempts
    pub attempts: Vec<PracticeAttempt>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInCourseCriterion {
    pub met: bool,
    pub label: &'static str,
    pub requirement: String,
    pub hours_logged: f64,
    pub hours_required: i64,
    pub course_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateLawsCriterion {
    pub met: bool,
    pub label: &'static str,
    pub requirement: &'static str,
    pub completions: usize,
    pub hours_spent: f64,
    pub total_courses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoLine {
    pub required: bool,
    pub minutes: i64,
    pub met: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VideoDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub life: Option<VideoLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<VideoLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideosCriterion {
    pub met: bool,
    pub label: &'static str,
    pub requirement: &'static str,
    pub details: VideoDetails,
    pub total_courses: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Criteria {
    pub practice_exams: PracticeExamsCriterion,
    pub time_in_course: TimeInCourseCriterion,
    pub state_laws: StateLawsCriterion,
    pub videos: VideosCriterion,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub status: ReadinessStatus,
    pub criteria_met: usize,
    pub criteria_total: usize,
    pub criteria: Criteria,
}

/// Whether the exam course type covers Life. A missing type requires both lines.
pub fn needs_life(course_type: Option<&str>) -> bool {
    match course_type.map(str::trim).filter(|s| !s.is_empty()) {
        Some(ct) => ct.to_lowercase().contains("life"),
        None => true,
    }
}

pub fn needs_health(course_type: Option<&str>) -> bool {
    match course_type.map(str::trim).filter(|s| !s.is_empty()) {
        Some(ct) => ct.to_lowercase().contains("health"),
        None => true,
    }
}

/// Practice attempts, most recent first
pub fn practice_attempts(enrollments: &[Enrollment]) -> Vec<&Enrollment> {
    let mut practice: Vec<&Enrollment> = enrollments
        .iter()
        .filter(|e| is_practice_exam(&e.course_name))
        .collect();
    practice.sort_by(|a, b| b.activity_date().cmp(a.activity_date()));
    practice
}

/// Count of leading scores at or above the passing mark
pub fn consecutive_passing(scores: &[f64]) -> usize {
    scores.iter().take_while(|&&s| s >= PASSING_SCORE).count()
}

pub fn calculate_readiness(
    enrollments: &[Enrollment],
    course_type: Option<&str>,
    days_until_exam: Option<i64>,
) -> Readiness {
    // Practice exams
    let practice = practice_attempts(enrollments);
    let scores: Vec<f64> = practice.iter().map(|e| e.practice_score()).collect();
    let passing = consecutive_passing(&scores);
    let practice_minutes: i64 = practice.iter().map(|e| e.time_spent).sum();
    let practice_met = passing >= REQUIRED_CONSECUTIVE_PASSES;

    let practice_exams = PracticeExamsCriterion {
        met: practice_met,
        label: "Practice Exams",
        requirement: "3 consecutive scores >= 80%",
        consecutive_passing: passing,
        scores: scores.iter().take(5).copied().collect(),
        total_exams: practice.len(),
        hours_spent: round1(practice_minutes as f64 / 60.0),
        attempts: practice
            .iter()
            .take(10)
            .map(|e| PracticeAttempt {
                name: e.course_name.clone(),
                score: e.practice_score(),
                minutes: e.time_spent,
                date: e.activity_date().to_string(),
                status: e.status,
            })
            .collect(),
    };

    // Time in course
    let life = needs_life(course_type);
    let health = needs_health(course_type);
    let required_hours = if life && health {
        LIFE_AND_HEALTH_HOURS
    } else {
        SINGLE_LINE_HOURS
    };
    let course_minutes: i64 = enrollments
        .iter()
        .filter(|e| is_prelicensing(&e.course_name))
        .map(|e| e.time_spent)
        .sum();
    let course_hours = course_minutes as f64 / 60.0;
    let time_met = course_hours >= required_hours as f64;

    let time_in_course = TimeInCourseCriterion {
        met: time_met,
        label: "Time in Course",
        requirement: format!(">= {} hours", required_hours),
        hours_logged: round1(course_hours),
        hours_required: required_hours,
        course_type: course_type
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("Unknown")
            .to_string(),
    };

    // State laws
    let laws: Vec<&Enrollment> = enrollments
        .iter()
        .filter(|e| is_state_law(&e.course_name))
        .collect();
    let law_completions = laws.iter().filter(|e| e.is_completed()).count();
    let law_hours = laws.iter().map(|e| e.time_spent).sum::<i64>() as f64 / 60.0;
    let laws_met = law_completions >= 1 && law_hours >= STATE_LAW_HOURS;

    let state_laws = StateLawsCriterion {
        met: laws_met,
        label: "State Laws",
        requirement: ">= 1 completion AND >= 1.5 hours",
        completions: law_completions,
        hours_spent: round1(law_hours),
        total_courses: laws.len(),
    };

    // Videos
    let video_total = enrollments.iter().filter(|e| is_video(&e.course_name)).count();
    let life_minutes: i64 = enrollments
        .iter()
        .filter(|e| is_life_video(&e.course_name))
        .map(|e| e.time_spent)
        .sum();
    let health_minutes: i64 = enrollments
        .iter()
        .filter(|e| is_health_video(&e.course_name))
        .map(|e| e.time_spent)
        .sum();

    let mut details = VideoDetails::default();
    if life {
        details.life = Some(VideoLine {
            required: true,
            minutes: life_minutes,
            met: life_minutes >= VIDEO_MINUTES,
        });
    }
    if health {
        details.health = Some(VideoLine {
            required: true,
            minutes: health_minutes,
            met: health_minutes >= VIDEO_MINUTES,
        });
    }
    let videos_met = [&details.life, &details.health]
        .iter()
        .all(|line| line.as_ref().map_or(true, |l| l.met));

    let videos = VideosCriterion {
        met: videos_met,
        label: "Videos",
        requirement: "30+ min per required type",
        details,
        total_courses: video_total,
    };

    let criteria_met = [practice_met, time_met, laws_met, videos_met]
        .iter()
        .filter(|&&m| m)
        .count();

    Readiness {
        status: overall_status(criteria_met, days_until_exam),
        criteria_met,
        criteria_total: 4,
        criteria: Criteria {
            practice_exams,
            time_in_course,
            state_laws,
            videos,
        },
    }
}

pub fn overall_status(criteria_met: usize, days_until_exam: Option<i64>) -> ReadinessStatus {
    if criteria_met >= 4 {
        ReadinessStatus::Green
    } else if days_until_exam.is_some_and(|d| d <= URGENT_EXAM_DAYS) {
        ReadinessStatus::Red
    } else if criteria_met >= 2 {
        ReadinessStatus::Yellow
    } else {
        ReadinessStatus::Red
    }
}
