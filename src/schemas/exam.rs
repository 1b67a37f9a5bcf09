use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{macros::format_description, Date};
use validator::Validate;

use crate::db::types::{AssignmentStatus, QuestionType, UserRole};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: String,
    #[serde(alias = "type")]
    pub(crate) question_type: QuestionType,
    #[serde(default = "default_points")]
    #[validate(range(min = 1, message = "points must be positive"))]
    pub(crate) points: i32,
    #[serde(default)]
    pub(crate) options: Vec<String>,
    #[serde(alias = "correctAnswer")]
    #[validate(length(min = 1, message = "correct_answer must not be empty"))]
    pub(crate) correct_answer: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    // Required strings default to "" so a missing field fails the length
    // validator with 400 instead of dying in the extractor with 422.
    #[serde(default)]
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub(crate) subject: String,
    #[serde(default, alias = "className")]
    #[validate(length(min = 1, message = "class_name must not be empty"))]
    pub(crate) class_name: String,
    #[serde(default = "default_duration")]
    #[serde(alias = "duration", alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    #[serde(default = "default_total_points")]
    #[serde(alias = "totalPoints")]
    #[validate(range(min = 1, message = "total_points must be positive"))]
    pub(crate) total_points: i32,
    #[serde(default, alias = "examDate", deserialize_with = "deserialize_option_date")]
    pub(crate) exam_date: Option<Date>,
    #[serde(default)]
    #[serde(alias = "examTime")]
    pub(crate) exam_time: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionCreate>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatorResponse {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssigneeResponse {
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) status: AssignmentStatus,
    pub(crate) assigned_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) points: i32,
    pub(crate) options: Vec<String>,
    /// Absent in student views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) correct_answer: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject: String,
    pub(crate) class_name: String,
    pub(crate) duration_minutes: i32,
    pub(crate) total_points: i32,
    pub(crate) exam_date: Option<String>,
    pub(crate) exam_time: Option<String>,
    pub(crate) created_by: CreatorResponse,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) questions: Vec<QuestionResponse>,
    /// Absent in student views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) assignees: Option<Vec<AssigneeResponse>>,
}

fn default_points() -> i32 {
    1
}

fn default_duration() -> i32 {
    30
}

fn default_total_points() -> i32 {
    100
}

fn parse_date(raw: &str) -> Option<Date> {
    // Frontend date pickers send "YYYY-MM-DD"; tolerate a full timestamp too.
    let date_part = raw.split('T').next().unwrap_or(raw);
    Date::parse(date_part, &format_description!("[year]-[month]-[day]")).ok()
}

fn deserialize_option_date<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) if !value.trim().is_empty() => parse_date(value.trim())
            .ok_or_else(|| D::Error::custom(format!("invalid date: {value}")))
            .map(Some),
        _ => Ok(None),
    }
}
