//! Locally stored values that replace sheet or LMS data on read

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::Deserialize;
use validator::Validate;

use crate::db::DbConn;
use crate::error::Result;
use crate::models::prelude::*;
use crate::models::{contact_override, exam_override};
use crate::services::lms::{LmsUser, UserUpdate};

// ============================================================================
// Exam overrides
// ============================================================================

/// Fields an admin may change on an exam row. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExamOverrideInput {
    #[validate(length(max = 50, message = "must be at most 50 characters"))]
    pub pass_fail: Option<String>,
    #[validate(custom(function = "crate::services::sheets::validate_exam_date"))]
    pub exam_date: Option<String>,
    #[validate(length(max = 50, message = "must be at most 50 characters"))]
    pub exam_time: Option<String>,
}

impl ExamOverrideInput {
    pub fn is_empty(&self) -> bool {
        self.pass_fail.is_none() && self.exam_date.is_none() && self.exam_time.is_none()
    }
}

pub async fn set_exam_override(
    db: &DbConn,
    email: &str,
    input: &ExamOverrideInput,
) -> Result<exam_override::Model> {
    let email = email.trim().to_lowercase();
    let now = Utc::now();

    let saved = match ExamOverride::find_by_id(email.clone()).one(db).await? {
        Some(existing) => {
            let mut active: exam_override::ActiveModel = existing.into();
            if let Some(v) = &input.pass_fail {
                active.pass_fail = Set(v.trim().to_string());
            }
            if let Some(v) = &input.exam_date {
                active.exam_date = Set(v.trim().to_string());
            }
            if let Some(v) = &input.exam_time {
                active.exam_time = Set(v.trim().to_string());
            }
            active.updated_at = Set(now);
            active.update(db).await?
        }
        None => {
            let field = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").to_string();
            exam_override::ActiveModel {
                email: Set(email),
                pass_fail: Set(field(&input.pass_fail)),
                exam_date: Set(field(&input.exam_date)),
                exam_time: Set(field(&input.exam_time)),
                updated_at: Set(now),
            }
            .insert(db)
            .await?
        }
    };

    tracing::info!(email = %saved.email, "Exam override saved");
    Ok(saved)
}

/// All exam overrides keyed by email
pub async fn exam_overrides(db: &DbConn) -> Result<HashMap<String, exam_override::Model>> {
    Ok(ExamOverride::find()
        .all(db)
        .await?
        .into_iter()
        .map(|o| (o.email.clone(), o))
        .collect())
}

// ============================================================================
// Contact overrides
// ============================================================================

pub async fn set_contact_override(
    db: &DbConn,
    student_id: &str,
    update: &UserUpdate,
    updated_by: &str,
) -> Result<contact_override::Model> {
    let student_id = student_id.trim().to_lowercase();
    let now = Utc::now();

    let saved = match ContactOverride::find_by_id(student_id.clone()).one(db).await? {
        Some(existing) => {
            let mut active: contact_override::ActiveModel = existing.into();
            if update.first_name.is_some() {
                active.first_name = Set(update.first_name.clone());
            }
            if update.last_name.is_some() {
                active.last_name = Set(update.last_name.clone());
            }
            if update.email_address.is_some() {
                active.email = Set(update.email_address.clone());
            }
            if update.phone.is_some() {
                active.phone = Set(update.phone.clone());
            }
            active.updated_by = Set(updated_by.to_string());
            active.updated_at = Set(now);
            active.update(db).await?
        }
        None => {
            contact_override::ActiveModel {
                student_id: Set(student_id),
                first_name: Set(update.first_name.clone()),
                last_name: Set(update.last_name.clone()),
                email: Set(update.email_address.clone()),
                phone: Set(update.phone.clone()),
                updated_by: Set(updated_by.to_string()),
                updated_at: Set(now),
            }
            .insert(db)
            .await?
        }
    };

    Ok(saved)
}

/// All contact overrides keyed by lower-cased student id
pub async fn contact_overrides(db: &DbConn) -> Result<HashMap<String, contact_override::Model>> {
    Ok(ContactOverride::find()
        .all(db)
        .await?
        .into_iter()
        .map(|o| (o.student_id.clone(), o))
        .collect())
}

/// Replace user fields with any stored values
pub fn apply_contact_override(user: &mut LmsUser, o: &contact_override::Model) {
    if let Some(v) = &o.first_name {
        user.first_name = v.clone();
    }
    if let Some(v) = &o.last_name {
        user.last_name = v.clone();
    }
    if let Some(v) = &o.email {
        user.email = v.clone();
    }
    if let Some(v) = &o.phone {
        user.phone = v.clone();
    }
}
