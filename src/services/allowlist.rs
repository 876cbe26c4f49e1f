//! Login allowlist
//!
//! An empty allowlist (no active rows) admits every LMS user. Once any entry
//! is active, only listed emails may log in.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use crate::db::DbConn;
use crate::error::Result;
use crate::models::allowed_user;
use crate::models::prelude::*;

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn allowlist_count(db: &DbConn) -> Result<u64> {
    Ok(AllowedUser::find()
        .filter(allowed_user::Column::Active.eq(true))
        .count(db)
        .await?)
}

pub async fn is_user_allowed(db: &DbConn, email: &str) -> Result<bool> {
    if allowlist_count(db).await? == 0 {
        return Ok(true);
    }
    let found = AllowedUser::find_by_id(normalize(email))
        .filter(allowed_user::Column::Active.eq(true))
        .one(db)
        .await?;
    Ok(found.is_some())
}

/// Add an entry, reactivating a previously removed one
pub async fn add_allowed_user(
    db: &DbConn,
    email: &str,
    name: Option<&str>,
    added_by: &str,
) -> Result<allowed_user::Model> {
    let email = normalize(email);
    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    let now = Utc::now();

    let saved = match AllowedUser::find_by_id(email.clone()).one(db).await? {
        Some(existing) => {
            let mut active: allowed_user::ActiveModel = existing.into();
            active.name = Set(name);
            active.added_by = Set(added_by.to_string());
            active.added_at = Set(now);
            active.active = Set(true);
            active.update(db).await?
        }
        None => {
            allowed_user::ActiveModel {
                email: Set(email),
                name: Set(name),
                added_by: Set(added_by.to_string()),
                added_at: Set(now),
                active: Set(true),
            }
            .insert(db)
            .await?
        }
    };

    tracing::info!(email = %saved.email, added_by, "Allowlist entry added");
    Ok(saved)
}

/// Soft-delete an entry. Returns false when no active entry existed.
pub async fn remove_allowed_user(db: &DbConn, email: &str) -> Result<bool> {
    let result = AllowedUser::update_many()
        .col_expr(allowed_user::Column::Active, Expr::value(false))
        .filter(allowed_user::Column::Email.eq(normalize(email)))
        .filter(allowed_user::Column::Active.eq(true))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Active entries, newest first
pub async fn list_allowed_users(db: &DbConn) -> Result<Vec<allowed_user::Model>> {
    Ok(AllowedUser::find()
        .filter(allowed_user::Column::Active.eq(true))
        .order_by_desc(allowed_user::Column::AddedAt)
        .all(db)
        .await?)
}
