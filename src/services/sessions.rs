//! Server-side login sessions
//!
//! The session id travels in the `dashboard_session` cookie; the LMS token
//! never leaves the server.

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::db::DbConn;
use crate::error::Result;
use crate::models::prelude::*;
use crate::models::session;
use crate::services::lms::Department;

pub async fn create_session(
    db: &DbConn,
    username: &str,
    department: &Department,
    lms_token: &str,
    ttl_hours: i64,
) -> Result<session::Model> {
    let now = Utc::now();
    let model = session::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        username: Set(username.to_string()),
        department_id: Set(department.id.clone()),
        department_name: Set(department.name.clone()),
        lms_token: Set(lms_token.to_string()),
        is_admin: Set(false),
        created_at: Set(now),
        expires_at: Set(now + Duration::hours(ttl_hours)),
        last_accessed_at: Set(now),
    };

    let created = model.insert(db).await?;
    tracing::info!(
        session_id = %created.id,
        username = %created.username,
        department_id = %created.department_id,
        "Session created"
    );
    Ok(created)
}

/// Look up a live session and record the access. Expired rows are removed.
pub async fn get_active_session(db: &DbConn, session_id: &str) -> Result<Option<session::Model>> {
    let Some(found) = Session::find_by_id(session_id.to_string()).one(db).await? else {
        return Ok(None);
    };

    let now = Utc::now();
    if found.expires_at <= now {
        Session::delete_by_id(found.id.clone()).exec(db).await?;
        tracing::debug!(session_id = %found.id, "Removed expired session");
        return Ok(None);
    }

    let mut active: session::ActiveModel = found.into();
    active.last_accessed_at = Set(now);
    Ok(Some(active.update(db).await?))
}

pub async fn delete_session(db: &DbConn, session_id: &str) -> Result<()> {
    Session::delete_by_id(session_id.to_string()).exec(db).await?;
    Ok(())
}

/// Grant admin rights for the rest of the session
pub async fn mark_admin(db: &DbConn, found: session::Model) -> Result<session::Model> {
    let mut active: session::ActiveModel = found.into();
    active.is_admin = Set(true);
    Ok(active.update(db).await?)
}

pub async fn cleanup_expired_sessions(db: &DbConn) -> Result<u64> {
    let result = Session::delete_many()
        .filter(session::Column::ExpiresAt.lt(Utc::now()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_with_url;

    fn department() -> Department {
        Department {
            id: "7f3c2a9e-1b2d-4c5e-8f90-123456789abc".to_string(),
            name: "North Agency".to_string(),
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let db = connect_with_url("sqlite::memory:").await.unwrap();

        let created = create_session(&db, "agent@example.com", &department(), "tok", 4)
            .await
            .unwrap();
        assert!(!created.is_admin);
        assert_eq!(created.department_name, "North Agency");

        let found = get_active_session(&db, &created.id).await.unwrap().unwrap();
        assert_eq!(found.lms_token, "tok");

        let admin = mark_admin(&db, found).await.unwrap();
        assert!(admin.is_admin);

        delete_session(&db, &created.id).await.unwrap();
        assert!(get_active_session(&db, &created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let db = connect_with_url("sqlite::memory:").await.unwrap();

        let created = create_session(&db, "agent", &department(), "tok", -1)
            .await
            .unwrap();
        assert!(get_active_session(&db, &created.id).await.unwrap().is_none());
        assert!(Session::find_by_id(created.id).one(&db).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let db = connect_with_url("sqlite::memory:").await.unwrap();

        create_session(&db, "old", &department(), "a", -2).await.unwrap();
        let live = create_session(&db, "new", &department(), "b", 4).await.unwrap();

        assert_eq!(cleanup_expired_sessions(&db).await.unwrap(), 1);
        assert!(get_active_session(&db, &live.id).await.unwrap().is_some());
    }
}
