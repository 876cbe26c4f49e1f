use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "exam_overrides")]
pub struct Model {
    /// Lower-cased student email
    #[sea_orm(primary_key, auto_increment = false)]
    pub email: String,
    pub pass_fail: String,
    pub exam_date: String,
    pub exam_time: String,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
