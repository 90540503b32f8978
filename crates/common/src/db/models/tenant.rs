//! Tenant entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub name: String,

    /// ollama | open_ai
    #[sea_orm(column_type = "Text")]
    pub provider: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub provider_endpoint: Option<String>,

    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text", nullable)]
    pub provider_api_key: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub llm_model: String,

    #[sea_orm(column_type = "Text")]
    pub embedding_model: String,

    /// Explicit prompt family; inferred from `llm_model` when null
    #[sea_orm(column_type = "Text", nullable)]
    pub prompt_family: Option<String>,

    pub enable_summary_embedding: bool,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::conversation::Entity")]
    Conversations,
}

impl Related<super::conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
