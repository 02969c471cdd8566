use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub company_name: String,
    pub tax_id: Option<String>,
    pub is_admin: bool,
    pub reset_token: Option<String>,
    pub reset_token_expiry: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub company_name: String,
    pub tax_id: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(User, foreign_key = owner_user_id))]
pub struct Document {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub stored_filename: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub stored_filename: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = services)]
#[diesel(belongs_to(User, foreign_key = owner_user_id))]
pub struct Service {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = services)]
pub struct NewService {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = leads)]
pub struct Lead {
    pub id: Uuid,
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub need: Option<String>,
    pub summary: String,
    pub transcript: String,
    pub attribution: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = leads)]
pub struct NewLead {
    pub id: Uuid,
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub need: Option<String>,
    pub summary: String,
    pub transcript: String,
    pub attribution: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Invoice,
    Contract,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Contract => "contract",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "invoice" => Ok(DocumentKind::Invoice),
            "contract" => Ok(DocumentKind::Contract),
            other => Err(format!("unknown document type `{other}`")),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Finished,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Active => "active",
            ServiceStatus::Finished => "finished",
        }
    }

    /// The status a toggle moves to. Applying it twice yields the original.
    pub fn toggled(self) -> Self {
        match self {
            ServiceStatus::Active => ServiceStatus::Finished,
            ServiceStatus::Finished => ServiceStatus::Active,
        }
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ServiceStatus::Active),
            "finished" => Ok(ServiceStatus::Finished),
            other => Err(format!("unknown service status `{other}`")),
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
