use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Роль приходит из токена шлюза авторизации; учётные записи здесь не хранятся
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Tenant,
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Tenant
    }
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Tenant => "tenant",
            UserRole::Admin => "admin",
        }
    }
}
