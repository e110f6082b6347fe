//! Profiles and permissions.

use serde::{Deserialize, Serialize};

use super::de::null_as_default;
use super::id::{PermissionId, UserId};
use super::role::Role;

/// Only the `role` column of a profile, used after sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProfileRole {
    pub role: Role,
}

/// A `profiles` row as listed in the back office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

/// A grantable permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

impl Permission {
    /// Portuguese label for a permission name; unknown names are shown as-is.
    #[must_use]
    pub fn label_for(name: &str) -> &str {
        match name {
            "view_products" => "Visualizar Produtos",
            "manage_cart" => "Gerenciar Carrinho",
            "view_orders" => "Visualizar Pedidos",
            "manage_products" => "Gerenciar Produtos",
            "manage_categories" => "Gerenciar Categorias",
            "manage_users" => "Gerenciar Usuários",
            "view_analytics" => "Visualizar Análises",
            other => other,
        }
    }

    /// Portuguese label for this permission.
    #[must_use]
    pub fn label(&self) -> &str {
        Self::label_for(&self.name)
    }
}

/// A profile with the names of its granted permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserWithPermissions {
    #[serde(flatten)]
    pub profile: Profile,
    pub permissions: Vec<String>,
}

impl UserWithPermissions {
    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|granted| granted == name)
    }
}
