//! Users and permissions.

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use vitrine_core::{Email, Permission, PermissionId, Profile, Role, UserId, UserWithPermissions};
use vitrine_storefront::backend::{
    Backend, BackendError, Direction, Embed, Filter, Query, decode_row, decode_rows, tables,
};
use vitrine_storefront::error::{Action, ActionContext, AppError, Result};

use crate::AdminContext;

/// Form for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: SecretString,
    pub full_name: String,
    pub role: Role,
    /// Permission names to grant.
    pub permissions: Vec<String>,
}

/// Form for an existing account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpdate {
    pub full_name: String,
    pub role: Role,
    /// Permission names the user should end up with.
    pub permissions: Vec<String>,
}

#[derive(Deserialize)]
struct GrantedPermission {
    permissions: Option<PermissionName>,
}

#[derive(Deserialize)]
struct PermissionName {
    name: String,
}

/// Account administration.
pub struct UserAdmin {
    ctx: AdminContext,
}

impl UserAdmin {
    pub(crate) const fn new(ctx: AdminContext) -> Self {
        Self { ctx }
    }

    fn backend(&self) -> &dyn Backend {
        self.ctx.backend()
    }

    /// Every profile, oldest first, with the names of its permissions.
    ///
    /// A user whose grants cannot be read is listed without permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the profiles query fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<UserWithPermissions>> {
        let query = Query::table(tables::PROFILES)
            .columns(["id", "username", "full_name", "role", "active"])
            .order("created_at", Direction::Asc);
        let rows = self.backend().select(&query).await.during(Action::LoadUsers)?;
        let profiles: Vec<Profile> = decode_rows(rows).during(Action::LoadUsers)?;

        let mut users = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let permissions = match self.granted(profile.id).await {
                Ok(names) => names,
                Err(e) => {
                    warn!(user_id = %profile.id, error = %e, "Could not load user permissions");
                    Vec::new()
                }
            };
            users.push(UserWithPermissions {
                profile,
                permissions,
            });
        }
        Ok(users)
    }

    /// One profile.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown id.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn profile(&self, id: UserId) -> Result<Profile> {
        let query = Query::table(tables::PROFILES).eq("id", id.to_string());
        match self.backend().select_single(&query).await {
            Ok(row) => decode_row(row).during(Action::LoadUsers),
            Err(BackendError::NotFound) => {
                Err(AppError::NotFound("Usuário não encontrado".to_owned()))
            }
            Err(e) => Err(e).during(Action::LoadUsers),
        }
    }

    /// Grantable permissions by name. Show them with [`Permission::label`].
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self))]
    pub async fn permissions(&self) -> Result<Vec<Permission>> {
        let query = Query::table(tables::PERMISSIONS).order("name", Direction::Asc);
        let rows = self
            .backend()
            .select(&query)
            .await
            .during(Action::LoadPermissions)?;
        decode_rows(rows).during(Action::LoadPermissions)
    }

    /// Sign up a new account and grant its permissions.
    ///
    /// The admin stays signed in; the new account is not adopted as the
    /// current session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Invalid`] for a malformed email, and an error if
    /// the sign-up or the grants fail.
    #[instrument(skip(self, user), fields(email = %user.email, role = %user.role))]
    pub async fn create(&self, user: &NewUser) -> Result<UserId> {
        let email =
            Email::parse(&user.email).map_err(|_| AppError::Invalid("Email inválido".to_owned()))?;
        let metadata = json!({
            "full_name": user.full_name,
            "role": user.role.as_str(),
        });

        let created = self
            .backend()
            .sign_up(&email, &user.password, metadata)
            .await
            .during(Action::CreateUser)?;

        self.replace_permissions(created.id, &user.permissions).await?;
        info!(user_id = %created.id, "User created");
        Ok(created.id)
    }

    /// Save name and role, then replace the permission grants.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile update or the grants fail.
    #[instrument(skip(self, update), fields(user_id = %id))]
    pub async fn update(&self, id: UserId, update: &UserUpdate) -> Result<()> {
        self.backend()
            .update(
                tables::PROFILES,
                json!({ "full_name": update.full_name, "role": update.role.as_str() }),
                &[Filter::eq("id", id.to_string())],
            )
            .await
            .during(Action::SaveUser)?;

        self.replace_permissions(id, &update.permissions).await
    }

    /// Revoke every grant of `user`, then grant `names`, recording the
    /// acting admin as grantor. Unknown names are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; grants may then be partially
    /// replaced.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn replace_permissions(&self, user: UserId, names: &[String]) -> Result<()> {
        self.backend()
            .delete(
                tables::USER_PERMISSIONS,
                &[Filter::eq("user_id", user.to_string())],
            )
            .await
            .during(Action::UpdatePermissions)?;

        if names.is_empty() {
            return Ok(());
        }

        let granted_by = self.ctx.admin().id;
        let grants: Vec<serde_json::Value> = self
            .permissions()
            .await?
            .into_iter()
            .filter(|permission| names.contains(&permission.name))
            .map(|permission| grant_row(user, permission.id, granted_by))
            .collect();
        if grants.is_empty() {
            return Ok(());
        }

        self.backend()
            .insert(tables::USER_PERMISSIONS, serde_json::Value::Array(grants))
            .await
            .during(Action::UpdatePermissions)?;
        Ok(())
    }

    /// Delete a profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete(&self, id: UserId) -> Result<()> {
        self.backend()
            .delete(tables::PROFILES, &[Filter::eq("id", id.to_string())])
            .await
            .during(Action::DeleteUser)?;
        info!("User deleted");
        Ok(())
    }

    /// Flip `active`; returns the new value.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn toggle_active(&self, id: UserId, active: bool) -> Result<bool> {
        let next = !active;
        self.backend()
            .update(
                tables::PROFILES,
                json!({ "active": next }),
                &[Filter::eq("id", id.to_string())],
            )
            .await
            .during(Action::ToggleUserStatus)?;
        Ok(next)
    }

    /// Switch between admin and customer; returns the new role.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn toggle_role(&self, id: UserId, role: Role) -> Result<Role> {
        let next = role.toggled();
        self.backend()
            .update(
                tables::PROFILES,
                json!({ "role": next.as_str() }),
                &[Filter::eq("id", id.to_string())],
            )
            .await
            .during(Action::ToggleUserRole)?;
        Ok(next)
    }

    async fn granted(&self, user: UserId) -> std::result::Result<Vec<String>, BackendError> {
        let query = Query::table(tables::USER_PERMISSIONS)
            .embed(Embed::to_one(tables::PERMISSIONS, "permission_id").columns(["name"]))
            .eq("user_id", user.to_string());
        let rows: Vec<GrantedPermission> = decode_rows(self.backend().select(&query).await?)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.permissions.map(|permission| permission.name))
            .collect())
    }
}

fn grant_row(user: UserId, permission: PermissionId, granted_by: UserId) -> serde_json::Value {
    json!({
        "user_id": user,
        "permission_id": permission,
        "granted_by": granted_by,
    })
}
