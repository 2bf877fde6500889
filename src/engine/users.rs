use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: usize,
}

/// Registration either created a user or found the existing one.
#[derive(Debug, Clone)]
pub enum Registration {
    Created(User),
    Existing(User),
}

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<Store>,
}

impl UserDirectory {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// New users always start as `user`; a known email is left untouched.
    pub fn register(&self, new_user: NewUser) -> Result<Registration, AppError> {
        let email = new_user.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(AppError::Validation("a valid email is required".to_string()));
        }

        match self.store.user_ids_by_email.entry(email.clone()) {
            Entry::Occupied(slot) => {
                let existing = self
                    .store
                    .users
                    .get(slot.get())
                    .map(|user| user.clone())
                    .ok_or_else(|| AppError::Internal(format!("user index out of sync for {email}")))?;
                Ok(Registration::Existing(existing))
            }
            Entry::Vacant(slot) => {
                let user = User {
                    id: Uuid::new_v4(),
                    email,
                    display_name: new_user.display_name,
                    photo_url: new_user.photo_url,
                    role: Role::User,
                    created_at: Utc::now(),
                };
                slot.insert(user.id);
                self.store.users.insert(user.id, user.clone());

                info!(user_id = %user.id, email = %user.email, "user registered");
                Ok(Registration::Created(user))
            }
        }
    }

    /// Case-insensitive search over display name and email, newest first.
    pub fn list(&self, query: &UserQuery) -> UserPage {
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase);

        let mut users: Vec<User> = self
            .store
            .users
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|user| match &needle {
                Some(needle) => {
                    user.email.contains(needle.as_str())
                        || user
                            .display_name
                            .as_deref()
                            .is_some_and(|name| name.to_lowercase().contains(needle.as_str()))
                }
                None => true,
            })
            .collect();

        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = users.len();
        let skip = query.skip.unwrap_or(0);
        let limit = query.limit.filter(|limit| *limit > 0).unwrap_or(usize::MAX);

        UserPage {
            users: users.into_iter().skip(skip).take(limit).collect(),
            total,
        }
    }

    pub fn role_of(&self, email: &str) -> Option<Role> {
        self.store
            .find_user_by_email(&email.trim().to_lowercase())
            .map(|user| user.role)
    }

    /// Operator action; any role may be assigned.
    pub fn set_role(&self, user_id: Uuid, role: Role) -> Result<User, AppError> {
        let mut user = self
            .store
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))?;

        user.role = role;
        info!(user_id = %user_id, role = ?role, "user role changed");
        Ok(user.clone())
    }
}
