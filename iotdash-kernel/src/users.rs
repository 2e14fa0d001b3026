use crate::error::StoreError;
use crate::store::JsonFile;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Coût bcrypt des mots de passe
pub const PASSWORD_COST: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
}

pub struct UserStore {
    users: JsonFile<Vec<User>>,
    cost: u32,
}

impl UserStore {
    pub fn in_memory() -> Self {
        Self { users: JsonFile::in_memory(), cost: PASSWORD_COST }
    }

    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let users = JsonFile::open(path).await?;
        info!("[users] loaded {} accounts", users.read(|u: &Vec<User>| u.len()));
        Ok(Self { users, cost: PASSWORD_COST })
    }

    #[cfg(test)]
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Crée un compte ; `None` si l'email existe déjà
    pub async fn register(&self, name: Option<String>, email: &str, password: &str) -> Result<Option<User>, StoreError> {
        if self.find_by_email(email).is_some() {
            return Ok(None);
        }

        let password = password.to_string();
        let cost = self.cost;
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;

        let created = self.users.update(|users| {
            if users.iter().any(|u| u.email == email) {
                return None;
            }
            let user = User {
                id: Uuid::new_v4().to_string(),
                name,
                email: email.to_string(),
                password_hash,
            };
            users.push(user.clone());
            Some(user)
        }).await?;

        if let Some(user) = &created {
            info!("[users] registered {} ({})", user.id, user.email);
        }
        Ok(created)
    }

    /// Vérifie email + mot de passe ; `None` si l'un des deux est faux
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, StoreError> {
        let Some(user) = self.find_by_email(email) else {
            return Ok(None);
        };

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
        Ok(ok.then_some(user))
    }

    pub fn get(&self, id: &str) -> Option<User> {
        self.users.read(|users| users.iter().find(|u| u.id == id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Option<User> {
        self.users.read(|users| users.iter().find(|u| u.email == email).cloned())
    }
}
