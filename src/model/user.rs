use std::str::FromStr;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Utc};
use diesel::dsl;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;
use crate::database::Conn;

use super::schema::user;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl FromStr for UserRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            other => Err(Error::validation(format!("unknown role: {other}"))),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = user)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub email: String,
    pub role: String,
    pub groups: String,
    pub inventories: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub async fn by_username(username: &str, conn: &mut Conn<'_>) -> Result<Self> {
        let found = user::table
            .filter(user::username.eq(username))
            .get_result(conn)
            .await?;
        Ok(found)
    }

    pub async fn maybe_by_username(username: &str, conn: &mut Conn<'_>) -> Result<Option<Self>> {
        let found = user::table
            .filter(user::username.eq(username))
            .get_result(conn)
            .await
            .optional()?;
        Ok(found)
    }

    pub async fn by_id(id: i64, conn: &mut Conn<'_>) -> Result<Self> {
        let found = user::table.find(id).get_result(conn).await?;
        Ok(found)
    }

    pub async fn list(conn: &mut Conn<'_>) -> Result<Vec<Self>> {
        let users = user::table.order(user::username.asc()).get_results(conn).await?;
        Ok(users)
    }

    pub async fn count(conn: &mut Conn<'_>) -> Result<i64> {
        let n: i64 = user::table.select(dsl::count_star()).get_result(conn).await?;
        Ok(n)
    }

    pub async fn delete(username: &str, conn: &mut Conn<'_>) -> Result<usize> {
        let n_rows = diesel::delete(user::table.filter(user::username.eq(username)))
            .execute(conn)
            .await?;
        Ok(n_rows)
    }

    pub async fn set_groups(username: &str, groups: &str, conn: &mut Conn<'_>) -> Result<Self> {
        let updated = diesel::update(user::table.filter(user::username.eq(username)))
            .set((user::groups.eq(groups), user::updated_at.eq(Utc::now())))
            .get_result(conn)
            .await?;
        Ok(updated)
    }

    pub fn verify_password(&self, password: &str) -> Result<()> {
        let parsed =
            PasswordHash::new(&self.password_hash).map_err(|_| Error::Unauthenticated)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| Error::Unauthenticated)
    }

    pub fn role(&self) -> UserRole {
        UserRole::from_str(&self.role).unwrap_or(UserRole::User)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == UserRole::Admin
    }

    /// Inventory names this user may see. Admins bypass this entirely.
    pub fn inventory_list(&self) -> Vec<String> {
        self.inventories
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn can_see_inventory(&self, inventory: &str) -> bool {
        self.is_admin() || self.inventory_list().iter().any(|i| i == inventory)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub role: String,
    pub groups: String,
    pub inventories: String,
}

impl NewUser {
    pub fn new(
        username: &str,
        password: &str,
        email: &str,
        role: UserRole,
    ) -> Result<Self> {
        Ok(NewUser {
            username: username.to_string(),
            password_hash: hash_password(password)?,
            email: email.to_string(),
            role: role.to_string(),
            groups: super::host::NIL.to_string(),
            inventories: String::new(),
        })
    }

    pub async fn create(self, conn: &mut Conn<'_>) -> Result<User> {
        let created = diesel::insert_into(user::table)
            .values(self)
            .get_result(conn)
            .await?;
        Ok(created)
    }
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = user)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub groups: Option<String>,
    pub inventories: Option<String>,
}

impl UpdateUser {
    pub async fn apply(self, username: &str, conn: &mut Conn<'_>) -> Result<User> {
        let updated = diesel::update(user::table.filter(user::username.eq(username)))
            .set((self, user::updated_at.eq(Utc::now())))
            .get_result(conn)
            .await?;
        Ok(updated)
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| Error::validation(format!("cannot hash password: {err}")))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(role: &str, inventories: &str) -> User {
        User {
            id: 1,
            username: "ops".to_string(),
            password_hash: String::new(),
            email: "ops@example.com".to_string(),
            role: role.to_string(),
            groups: "nil".to_string(),
            inventories: inventories.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn password_round_trip() {
        let user = User {
            password_hash: hash_password("s3cret").unwrap(),
            ..sample("user", "")
        };
        assert!(user.verify_password("s3cret").is_ok());
        assert!(user.verify_password("wrong").is_err());
    }

    #[test]
    fn inventory_scope() {
        let user = sample("user", "default, staging");
        assert_eq!(user.inventory_list(), vec!["default", "staging"]);
        assert!(user.can_see_inventory("staging"));
        assert!(!user.can_see_inventory("production"));

        let admin = sample("admin", "");
        assert!(admin.can_see_inventory("production"));
    }

    #[test]
    fn unknown_role_degrades_to_user() {
        assert_eq!(sample("superuser", "").role(), UserRole::User);
        assert_eq!(sample("admin", "").role(), UserRole::Admin);
    }
}
