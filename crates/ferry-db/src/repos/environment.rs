//! Environment repository.

use chrono::Utc;

use ferry_core::entities::Environment;
use ferry_core::ids::PREFIX_ENVIRONMENT;

use crate::error::DatabaseError;
use crate::helpers::{get_bool, parse_datetime};
use crate::store::FerryStore;

const SELECT_COLS: &str = "id, name, base_url, username, password_configured, created_at";

fn row_to_environment(row: &libsql::Row) -> Result<Environment, DatabaseError> {
    Ok(Environment {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        username: row.get(3)?,
        password_configured: get_bool(row, 4)?,
        created_at: parse_datetime(&row.get::<String>(5)?)?,
    })
}

impl FerryStore {
    pub async fn create_environment(
        &self,
        name: &str,
        base_url: &str,
        username: &str,
        password_configured: bool,
    ) -> Result<Environment, DatabaseError> {
        let now = Utc::now();
        let id = self.db().generate_id(PREFIX_ENVIRONMENT).await?;

        let _guard = self.write().await;
        self.db()
            .conn()
            .execute(
                &format!("INSERT INTO environments ({SELECT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                libsql::params![
                    id.as_str(),
                    name,
                    base_url,
                    username,
                    i64::from(password_configured),
                    now.to_rfc3339()
                ],
            )
            .await?;

        Ok(Environment {
            id,
            name: name.to_string(),
            base_url: base_url.to_string(),
            username: username.to_string(),
            password_configured,
            created_at: now,
        })
    }

    pub async fn get_environment(&self, id: &str) -> Result<Environment, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM environments WHERE id = ?1"),
                [id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_environment(&row)
    }

    pub async fn list_environments(&self) -> Result<Vec<Environment>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM environments ORDER BY created_at, rowid"),
                (),
            )
            .await?;

        let mut envs = Vec::new();
        while let Some(row) = rows.next().await? {
            envs.push(row_to_environment(&row)?);
        }
        Ok(envs)
    }

    /// Update the only mutable attribute of an environment.
    pub async fn set_password_configured(
        &self,
        id: &str,
        configured: bool,
    ) -> Result<Environment, DatabaseError> {
        let affected = {
            let _guard = self.write().await;
            self.db()
                .conn()
                .execute(
                    "UPDATE environments SET password_configured = ?1 WHERE id = ?2",
                    libsql::params![i64::from(configured), id],
                )
                .await?
        };
        if affected == 0 {
            return Err(DatabaseError::NoResult);
        }
        self.get_environment(id).await
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_store;

    use super::*;

    #[tokio::test]
    async fn create_and_get() {
        let store = test_store().await;
        let env = store
            .create_environment("Production", "https://crm.example.com", "migrator", true)
            .await
            .unwrap();
        assert!(env.id.starts_with("env-"));

        let fetched = store.get_environment(&env.id).await.unwrap();
        assert_eq!(fetched.name, "Production");
        assert!(fetched.password_configured);
    }

    #[tokio::test]
    async fn missing_environment_is_no_result() {
        let store = test_store().await;
        let err = store.get_environment("env-ffffffff").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NoResult));
    }

    #[tokio::test]
    async fn list_in_creation_order() {
        let store = test_store().await;
        store.create_environment("A", "https://a", "u", false).await.unwrap();
        store.create_environment("B", "https://b", "u", false).await.unwrap();
        let names: Vec<_> = store
            .list_environments()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn password_flag_toggles() {
        let store = test_store().await;
        let env = store.create_environment("A", "https://a", "u", false).await.unwrap();
        let updated = store.set_password_configured(&env.id, true).await.unwrap();
        assert!(updated.password_configured);
        assert!(matches!(
            store.set_password_configured("env-ffffffff", true).await,
            Err(DatabaseError::NoResult)
        ));
    }
}
