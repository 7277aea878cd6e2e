use std::path::Path;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use kinship_initdata::TelegramUser;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};
use tokio_rusqlite::Connection;
use uuid::Uuid;

#[derive(Clone)]
pub struct Db {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub telegram_id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    pub language_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, telegram_id, first_name, last_name, username, photo_url, \
     language_code, created_at_rfc3339, last_login_at_rfc3339";

impl Db {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db dir {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .await
            .with_context(|| format!("open sqlite {}", path.display()))?;
        Ok(Self { conn })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        self.conn
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn.execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS users (
                      id                    TEXT PRIMARY KEY,
                      telegram_id           INTEGER NOT NULL UNIQUE,
                      first_name            TEXT NOT NULL,
                      last_name             TEXT,
                      username              TEXT,
                      photo_url             TEXT,
                      language_code         TEXT,
                      created_at_rfc3339    TEXT NOT NULL,
                      updated_at_rfc3339    TEXT NOT NULL,
                      last_login_at_rfc3339 TEXT NOT NULL
                    );
                    "#,
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Find-or-create keyed by platform id. One statement, so concurrent first logins for the
    /// same user land on the same row. Display fields are refreshed on every login.
    pub async fn upsert_telegram_user(&self, user: &TelegramUser) -> anyhow::Result<UserRecord> {
        let new_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let telegram_id = user.id;
        let first_name = user.first_name.clone();
        let last_name = user.last_name.clone();
        let username = user.username.clone();
        let photo_url = user.photo_url.clone();
        let language_code = user.language_code.clone();

        let record = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"
                    INSERT INTO users(id, telegram_id, first_name, last_name, username, photo_url,
                                      language_code, created_at_rfc3339, updated_at_rfc3339,
                                      last_login_at_rfc3339)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8)
                    ON CONFLICT(telegram_id) DO UPDATE SET
                      first_name=excluded.first_name,
                      last_name=excluded.last_name,
                      username=excluded.username,
                      photo_url=excluded.photo_url,
                      language_code=excluded.language_code,
                      updated_at_rfc3339=excluded.updated_at_rfc3339,
                      last_login_at_rfc3339=excluded.last_login_at_rfc3339
                    RETURNING {USER_COLUMNS}
                    "#
                );
                Ok(conn.query_row(
                    &sql,
                    params![
                        new_id,
                        telegram_id,
                        first_name,
                        last_name,
                        username,
                        photo_url,
                        language_code,
                        now,
                    ],
                    user_from_row,
                )?)
            })
            .await
            .context("upsert user")?;
        Ok(record)
    }

    pub async fn get_user(&self, id: &str) -> anyhow::Result<Option<UserRecord>> {
        let id = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id=?1"),
                        params![id],
                        user_from_row,
                    )
                    .optional()?)
            })
            .await?;
        Ok(row)
    }

    pub async fn count_users(&self) -> anyhow::Result<i64> {
        let n = self
            .conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?))
            .await?;
        Ok(n)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let created_at: String = row.get(7)?;
    let last_login_at: String = row.get(8)?;
    Ok(UserRecord {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        username: row.get(4)?,
        photo_url: row.get(5)?,
        language_code: row.get(6)?,
        created_at: parse_rfc3339(7, &created_at)?,
        last_login_at: parse_rfc3339(8, &last_login_at)?,
    })
}

fn parse_rfc3339(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
