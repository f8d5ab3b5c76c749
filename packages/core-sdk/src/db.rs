use anyhow::Result;
use rusqlite::{params, ErrorCode, OptionalExtension};
pub use rusqlite::Connection;
use std::{thread, time::Duration};

use crate::config::validate_api_key;

pub const ENV_DB_PATH: &str = "DSA_DB_PATH";

const KEY_API_KEY: &str = "api_key";
const KEY_TELEMETRY: &str = "telemetry_enabled";

/**
 * \brief 打开默认设置库（默认为当前目录下的 dsa-instructor.db，可由 DSA_DB_PATH 覆盖）。
 */
pub fn open_default_db() -> Result<Connection> {
    let path = std::env::var(ENV_DB_PATH).unwrap_or_else(|_| "dsa-instructor.db".to_string());
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief 运行迁移，创建键值设置表。
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
        )
    })?;
    Ok(())
}

/**
 * \brief 写入设置项（存在则覆盖）。
 */
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )
    })?;
    Ok(())
}

/**
 * \brief 读取设置项。
 */
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let val = conn
        .query_row(
            "SELECT value FROM app_config WHERE key=?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(val)
}

pub fn delete_setting(conn: &Connection, key: &str) -> Result<()> {
    retry_on_locked(|| conn.execute("DELETE FROM app_config WHERE key=?1", params![key]))?;
    Ok(())
}

/**
 * \brief 读取本地保存的 API Key（明文存储，仅限本机使用）。
 */
pub fn get_api_key(conn: &Connection) -> Result<Option<String>> {
    Ok(get_setting(conn, KEY_API_KEY)?.filter(|k| !k.trim().is_empty()))
}

/**
 * \brief 保存 API Key；占位值或空值直接拒绝。
 */
pub fn set_api_key(conn: &Connection, key: &str) -> Result<()> {
    let key = validate_api_key(Some(key))?;
    set_setting(conn, KEY_API_KEY, key)
}

pub fn clear_api_key(conn: &Connection) -> Result<()> {
    delete_setting(conn, KEY_API_KEY)
}

/**
 * \brief 读取遥测开关。
 */
pub fn get_telemetry_enabled(conn: &Connection) -> Result<bool> {
    Ok(get_setting(conn, KEY_TELEMETRY)?
        .map(|s| s == "1")
        .unwrap_or(false))
}

/**
 * \brief 更新遥测开关。
 */
pub fn set_telemetry_enabled(conn: &Connection, enabled: bool) -> Result<()> {
    set_setting(conn, KEY_TELEMETRY, if enabled { "1" } else { "0" })
}

/**
 * \brief 针对 SQLite 锁冲突的重试助手。
 * \details 捕获 `database is locked`/`database table is locked` 等错误并进行退避，最大尝试 6 次。
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    let mut attempt = 0;
    loop {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(200 * attempt as u64));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
