//! SQLite 会话存储
//!
//! 编排核心不做任何 I/O；调用方拿到最终状态后通过 SessionStore 持久化。
//! 一次 persist_run 在单个事务内写入消息、饮酒记录、触发因素，
//! 有饮酒记录时再把本次饮酒量累加进当日（UTC）汇总，并写入里程碑与通知。

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::core::ConversationState;
use crate::memory::{Message, Role};
use crate::store::progress::{milestone_for, next_streak, DailyLog, Milestone, Notification};

/// 一次持久化的结果（CLI 用于展示进度）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistOutcome {
    pub messages_written: usize,
    pub daily_log: Option<DailyLog>,
    pub milestone: Option<Milestone>,
}

/// 会话存储接口
pub trait SessionStore: Send + Sync {
    fn persist_run(&self, state: &ConversationState) -> Result<PersistOutcome>;
    /// 用户最近 limit 条消息，按时间正序
    fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<Message>>;
    fn latest_daily_log(&self, user_id: &str) -> Result<Option<DailyLog>>;
    fn milestones(&self, user_id: &str) -> Result<Vec<Milestone>>;
    fn notifications(&self, user_id: &str) -> Result<Vec<Notification>>;
}

const SCHEMA: &str = "BEGIN;
CREATE TABLE IF NOT EXISTS messages(
    session_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY(session_id, seq)
);
CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, created_at);
CREATE TABLE IF NOT EXISTS beverage_logs(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    pure_alcohol_ml REAL NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS triggers(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    trigger_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS daily_logs(
    user_id TEXT NOT NULL,
    day TEXT NOT NULL,
    session_id TEXT NOT NULL,
    total_pure_alcohol_ml REAL NOT NULL,
    met_goal INTEGER NOT NULL,
    drinks REAL NOT NULL,
    streak INTEGER NOT NULL,
    logged_at TEXT NOT NULL,
    PRIMARY KEY(user_id, day)
);
CREATE TABLE IF NOT EXISTS milestones(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    label TEXT NOT NULL,
    streak INTEGER NOT NULL,
    money_saved_usd REAL NOT NULL,
    calories_avoided REAL NOT NULL,
    message TEXT NOT NULL,
    achieved_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS notifications(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    message TEXT NOT NULL,
    status TEXT NOT NULL,
    sent_at TEXT NOT NULL
);
COMMIT;";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("creating schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("connection lock poisoned"))
    }
}

const DAILY_LOG_COLUMNS: &str =
    "user_id, day, session_id, total_pure_alcohol_ml, met_goal, drinks, streak, logged_at";

fn daily_log_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyLog> {
    Ok(DailyLog {
        user_id: row.get(0)?,
        day: row.get(1)?,
        session_id: row.get(2)?,
        total_pure_alcohol_ml: row.get(3)?,
        met_goal: row.get(4)?,
        drinks: row.get(5)?,
        streak: row.get(6)?,
        logged_at: row.get(7)?,
    })
}

fn query_latest_daily_log(conn: &Connection, user_id: &str) -> Result<Option<DailyLog>> {
    let sql = format!(
        "SELECT {} FROM daily_logs WHERE user_id = ?1 ORDER BY day DESC LIMIT 1",
        DAILY_LOG_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![user_id], daily_log_from_row)
        .optional()?)
}

fn query_daily_log_on(conn: &Connection, user_id: &str, day: NaiveDate) -> Result<Option<DailyLog>> {
    let sql = format!(
        "SELECT {} FROM daily_logs WHERE user_id = ?1 AND day = ?2",
        DAILY_LOG_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![user_id, day], daily_log_from_row)
        .optional()?)
}

fn query_daily_log_before(conn: &Connection, user_id: &str, day: NaiveDate) -> Result<Option<DailyLog>> {
    let sql = format!(
        "SELECT {} FROM daily_logs WHERE user_id = ?1 AND day < ?2 ORDER BY day DESC LIMIT 1",
        DAILY_LOG_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![user_id, day], daily_log_from_row)
        .optional()?)
}

fn write_daily_log(
    tx: &Transaction<'_>,
    state: &ConversationState,
    now: DateTime<Utc>,
) -> Result<Option<(DailyLog, Option<Milestone>)>> {
    if state.beverage_logs.is_empty() {
        return Ok(None);
    }
    let day = now.date_naive();
    let run_total: f64 = state
        .beverage_logs
        .iter()
        .map(|l| l.total_pure_alcohol_ml)
        .sum();
    let run_drinks: f64 = state.beverage_logs.iter().map(|l| l.quantity).sum();
    let daily_goal_ml = state
        .beverage_logs
        .iter()
        .map(|l| l.daily_goal_ml)
        .fold(f64::INFINITY, f64::min);

    let today = query_daily_log_on(tx, &state.user_id, day)?;
    let (total, drinks) = match &today {
        Some(t) => (t.total_pure_alcohol_ml + run_total, t.drinks + run_drinks),
        None => (run_total, run_drinks),
    };
    let total = (total * 100.0).round() / 100.0;
    // 达标与否看当天累计量，而不是最后一次计算
    let met_goal = total <= daily_goal_ml;

    let previous = query_daily_log_before(tx, &state.user_id, day)?;
    let streak = next_streak(previous.as_ref(), day, met_goal);
    let log = DailyLog {
        user_id: state.user_id.clone(),
        session_id: state.session_id.clone(),
        day,
        total_pure_alcohol_ml: total,
        met_goal,
        drinks,
        streak,
        logged_at: now,
    };
    tx.execute(
        "INSERT INTO daily_logs(user_id, day, session_id, total_pure_alcohol_ml, met_goal, drinks, streak, logged_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(user_id, day) DO UPDATE SET
             session_id = excluded.session_id,
             total_pure_alcohol_ml = excluded.total_pure_alcohol_ml,
             met_goal = excluded.met_goal,
             drinks = excluded.drinks,
             streak = excluded.streak,
             logged_at = excluded.logged_at",
        params![
            log.user_id,
            log.day,
            log.session_id,
            log.total_pure_alcohol_ml,
            log.met_goal,
            log.drinks,
            log.streak,
            log.logged_at
        ],
    )?;

    // 同一天再次写入时连续天数不变，不重复发里程碑
    let streak_changed = today.as_ref().map(|t| t.streak) != Some(streak);
    let milestone = if streak_changed {
        milestone_for(&state.user_id, streak, drinks)
    } else {
        None
    };
    if let Some(m) = &milestone {
        tx.execute(
            "INSERT INTO milestones(user_id, label, streak, money_saved_usd, calories_avoided, message, achieved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                m.user_id,
                m.label,
                m.streak,
                m.money_saved_usd,
                m.calories_avoided,
                m.message,
                m.achieved_at
            ],
        )?;
        let n = m.notification();
        tx.execute(
            "INSERT INTO notifications(user_id, kind, message, status, sent_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![n.user_id, n.kind, n.message, n.status, n.sent_at],
        )?;
        tracing::info!(user_id = %m.user_id, label = %m.label, "milestone reached");
    }
    Ok(Some((log, milestone)))
}

impl SqliteStore {
    /// 以给定时刻持久化一次运行；当日汇总按 now 的 UTC 日期归档
    pub fn persist_run_at(&self, state: &ConversationState, now: DateTime<Utc>) -> Result<PersistOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // 同一会话的历史每轮都会完整带回，按 (session_id, seq) 去重
        let mut messages_written = 0;
        for (seq, msg) in state.messages.iter().enumerate() {
            messages_written += tx.execute(
                "INSERT OR IGNORE INTO messages(session_id, seq, user_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![state.session_id, seq as i64, state.user_id, msg.role.as_str(), msg.content, now],
            )?;
        }

        for log in &state.beverage_logs {
            let payload = serde_json::to_string(log)?;
            tx.execute(
                "INSERT INTO beverage_logs(session_id, user_id, payload, pure_alcohol_ml, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![state.session_id, state.user_id, payload, log.total_pure_alcohol_ml, now],
            )?;
        }

        if let Some(trigger) = state.trigger_type {
            tx.execute(
                "INSERT INTO triggers(session_id, user_id, trigger_type, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![state.session_id, state.user_id, trigger.as_str(), now],
            )?;
        }

        let daily = write_daily_log(&tx, state, now)?;
        tx.commit()?;

        tracing::debug!(
            session_id = %state.session_id,
            messages_written,
            beverage_logs = state.beverage_logs.len(),
            "run persisted"
        );
        let (daily_log, milestone) = match daily {
            Some((log, milestone)) => (Some(log), milestone),
            None => (None, None),
        };
        Ok(PersistOutcome {
            messages_written,
            daily_log,
            milestone,
        })
    }
}

impl SessionStore for SqliteStore {
    fn persist_run(&self, state: &ConversationState) -> Result<PersistOutcome> {
        self.persist_run_at(state, Utc::now())
    }

    fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT role, content FROM messages WHERE user_id = ?1
             ORDER BY created_at DESC, seq DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            let role: String = row.get(0)?;
            Ok(Message {
                role: Role::from_str_lossy(&role),
                content: row.get(1)?,
            })
        })?;
        let mut messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    fn latest_daily_log(&self, user_id: &str) -> Result<Option<DailyLog>> {
        let conn = self.lock()?;
        query_latest_daily_log(&conn, user_id)
    }

    fn milestones(&self, user_id: &str) -> Result<Vec<Milestone>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, label, streak, money_saved_usd, calories_avoided, message, achieved_at
             FROM milestones WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Milestone {
                user_id: row.get(0)?,
                label: row.get(1)?,
                streak: row.get(2)?,
                money_saved_usd: row.get(3)?,
                calories_avoided: row.get(4)?,
                message: row.get(5)?,
                achieved_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, kind, message, status, sent_at FROM notifications WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Notification {
                user_id: row.get(0)?,
                kind: row.get(1)?,
                message: row.get(2)?,
                status: row.get(3)?,
                sent_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
