//! 调用方侧持久化：会话存储与进度计算

pub mod progress;
pub mod sqlite;

pub use progress::{milestone_for, next_streak, DailyLog, Milestone, Notification};
pub use sqlite::{PersistOutcome, SessionStore, SqliteStore};
