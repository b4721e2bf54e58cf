//! 进度计算：连续达标天数与里程碑

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 触发里程碑的连续达标天数
pub const MILESTONE_DAYS: [u32; 5] = [7, 30, 90, 180, 365];

/// 每杯估算节省的金额（美元）
pub const MONEY_PER_DRINK_USD: f64 = 10.0;
/// 每杯估算避免的热量（千卡）
pub const CALORIES_PER_DRINK: f64 = 100.0;

/// 一天的汇总记录：每个用户每个 UTC 日期一条，当天的多次会话累加到同一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    pub user_id: String,
    /// 最近一次写入该日记录的会话
    pub session_id: String,
    pub day: NaiveDate,
    pub total_pure_alcohol_ml: f64,
    pub met_goal: bool,
    pub drinks: f64,
    pub streak: u32,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub user_id: String,
    pub label: String,
    pub streak: u32,
    pub money_saved_usd: f64,
    pub calories_avoided: f64,
    pub message: String,
    pub achieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
}

/// 计算 day 这一天的连续达标天数
///
/// previous 为 day 之前最近的一条日记录。未达标归零；
/// 达标时只有前一天恰好有达标记录才 +1，中间有空缺则从 1 开始。
pub fn next_streak(previous: Option<&DailyLog>, day: NaiveDate, meets_goal: bool) -> u32 {
    if !meets_goal {
        return 0;
    }
    match previous {
        Some(last) if last.met_goal && day.pred_opt() == Some(last.day) => last.streak + 1,
        _ => 1,
    }
}

/// 连续天数恰好命中里程碑时生成里程碑记录
pub fn milestone_for(user_id: &str, streak: u32, drinks: f64) -> Option<Milestone> {
    if !MILESTONE_DAYS.contains(&streak) {
        return None;
    }
    let money_saved_usd = drinks * MONEY_PER_DRINK_USD;
    let calories_avoided = drinks * CALORIES_PER_DRINK;
    Some(Milestone {
        user_id: user_id.to_string(),
        label: format!("{} days on track", streak),
        streak,
        money_saved_usd,
        calories_avoided,
        message: format!(
            "Congratulations on {} days on track! That's about ${:.0} saved and {:.0} calories avoided.",
            streak, money_saved_usd, calories_avoided
        ),
        achieved_at: Utc::now(),
    })
}

impl Milestone {
    /// 里程碑对应的推送通知
    pub fn notification(&self) -> Notification {
        Notification {
            user_id: self.user_id.clone(),
            kind: "milestone".to_string(),
            message: self.message.clone(),
            status: "sent".to_string(),
            sent_at: self.achieved_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn log(on: NaiveDate, met_goal: bool, streak: u32) -> DailyLog {
        DailyLog {
            user_id: "u".to_string(),
            session_id: "s".to_string(),
            day: on,
            total_pure_alcohol_ml: 18.0,
            met_goal,
            drinks: 1.0,
            streak,
            logged_at: Utc::now(),
        }
    }

    #[test]
    fn test_streak_rules() {
        assert_eq!(next_streak(None, day(10), true), 1);
        assert_eq!(next_streak(None, day(10), false), 0);
        assert_eq!(next_streak(Some(&log(day(9), true, 4)), day(10), true), 5);
        assert_eq!(next_streak(Some(&log(day(9), false, 0)), day(10), true), 1);
        assert_eq!(next_streak(Some(&log(day(9), true, 6)), day(10), false), 0);
    }

    #[test]
    fn test_streak_restarts_after_gap() {
        assert_eq!(next_streak(Some(&log(day(7), true, 4)), day(10), true), 1);
        // 跨月的前一天仍算连续
        let sept_30 = NaiveDate::from_ymd_opt(2026, 9, 30).unwrap();
        assert_eq!(next_streak(Some(&log(sept_30, true, 2)), day(1), true), 3);
    }

    #[test]
    fn test_milestone_only_on_thresholds() {
        assert!(milestone_for("u", 6, 1.0).is_none());
        assert!(milestone_for("u", 8, 1.0).is_none());

        let m = milestone_for("u", 7, 2.0).unwrap();
        assert_eq!(m.label, "7 days on track");
        assert_eq!(m.money_saved_usd, 20.0);
        assert_eq!(m.calories_avoided, 200.0);

        let n = m.notification();
        assert_eq!(n.kind, "milestone");
        assert_eq!(n.status, "sent");
        assert_eq!(n.message, m.message);
    }
}
