//! IdGenerator port - ID 生成の抽象化
//!
//! テスト容易性のために trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: `<prefix>-<ULID>` 形式（既定の prefix は `task`）

use crate::domain::{IdError, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

pub const DEFAULT_PREFIX: &str = "task";

/// ULID の時刻部分は 48-bit
const MAX_ULID_MILLIS: i64 = (1_i64 << 48) - 1;

/// IdGenerator はタスク ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    /// Task ID を生成
    ///
    /// 失敗した場合、キューは一切変更されない。
    fn generate_task_id(&self) -> Result<TaskId, IdError>;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// これにより、テスト時に FixedClock を使って時刻部分を固定できます。
#[derive(Debug, Clone)]
pub struct UlidGenerator<C> {
    clock: C,
    prefix: String,
}

impl<C: Clock> UlidGenerator<C> {
    /// 新しい UlidGenerator を作成（prefix は `task`）
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// prefix を差し替える。`[a-z][a-z0-9_-]{0,31}` 以外は拒否。
    pub fn with_prefix(clock: C, prefix: &str) -> Result<Self, IdError> {
        if !is_valid_prefix(prefix) {
            return Err(IdError::InvalidPrefix(prefix.to_string()));
        }
        Ok(Self {
            clock,
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 指定したミリ秒時刻で ID を生成
    pub fn generate_at(&self, timestamp_ms: i64) -> Result<TaskId, IdError> {
        if !(0..=MAX_ULID_MILLIS).contains(&timestamp_ms) {
            return Err(IdError::TimestampOutOfRange(timestamp_ms));
        }
        let ulid = Ulid::from_parts(timestamp_ms as u64, rand::random());
        Ok(TaskId::new(format!("{}-{}", self.prefix, ulid)))
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> Result<TaskId, IdError> {
        self.generate_at(self.clock.now().timestamp_millis())
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_lowercase()
        && prefix.len() <= 32
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let ids: HashSet<TaskId> = (0..1000)
            .map(|_| id_gen.generate_task_id().unwrap())
            .collect();

        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_task_id().unwrap();
        let id2 = id_gen.generate_task_id().unwrap();

        // ランダム部分があるので ID は異なる
        assert_ne!(id1, id2);

        // ただし、timestamp 部分は同じはず
        let ulid1 = Ulid::from_string(id1.as_str().trim_start_matches("task-")).unwrap();
        let ulid2 = Ulid::from_string(id2.as_str().trim_start_matches("task-")).unwrap();
        assert_eq!(ulid1.timestamp_ms(), ulid2.timestamp_ms());
        assert_eq!(ulid1.timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }

    #[test]
    fn default_prefix_is_task() {
        let id = UlidGenerator::new(SystemClock).generate_task_id().unwrap();
        assert!(id.as_str().starts_with("task-"));
        assert_eq!(id.as_str().len(), "task-".len() + 26);
    }

    #[rstest]
    #[case("job", true)]
    #[case("a", true)]
    #[case("build_step-2", true)]
    #[case("", false)]
    #[case("Task", false)]
    #[case("9lives", false)]
    #[case("has space", false)]
    #[case("abcdefghijklmnopqrstuvwxyzabcdefg", false)]
    fn prefix_validation(#[case] prefix: &str, #[case] ok: bool) {
        let result = UlidGenerator::with_prefix(SystemClock, prefix);
        assert_eq!(result.is_ok(), ok, "prefix {prefix:?}");
        if !ok {
            assert!(matches!(result, Err(IdError::InvalidPrefix(_))));
        }
    }

    #[rstest]
    #[case(-1)]
    #[case(1_i64 << 48)]
    fn out_of_range_timestamps_are_rejected(#[case] ms: i64) {
        let id_gen = UlidGenerator::new(SystemClock);
        assert_eq!(id_gen.generate_at(ms), Err(IdError::TimestampOutOfRange(ms)));
    }
}
