use serde::{Deserialize, Serialize};

/// Storage key for the single save record. Changing it orphans every existing save.
pub(crate) const SAVE_KEY: &str = "xiaoyin_pet_save_v1";

pub(crate) const STAT_MAX: i64 = 100;
pub(crate) const DEFAULT_AFFECTION: u8 = 0;
pub(crate) const DEFAULT_HUNGER: u8 = 100;
pub(crate) const DEFAULT_SAVE_TIP: &str = "not saved yet";

/// Hunger at or below this is "low" for dialogue purposes.
pub(crate) const LOW_HUNGER: u8 = 30;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DailyCounters {
    pub(crate) pc_count: u32,
    pub(crate) eat_count: u32,
    pub(crate) drink_count: u32,
    pub(crate) music_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PetState {
    pub(crate) affection: u8,
    pub(crate) hunger: u8,
    /// Epoch milliseconds of the last time the pet was observed.
    pub(crate) last_seen_ts: i64,
    /// Local calendar date (`YYYY-MM-DD`) of the last daily reset.
    pub(crate) last_daily_reset_date: String,
    pub(crate) daily: DailyCounters,
    pub(crate) last_save_tip: String,
}

impl PetState {
    pub(crate) fn new_default(now_ms: i64, today: &str) -> Self {
        Self {
            affection: DEFAULT_AFFECTION,
            hunger: DEFAULT_HUNGER,
            last_seen_ts: now_ms,
            last_daily_reset_date: today.to_string(),
            daily: DailyCounters::default(),
            last_save_tip: DEFAULT_SAVE_TIP.to_string(),
        }
    }
}

/// Clamp any integer into the [0,100] stat range.
pub(crate) fn clamp_stat(v: i64) -> u8 {
    v.clamp(0, STAT_MAX) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let st = PetState::new_default(1_000, "2024-01-02");
        assert_eq!(st.affection, 0);
        assert_eq!(st.hunger, 100);
        assert_eq!(st.last_seen_ts, 1_000);
        assert_eq!(st.last_daily_reset_date, "2024-01-02");
        assert_eq!(st.daily, DailyCounters::default());
        assert_eq!(st.last_save_tip, DEFAULT_SAVE_TIP);
    }

    #[test]
    fn serializes_with_camel_case_field_names() {
        let st = PetState::new_default(5, "2024-01-02");
        let v = serde_json::to_value(&st).unwrap();
        assert_eq!(v["lastSeenTs"], 5);
        assert_eq!(v["lastDailyResetDate"], "2024-01-02");
        assert_eq!(v["daily"]["pcCount"], 0);
        assert_eq!(v["daily"]["musicCount"], 0);
        assert_eq!(v["lastSaveTip"], DEFAULT_SAVE_TIP);
    }

    #[test]
    fn clamp_stat_bounds() {
        assert_eq!(clamp_stat(-5), 0);
        assert_eq!(clamp_stat(42), 42);
        assert_eq!(clamp_stat(125), 100);
        assert_eq!(clamp_stat(i64::MIN), 0);
        assert_eq!(clamp_stat(i64::MAX), 100);
    }
}
