//! Repairs arbitrary persisted JSON into a valid [`PetState`].
//!
//! Every field has its own total coercion function. A missing field keeps its default;
//! a present field of the wrong JSON type or out of range is coerced on its own, so a
//! partially damaged save keeps whatever is still usable.

use crate::clock::{format_date, parse_date};
use crate::model::{
    clamp_stat, DailyCounters, PetState, DEFAULT_AFFECTION, DEFAULT_HUNGER, DEFAULT_SAVE_TIP,
    STAT_MAX,
};
use serde_json::Value;

pub(crate) fn normalize(raw: &Value, now_ms: i64, today: &str) -> PetState {
    let empty = serde_json::Map::new();
    let obj = raw.as_object().unwrap_or(&empty);
    let daily = obj
        .get("daily")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    PetState {
        affection: obj
            .get("affection")
            .map_or(DEFAULT_AFFECTION, |v| coerce_stat(Some(v))),
        hunger: obj
            .get("hunger")
            .map_or(DEFAULT_HUNGER, |v| coerce_stat(Some(v))),
        last_seen_ts: coerce_timestamp(obj.get("lastSeenTs"), now_ms),
        last_daily_reset_date: coerce_date(obj.get("lastDailyResetDate"), today),
        daily: DailyCounters {
            pc_count: coerce_counter(daily.get("pcCount")),
            eat_count: coerce_counter(daily.get("eatCount")),
            drink_count: coerce_counter(daily.get("drinkCount")),
            music_count: coerce_counter(daily.get("musicCount")),
        },
        last_save_tip: coerce_tip(obj.get("lastSaveTip")),
    }
}

/// Re-validate a typed state after an in-memory mutation.
pub(crate) fn normalize_state(mut st: PetState, today: &str) -> PetState {
    st.affection = clamp_stat(i64::from(st.affection));
    st.hunger = clamp_stat(i64::from(st.hunger));
    if parse_date(&st.last_daily_reset_date).is_none() {
        st.last_daily_reset_date = today.to_string();
    }
    st
}

// Only real JSON numbers count; numeric-looking strings are rejected.
fn finite_number(v: Option<&Value>) -> Option<f64> {
    v.and_then(Value::as_f64).filter(|f| f.is_finite())
}

pub(crate) fn coerce_stat(v: Option<&Value>) -> u8 {
    let n = finite_number(v).unwrap_or(0.0);
    n.round().clamp(0.0, STAT_MAX as f64) as u8
}

pub(crate) fn coerce_timestamp(v: Option<&Value>, now_ms: i64) -> i64 {
    match v {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(now_ms),
        _ => now_ms,
    }
}

pub(crate) fn coerce_date(v: Option<&Value>, today: &str) -> String {
    v.and_then(Value::as_str)
        .and_then(parse_date)
        .map(format_date)
        .unwrap_or_else(|| today.to_string())
}

pub(crate) fn coerce_counter(v: Option<&Value>) -> u32 {
    let n = finite_number(v).unwrap_or(0.0);
    n.floor().clamp(0.0, u32::MAX as f64) as u32
}

pub(crate) fn coerce_tip(v: Option<&Value>) -> String {
    v.and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_SAVE_TIP.to_string())
}
