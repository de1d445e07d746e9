//! The state container. It owns the live [`PetState`] and is the only place where a
//! mutation becomes visible: each operation edits a candidate copy, re-validates it,
//! persists it, and only then swaps it in.

use crate::clock::{format_ts, Clock};
use crate::dialogue::{
    DialogueContext, DialogueSelector, DialogueSet, DialogueSource, TimeOfDay, Trigger,
    WeatherKind,
};
use crate::error::Result;
use crate::model::PetState;
use crate::normalize::normalize_state;
use crate::sim::{Action, OfflineDecay};
use crate::storage::{KvStore, SaveStore};
use rand::Rng;
use tracing::{info, warn};

const SIMULATED_OFFLINE_MS: i64 = 5 * 60 * 60 * 1000;

#[derive(Clone, Debug)]
pub(crate) struct Diagnostics {
    pub(crate) last_error: Option<String>,
    pub(crate) dialogue_source: DialogueSource,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_error: None,
            dialogue_source: DialogueSource::Builtin,
        }
    }
}

impl Diagnostics {
    pub(crate) fn record(&mut self, context: &str, err: &dyn std::fmt::Display) {
        warn!(context, error = %err, "recoverable error");
        self.last_error = Some(format!("{context}: {err}"));
    }

    pub(crate) fn debug_lines(&self, st: &PetState) -> Vec<String> {
        let d = &st.daily;
        vec![
            format!("affection: {}", st.affection),
            format!("hunger: {}", st.hunger),
            format!("lastDailyResetDate: {}", st.last_daily_reset_date),
            format!(
                "lastSeenTs: {} ({})",
                st.last_seen_ts,
                format_ts(st.last_seen_ts)
            ),
            format!("daily.pcCount: {}", d.pc_count),
            format!("daily.eatCount: {}", d.eat_count),
            format!("daily.drinkCount: {}", d.drink_count),
            format!("daily.musicCount: {}", d.music_count),
            format!("saveTip: {}", st.last_save_tip),
            format!("dialogues: {}", self.dialogue_source.label()),
            format!(
                "error: {}",
                self.last_error.as_deref().unwrap_or("(none)")
            ),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StartupReport {
    pub(crate) daily_reset: bool,
    pub(crate) decay: OfflineDecay,
}

pub(crate) struct Session<S: KvStore, C: Clock, R: Rng> {
    state: PetState,
    saves: SaveStore<S>,
    clock: C,
    rng: R,
    selector: DialogueSelector,
    weather: WeatherKind,
    diagnostics: Diagnostics,
}

impl<S: KvStore, C: Clock, R: Rng> Session<S, C, R> {
    /// Load (and repair) the saved state. A damaged record is reported in diagnostics
    /// and replaced by defaults; nothing is written until [`Session::startup`].
    pub(crate) fn open(store: S, clock: C, rng: R, weather: WeatherKind) -> Self {
        let saves = SaveStore::new(store);
        let loaded = saves.load(clock.now_ms(), &clock.today());
        let mut diagnostics = Diagnostics::default();
        if let Some(w) = &loaded.warning {
            diagnostics.record("could not read save, using defaults", w);
        }
        Self {
            state: loaded.state,
            saves,
            clock,
            rng,
            selector: DialogueSelector::new(DialogueSet::default()),
            weather,
            diagnostics,
        }
    }

    pub(crate) fn state(&self) -> &PetState {
        &self.state
    }

    pub(crate) fn line(&self) -> &str {
        self.selector.last_line()
    }

    #[cfg(test)]
    pub(crate) fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub(crate) fn record_error(&mut self, context: &str, err: &dyn std::fmt::Display) {
        self.diagnostics.record(context, err);
    }

    pub(crate) fn debug_lines(&self) -> Vec<String> {
        self.diagnostics.debug_lines(&self.state)
    }

    pub(crate) fn set_dialogues(&mut self, set: DialogueSet, source: DialogueSource) {
        self.selector.replace_set(set);
        self.diagnostics.dialogue_source = source;
    }

    /// Catch-up at launch: daily reset first, then offline decay.
    pub(crate) fn startup(&mut self) -> Result<StartupReport> {
        let daily_reset = self.daily_reset()?;
        let decay = self.offline_decay()?;
        if !daily_reset && !decay.changed() {
            let mut next = self.state.clone();
            next.last_seen_ts = self.clock.now_ms();
            self.commit(next, "startup complete")?;
        }
        Ok(StartupReport { daily_reset, decay })
    }

    pub(crate) fn daily_reset(&mut self) -> Result<bool> {
        let today = self.clock.today();
        let mut next = self.state.clone();
        if !next.apply_daily_reset(&today) {
            return Ok(false);
        }
        self.commit(next, "daily reset saved")?;
        info!(%today, "daily reset");
        self.speak(Trigger::DailyReset);
        Ok(true)
    }

    pub(crate) fn offline_decay(&mut self) -> Result<OfflineDecay> {
        let mut next = self.state.clone();
        let decay = next.apply_offline_decay(self.clock.now_ms());
        self.commit(next, &decay.annotation())?;
        if decay.changed() {
            info!(minutes = decay.minutes, units = decay.units, "offline hunger decay");
        }
        Ok(decay)
    }

    pub(crate) fn apply_action(&mut self, action: Action) -> Result<()> {
        let mut next = self.state.clone();
        next.apply_action(action, self.clock.now_ms());
        self.commit(next, &format!("action: {}", action.name()))?;
        info!(action = action.name(), "action applied");
        self.speak(Trigger::Action(action));
        Ok(())
    }

    /// The character was touched: talk, count it as seen, leave the stats alone.
    pub(crate) fn tap(&mut self) -> Result<()> {
        let mut next = self.state.clone();
        next.last_seen_ts = self.clock.now_ms();
        self.commit(next, "tap saved")?;
        self.speak(Trigger::Tap);
        Ok(())
    }

    pub(crate) fn simulate_offline(&mut self) -> Result<OfflineDecay> {
        let now = self.clock.now_ms();
        let mut next = self.state.clone();
        next.last_seen_ts = now.saturating_sub(SIMULATED_OFFLINE_MS);
        let decay = next.apply_offline_decay(now);
        self.commit(next, &decay.annotation())?;
        info!(units = decay.units, "simulated offline period");
        self.speak(Trigger::SimOffline);
        Ok(decay)
    }

    pub(crate) fn simulate_new_day(&mut self) -> Result<bool> {
        let yesterday = self.clock.date_offset(-1);
        let mut next = self.state.clone();
        next.last_daily_reset_date = yesterday;
        let today = self.clock.today();
        let fired = next.apply_daily_reset(&today);
        self.commit(next, "daily reset saved")?;
        self.speak(Trigger::DailyReset);
        Ok(fired)
    }

    /// Delete the record and start over from defaults.
    pub(crate) fn reset_save(&mut self) -> Result<()> {
        let next = PetState::new_default(self.clock.now_ms(), &self.clock.today());
        self.saves.reset()?;
        self.commit(next, "save reset")?;
        self.speak(Trigger::ResetSave);
        Ok(())
    }

    /// Final write when the app closes.
    pub(crate) fn mark_seen(&mut self) -> Result<()> {
        let mut next = self.state.clone();
        next.last_seen_ts = self.clock.now_ms();
        self.commit(next, "saved before exit")
    }

    fn commit(&mut self, next: PetState, reason: &str) -> Result<()> {
        let mut next = normalize_state(next, &self.clock.today());
        self.saves.save(&mut next, reason, self.clock.now_ms())?;
        self.state = next;
        Ok(())
    }

    fn speak(&mut self, trigger: Trigger) {
        let ctx = DialogueContext {
            trigger,
            hunger: self.state.hunger,
            time_of_day: TimeOfDay::from_hour(self.clock.hour()),
            weather: self.weather,
        };
        self.selector.pick(&ctx, &mut self.rng);
    }

    #[cfg(test)]
    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    #[cfg(test)]
    pub(crate) fn saves_mut(&mut self) -> &mut SaveStore<S> {
        &mut self.saves
    }

    #[cfg(test)]
    pub(crate) fn saves(&self) -> &SaveStore<S> {
        &self.saves
    }
}
