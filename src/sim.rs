use crate::model::{clamp_stat, PetState};

const MS_PER_MINUTE: i64 = 60_000;
/// One hunger point is lost per this many full offline minutes.
pub(crate) const MINUTES_PER_DECAY_UNIT: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Action {
    Pc,
    Eat,
    Drink,
    Music,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ActionRule {
    pub(crate) affection: i64,
    pub(crate) hunger: i64,
}

impl Action {
    #[cfg(test)]
    pub(crate) const ALL: [Action; 4] = [Action::Pc, Action::Eat, Action::Drink, Action::Music];

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "pc" => Some(Action::Pc),
            "eat" => Some(Action::Eat),
            "drink" => Some(Action::Drink),
            "music" => Some(Action::Music),
            _ => None,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Action::Pc => "pc",
            Action::Eat => "eat",
            Action::Drink => "drink",
            Action::Music => "music",
        }
    }

    pub(crate) fn rule(self) -> ActionRule {
        match self {
            Action::Pc => ActionRule {
                affection: 8,
                hunger: -12,
            },
            Action::Eat => ActionRule {
                affection: 0,
                hunger: 35,
            },
            Action::Drink => ActionRule {
                affection: 0,
                hunger: 10,
            },
            Action::Music => ActionRule {
                affection: 6,
                hunger: -3,
            },
        }
    }
}

impl PetState {
    pub(crate) fn apply_action(&mut self, action: Action, now_ms: i64) {
        let rule = action.rule();
        self.affection = clamp_stat(i64::from(self.affection) + rule.affection);
        self.hunger = clamp_stat(i64::from(self.hunger) + rule.hunger);

        let counter = match action {
            Action::Pc => &mut self.daily.pc_count,
            Action::Eat => &mut self.daily.eat_count,
            Action::Drink => &mut self.daily.drink_count,
            Action::Music => &mut self.daily.music_count,
        };
        *counter = counter.saturating_add(1);

        self.last_seen_ts = now_ms;
    }

    /// Catch up hunger for the time elapsed since `last_seen_ts`, then mark the pet as
    /// seen at `now_ms`. A clock that went backwards decays nothing.
    pub(crate) fn apply_offline_decay(&mut self, now_ms: i64) -> OfflineDecay {
        let minutes = now_ms
            .checked_sub(self.last_seen_ts)
            .map(|ms| ms.div_euclid(MS_PER_MINUTE));

        let out = match minutes {
            Some(m) if m > 0 => {
                let units = m / MINUTES_PER_DECAY_UNIT;
                self.hunger = clamp_stat(i64::from(self.hunger).saturating_sub(units));
                OfflineDecay { minutes: m, units }
            }
            _ => OfflineDecay::default(),
        };

        self.last_seen_ts = now_ms;
        out
    }

    /// Zero affection and the daily counters once per local calendar day.
    /// Returns whether a reset happened.
    pub(crate) fn apply_daily_reset(&mut self, today: &str) -> bool {
        if self.last_daily_reset_date == today {
            return false;
        }
        self.affection = 0;
        self.daily = Default::default();
        self.last_daily_reset_date = today.to_string();
        true
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct OfflineDecay {
    pub(crate) minutes: i64,
    pub(crate) units: i64,
}

impl OfflineDecay {
    pub(crate) fn changed(&self) -> bool {
        self.units > 0
    }

    pub(crate) fn annotation(&self) -> String {
        if self.minutes <= 0 {
            "offline catch-up: no change".to_string()
        } else {
            format!("offline catch-up: -{} hunger", self.units)
        }
    }
}
