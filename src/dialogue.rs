//! Context-driven dialogue lines.
//!
//! Lines live in named groups. A trigger context unions every group that applies, drops
//! the line currently on screen when something else is available, and picks uniformly.
//! The dataset may come from `dialogues.json`; any group that file lacks is taken from
//! the built-in table, so no pool is ever empty.

use crate::error::{PetError, Result};
use crate::model::LOW_HUNGER;
use crate::sim::Action;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub(crate) const DEFAULT_NPC: &str = "小白";
pub(crate) const DEFAULT_PLAYER: &str = "小音";
pub(crate) const RARE_CHANCE: f64 = 0.08;
const EMPTY_POOL_LINE: &str = "{npc}：{player}，我在这里陪着你。";
const SPEAKER_SEPARATOR: char = '：';

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DialogueSet {
    pub(crate) npc: String,
    pub(crate) player: String,
    pub(crate) tap: Vec<String>,
    pub(crate) morning: Vec<String>,
    pub(crate) evening: Vec<String>,
    pub(crate) rain: Vec<String>,
    pub(crate) hunger_low: Vec<String>,
    pub(crate) action_eat: Vec<String>,
    pub(crate) action_music: Vec<String>,
    pub(crate) action_pc: Vec<String>,
    pub(crate) action_drink: Vec<String>,
    pub(crate) rare: Vec<String>,
}

fn lines(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

impl Default for DialogueSet {
    fn default() -> Self {
        Self {
            npc: DEFAULT_NPC.to_string(),
            player: DEFAULT_PLAYER.to_string(),
            tap: lines(&["{npc}：{player}，你来啦。", "{npc}：我在这里等你。"]),
            morning: lines(&["{npc}：早安，{player}。"]),
            evening: lines(&["{npc}：晚上好，{player}。"]),
            rain: lines(&["{npc}：外面在下雨。"]),
            hunger_low: lines(&["{npc}：{player}，我有点饿了。"]),
            action_eat: lines(&["{npc}：谢谢{player}投喂！"]),
            action_music: lines(&["{npc}：这首歌很好听。"]),
            action_pc: lines(&["{npc}：我在认真用电脑。"]),
            action_drink: lines(&["{npc}：补水成功。"]),
            rare: lines(&["{npc}：{player}，你在就很好。"]),
        }
    }
}

impl DialogueSet {
    /// Build a set from untrusted JSON, substituting the built-in value for every key
    /// that is missing, empty, or of the wrong shape.
    pub(crate) fn from_value(raw: &Value) -> Self {
        let base = Self::default();
        let name = |key: &str, fallback: String| -> String {
            match raw.get(key).and_then(Value::as_str) {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => fallback,
            }
        };
        let group = |key: &str, fallback: Vec<String>| -> Vec<String> {
            let found: Vec<String> = raw
                .get(key)
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if found.is_empty() {
                fallback
            } else {
                found
            }
        };

        Self {
            npc: name("npc", base.npc),
            player: name("player", base.player),
            tap: group("tap", base.tap),
            morning: group("morning", base.morning),
            evening: group("evening", base.evening),
            rain: group("rain", base.rain),
            hunger_low: group("hunger_low", base.hunger_low),
            action_eat: group("action_eat", base.action_eat),
            action_music: group("action_music", base.action_music),
            action_pc: group("action_pc", base.action_pc),
            action_drink: group("action_drink", base.action_drink),
            rare: group("rare", base.rare),
        }
    }

    fn action_group(&self, action: Action) -> &[String] {
        match action {
            Action::Pc => &self.action_pc,
            Action::Eat => &self.action_eat,
            Action::Drink => &self.action_drink,
            Action::Music => &self.action_music,
        }
    }

    pub(crate) fn format_line(&self, s: &str) -> String {
        s.replace("{npc}", &self.npc).replace("{player}", &self.player)
    }

    pub(crate) fn with_speaker_prefix(&self, s: &str) -> String {
        let prefix = format!("{}{}", self.npc, SPEAKER_SEPARATOR);
        if s.starts_with(&prefix) {
            s.to_string()
        } else {
            format!("{prefix}{s}")
        }
    }

    /// Placeholder substitution plus speaker prefix; this is what ends up on screen.
    pub(crate) fn render(&self, s: &str) -> String {
        self.with_speaker_prefix(&self.format_line(s))
    }
}

pub(crate) fn load_dialogues(path: &Path) -> Result<DialogueSet> {
    let text = std::fs::read_to_string(path)?;
    let raw: Value = serde_json::from_str(&text)?;
    if !raw.is_object() {
        return Err(PetError::Dialogue(format!(
            "{} is not a JSON object",
            path.display()
        )));
    }
    Ok(DialogueSet::from_value(&raw))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DialogueSource {
    Builtin,
    File(PathBuf),
}

impl DialogueSource {
    pub(crate) fn label(&self) -> String {
        match self {
            DialogueSource::Builtin => "fallback".to_string(),
            DialogueSource::File(p) => p.display().to_string(),
        }
    }
}

/// Reads the dataset off the UI thread. Poll it once per frame; it resolves exactly once.
pub(crate) struct DialogueLoader {
    rx: Option<Receiver<Result<DialogueSet>>>,
    deadline: Instant,
    timeout: Duration,
}

impl DialogueLoader {
    pub(crate) fn spawn(path: PathBuf, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let res = load_dialogues(&path);
            // receiver may already have given up
            let _ = tx.send(res);
        });
        Self {
            rx: Some(rx),
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    pub(crate) fn poll(&mut self, now: Instant) -> Option<Result<DialogueSet>> {
        let rx = self.rx.as_ref()?;
        let out = match rx.try_recv() {
            Ok(res) => res,
            Err(TryRecvError::Empty) if now < self.deadline => return None,
            Err(TryRecvError::Empty) => {
                Err(PetError::DialogueTimeout(self.timeout.as_millis() as u64))
            }
            Err(TryRecvError::Disconnected) => {
                Err(PetError::Dialogue("loader thread exited".to_string()))
            }
        };
        self.rx = None;
        Some(out)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TimeOfDay {
    Morning,
    Evening,
    Night,
}

impl TimeOfDay {
    pub(crate) fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum WeatherKind {
    #[default]
    Unknown,
    Clear,
    Rain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Trigger {
    Tap,
    Action(Action),
    DailyReset,
    SimOffline,
    ResetSave,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct DialogueContext {
    pub(crate) trigger: Trigger,
    pub(crate) hunger: u8,
    pub(crate) time_of_day: TimeOfDay,
    pub(crate) weather: WeatherKind,
}

fn extend<'a>(pool: &mut Vec<&'a str>, group: &'a [String]) {
    pool.extend(group.iter().map(String::as_str));
}

pub(crate) struct DialogueSelector {
    set: DialogueSet,
    last_line: String,
}

impl DialogueSelector {
    pub(crate) fn new(set: DialogueSet) -> Self {
        Self {
            set,
            last_line: String::new(),
        }
    }

    pub(crate) fn replace_set(&mut self, set: DialogueSet) {
        self.set = set;
    }

    /// The line most recently shown; empty before the first pick.
    pub(crate) fn last_line(&self) -> &str {
        &self.last_line
    }

    /// Raw (unformatted) candidates for `ctx`.
    pub(crate) fn candidate_pool(&self, ctx: &DialogueContext, include_rare: bool) -> Vec<&str> {
        let set = &self.set;
        let mut pool: Vec<&str> = Vec::new();

        if ctx.trigger == Trigger::Tap {
            extend(&mut pool, &set.tap);
        }
        match ctx.time_of_day {
            TimeOfDay::Morning => extend(&mut pool, &set.morning),
            TimeOfDay::Evening | TimeOfDay::Night => extend(&mut pool, &set.evening),
        }
        if ctx.weather == WeatherKind::Rain {
            extend(&mut pool, &set.rain);
        }
        if ctx.hunger <= LOW_HUNGER {
            extend(&mut pool, &set.hunger_low);
        }
        if let Trigger::Action(a) = ctx.trigger {
            extend(&mut pool, set.action_group(a));
        }
        if include_rare {
            extend(&mut pool, &set.rare);
        }

        if pool.is_empty() {
            pool.push(EMPTY_POOL_LINE);
        }
        pool
    }

    pub(crate) fn pick<R: Rng>(&mut self, ctx: &DialogueContext, rng: &mut R) -> String {
        let include_rare = rng.gen_bool(RARE_CHANCE);
        let rendered: Vec<String> = self
            .candidate_pool(ctx, include_rare)
            .into_iter()
            .map(|l| self.set.render(l))
            .collect();

        let fresh: Vec<&String> = rendered.iter().filter(|l| **l != self.last_line).collect();
        let choice = if fresh.is_empty() {
            rendered.choose(rng)
        } else {
            fresh.choose(rng).copied()
        };
        let line = choice
            .cloned()
            .unwrap_or_else(|| self.set.render(EMPTY_POOL_LINE));

        debug!(trigger = ?ctx.trigger, %line, "dialogue picked");
        self.last_line = line.clone();
        line
    }
}

pub(crate) fn log_dialogue_source(source: &DialogueSource) {
    info!(source = %source.label(), "dialogue dataset in use");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::io::Write;

    fn ctx(trigger: Trigger, hunger: u8, tod: TimeOfDay) -> DialogueContext {
        DialogueContext {
            trigger,
            hunger,
            time_of_day: tod,
            weather: WeatherKind::Unknown,
        }
    }

    #[test]
    fn per_key_fallback_keeps_valid_groups() {
        let raw = json!({
            "npc": "Momo",
            "player": "",
            "tap": ["{npc} waves at {player}"],
            "morning": [],
            "rain": "not a list",
            "rare": [1, 2, "shiny"]
        });
        let set = DialogueSet::from_value(&raw);
        let base = DialogueSet::default();
        assert_eq!(set.npc, "Momo");
        assert_eq!(set.player, DEFAULT_PLAYER);
        assert_eq!(set.tap, vec!["{npc} waves at {player}".to_string()]);
        assert_eq!(set.morning, base.morning);
        assert_eq!(set.rain, base.rain);
        assert_eq!(set.rare, vec!["shiny".to_string()]);
        assert_eq!(set.action_pc, base.action_pc);
    }

    #[test]
    fn render_substitutes_and_prefixes_once() {
        let set = DialogueSet::default();
        assert_eq!(set.render("{npc}：早安，{player}。"), "小白：早安，小音。");
        assert_eq!(set.render("hello {player}"), "小白：hello 小音");
    }

    #[test]
    fn time_buckets() {
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(6), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(18), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(23), TimeOfDay::Night);
    }

    #[test]
    fn pool_unions_applicable_groups() {
        let sel = DialogueSelector::new(DialogueSet::default());
        let set = DialogueSet::default();

        let pool = sel.candidate_pool(&ctx(Trigger::Tap, 80, TimeOfDay::Morning), false);
        let expected: Vec<&str> = set
            .tap
            .iter()
            .chain(set.morning.iter())
            .map(String::as_str)
            .collect();
        assert_eq!(pool, expected);

        let mut c = ctx(Trigger::Action(Action::Eat), 30, TimeOfDay::Night);
        c.weather = WeatherKind::Rain;
        let pool = sel.candidate_pool(&c, true);
        for l in set
            .evening
            .iter()
            .chain(&set.rain)
            .chain(&set.hunger_low)
            .chain(&set.action_eat)
            .chain(&set.rare)
        {
            assert!(pool.contains(&l.as_str()), "missing {l}");
        }
        assert!(!pool.contains(&set.tap[0].as_str()));
    }

    #[test]
    fn hunger_above_threshold_excludes_low_group() {
        let sel = DialogueSelector::new(DialogueSet::default());
        let pool = sel.candidate_pool(&ctx(Trigger::DailyReset, 31, TimeOfDay::Evening), false);
        assert!(!pool.contains(&DialogueSet::default().hunger_low[0].as_str()));
    }

    #[test]
    fn pick_never_repeats_when_alternatives_exist() {
        let mut sel = DialogueSelector::new(DialogueSet::default());
        let mut rng = StdRng::seed_from_u64(7);
        let c = ctx(Trigger::Tap, 80, TimeOfDay::Evening);
        let mut prev = sel.pick(&c, &mut rng);
        for _ in 0..200 {
            let next = sel.pick(&c, &mut rng);
            assert_ne!(next, prev);
            assert_eq!(sel.last_line(), next);
            prev = next;
        }
    }

    #[test]
    fn single_candidate_repeats_rather_than_going_silent() {
        let mut set = DialogueSet::default();
        set.evening = vec!["only line".to_string()];
        set.rare = vec!["only line".to_string()];
        let mut sel = DialogueSelector::new(set);
        let mut rng = StdRng::seed_from_u64(1);
        let c = ctx(Trigger::ResetSave, 90, TimeOfDay::Night);
        let a = sel.pick(&c, &mut rng);
        let b = sel.pick(&c, &mut rng);
        assert_eq!(a, "小白：only line");
        assert_eq!(a, b);
    }

    #[test]
    fn load_dialogues_reads_file_and_rejects_non_objects() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("dialogues.json");
        let mut f = std::fs::File::create(&good).unwrap();
        write!(f, "{}", json!({ "npc": "Kiki", "tap": ["hi"] })).unwrap();
        let set = load_dialogues(&good).unwrap();
        assert_eq!(set.npc, "Kiki");
        assert_eq!(set.tap, vec!["hi".to_string()]);

        let bad = dir.path().join("list.json");
        std::fs::write(&bad, "[1,2]").unwrap();
        assert!(matches!(load_dialogues(&bad), Err(PetError::Dialogue(_))));

        let missing = dir.path().join("nope.json");
        assert!(matches!(load_dialogues(&missing), Err(PetError::Io(_))));
    }

    #[test]
    fn loader_resolves_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dialogues.json");
        std::fs::write(&path, "{\"npc\":\"Nana\"}").unwrap();

        let mut loader = DialogueLoader::spawn(path, Duration::from_secs(5));
        let start = Instant::now();
        let res = loop {
            if let Some(r) = loader.poll(Instant::now()) {
                break r;
            }
            assert!(start.elapsed() < Duration::from_secs(5));
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(res.unwrap().npc, "Nana");
        assert!(loader.poll(Instant::now()).is_none());
    }

    #[test]
    fn loader_times_out_past_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader =
            DialogueLoader::spawn(dir.path().join("dialogues.json"), Duration::from_millis(0));
        // Either the (failed) read or the deadline wins; both must be an error.
        let res = loader.poll(Instant::now() + Duration::from_secs(1));
        assert!(res.is_some_and(|r| r.is_err()));
    }
}
