use crate::clock::SystemClock;
use crate::config::{
    fallback_paths, init_logging, load_settings, project_paths, save_settings_atomic, Paths,
    Settings,
};
use crate::dialogue::{log_dialogue_source, DialogueLoader, DialogueSource};
use crate::input::{collect_input_nonblocking, map_event, ActionCooldown, Command};
use crate::render::{draw_frame, hits_character, FrameView, SceneLayout, Terminal};
use crate::session::Session;
use crate::storage::FileStore;
use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use tracing::{debug, info};

type PetSession = Session<FileStore, SystemClock, StdRng>;

pub(crate) struct App {
    settings: Settings,
    paths: Paths,
    session: PetSession,
    loader: Option<(DialogueLoader, std::path::PathBuf)>,
    cooldown: ActionCooldown,
    term: Terminal,
    should_quit: bool,
}

impl App {
    fn init() -> anyhow::Result<Self> {
        let (paths, paths_err) = match project_paths() {
            Ok(p) => (p, None),
            Err(e) => (fallback_paths(), Some(format!("{e:#}"))),
        };
        let settings = load_settings(&paths.settings_path);
        if let Err(e) = init_logging(&paths, &settings) {
            eprintln!("xiaoyin-pet: continuing without a log file: {e:#}");
        }
        info!(data_dir = %paths.data_dir.display(), "starting");

        let rng = match settings.rng_seed {
            0 => StdRng::from_entropy(),
            seed => StdRng::seed_from_u64(seed),
        };
        let mut session = Session::open(
            FileStore::new(&paths.data_dir),
            SystemClock,
            rng,
            settings.weather,
        );
        if let Some(e) = paths_err {
            session.record_error("data directory unavailable, using working directory", &e);
        }
        match session.startup() {
            Ok(report) => info!(
                daily_reset = report.daily_reset,
                decay_units = report.decay.units,
                "startup catch-up done"
            ),
            Err(e) => session.record_error("startup catch-up failed", &e),
        }

        // first frame never waits on the dataset
        let dialogues_path = paths.dialogues_path(&settings);
        let loader = DialogueLoader::spawn(
            dialogues_path.clone(),
            Duration::from_millis(settings.dialogue_timeout_ms),
        );
        let cooldown = ActionCooldown::new(Duration::from_millis(settings.action_cooldown_ms));

        let term = Terminal::begin().context("could not start the terminal UI")?;

        Ok(Self {
            settings,
            paths,
            session,
            loader: Some((loader, dialogues_path)),
            cooldown,
            term,
            should_quit: false,
        })
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let looped = self.frame_loop();

        if let Err(e) = self.session.mark_seen() {
            self.session.record_error("final save failed", &e);
        }
        self.term.end()?;
        looped?;
        save_settings_atomic(&self.paths.settings_path, &self.settings)?;
        info!("bye");
        Ok(())
    }

    fn frame_loop(&mut self) -> anyhow::Result<()> {
        let fps = self.settings.fps_cap.clamp(5, 120);
        let frame_dt = Duration::from_secs_f32(1.0 / fps as f32);

        while !self.should_quit {
            let frame_start = Instant::now();
            self.term.resize_if_needed()?;

            for ev in collect_input_nonblocking(frame_dt)? {
                if let Some(cmd) = map_event(&ev) {
                    self.handle(cmd);
                }
                if self.should_quit {
                    break;
                }
            }

            self.poll_dialogues();
            self.render_frame()?;

            spin_sleep(frame_dt, frame_start);
        }
        Ok(())
    }

    fn handle(&mut self, cmd: Command) {
        let now = Instant::now();
        let (context, res) = match cmd {
            Command::Act(action) => {
                if !self.cooldown.try_begin(now) {
                    debug!(action = action.name(), "action ignored during cooldown");
                    return;
                }
                (
                    format!("action {} failed", action.name()),
                    self.session.apply_action(action),
                )
            }
            Command::Tap => ("tap failed".to_string(), self.session.tap()),
            Command::ClickAt { col, row } => {
                let layout = SceneLayout::for_terminal(self.term.cols, self.term.rows);
                if !hits_character(&layout, col, row) {
                    return;
                }
                ("tap failed".to_string(), self.session.tap())
            }
            Command::SimulateOffline => (
                "simulate offline failed".to_string(),
                self.session.simulate_offline().map(|_| ()),
            ),
            Command::SimulateNewDay => (
                "simulate new day failed".to_string(),
                self.session.simulate_new_day().map(|_| ()),
            ),
            Command::ResetSave => ("reset save failed".to_string(), self.session.reset_save()),
            Command::Quit => {
                self.should_quit = true;
                return;
            }
        };
        if let Err(e) = res {
            self.session.record_error(&context, &e);
        }
    }

    fn poll_dialogues(&mut self) {
        let Some((loader, path)) = self.loader.as_mut() else {
            return;
        };
        let Some(res) = loader.poll(Instant::now()) else {
            return;
        };
        let path = path.clone();
        self.loader = None;
        match res {
            Ok(set) => {
                let source = DialogueSource::File(path);
                log_dialogue_source(&source);
                self.session.set_dialogues(set, source);
            }
            Err(e) => {
                log_dialogue_source(&DialogueSource::Builtin);
                self.session
                    .record_error("dialogue dataset unavailable, using built-in lines", &e);
            }
        }
    }

    fn render_frame(&mut self) -> anyhow::Result<()> {
        let debug = self.session.debug_lines();
        let view = FrameView {
            state: self.session.state(),
            line: self.session.line(),
            debug: &debug,
            cooldown_active: self.cooldown.is_active(Instant::now()),
            enable_color: self.settings.enable_color,
        };
        draw_frame(&mut self.term.cur, &view);
        self.term.present()
    }
}

pub(crate) fn run() -> anyhow::Result<()> {
    let mut app = App::init()?;
    app.run()?;
    Ok(())
}

/* -----------------------------
   Frame pacing helper
------------------------------ */

fn spin_sleep(target: Duration, now: Instant) {
    let end = now + target;
    loop {
        let t = Instant::now();
        if t >= end {
            break;
        }
        let left = end - t;
        if left > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            std::hint::spin_loop();
        }
    }
}
