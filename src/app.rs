use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, RwLock};

use crate::actors::{ActorHandle, LogTailActor, SnapshotActor};
use crate::aggregate::Aggregator;
use crate::config::ConfigStore;
use crate::layout::LayoutComposer;
use crate::lifecycle::{Outcome, WorkerManager};
use crate::render::RenderState;
use crate::tea::{update, AttachTarget, Command, Message, Model};
use crate::tmux::Tmux;
use crate::util::blocking;
use crate::{hlog_debug, hlog_error, Result};

const MAX_BG_MESSAGES: usize = 50;
const TICK_INTERVAL: Duration = Duration::from_millis(250);
const CONFIG_RELOAD_INTERVAL: Duration = Duration::from_secs(1);
/// How long an attach waits for the render thread to release the terminal.
const RENDER_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything the dashboard drives. Built by the CLI, consumed by the logic thread.
pub struct Dashboard {
    pub manager: Arc<WorkerManager>,
    pub aggregator: Aggregator,
    pub layout: Arc<LayoutComposer>,
    pub config: ConfigStore,
    pub lead_percent: u8,
}

pub struct LogicThread;

impl LogicThread {
    pub fn run(
        dashboard: Dashboard,
        state_tx: Sender<RenderState>,
        shutdown: Arc<AtomicBool>,
        render_paused: Arc<AtomicBool>,
        render_acked: Arc<AtomicBool>,
    ) -> Result<()> {
        Runtime::new()?.block_on(Self::run_async(
            dashboard,
            state_tx,
            shutdown,
            render_paused,
            render_acked,
        ))
    }

    async fn run_async(
        dashboard: Dashboard,
        state_tx: Sender<RenderState>,
        shutdown: Arc<AtomicBool>,
        render_paused: Arc<AtomicBool>,
        render_acked: Arc<AtomicBool>,
    ) -> Result<()> {
        let Dashboard {
            manager,
            aggregator,
            layout,
            config,
            lead_percent,
        } = dashboard;

        let project = manager.registry().identity().as_str().to_string();
        let mut model = Model::new(project, manager.workers(), config.resolve());
        hlog_debug!(
            "LogicThread::run_async project={} workers={} theme={}",
            model.project,
            model.worker_count,
            model.config.theme
        );

        let ctx = Executor {
            manager,
            layout,
            config,
            lead_percent,
            log_target: Arc::new(RwLock::new(None)),
            shutdown: shutdown.clone(),
        };

        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Message>();
        let actors = vec![
            SnapshotActor::new(msg_tx.clone(), aggregator).spawn(),
            LogTailActor::new(msg_tx.clone(), ctx.log_target.clone()).spawn(),
        ];

        send_state(&state_tx, &model);
        let mut last_tick = Instant::now();
        let mut last_reload = Instant::now();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            // Keyboard input (priority)
            while event::poll(Duration::ZERO)? {
                match event::read()? {
                    Event::Key(key) => {
                        let cmds = update(&mut model, Message::Key(key));
                        if ctx
                            .run_all(cmds, &msg_tx, &render_paused, &render_acked)
                            .await
                        {
                            shutdown.store(true, Ordering::Relaxed);
                            shutdown_actors(&actors);
                            return Ok(());
                        }
                    }
                    Event::Resize(w, h) => {
                        update(&mut model, Message::Resize(w, h));
                    }
                    _ => {}
                }
                flush_state(&state_tx, &mut model);
            }

            if last_tick.elapsed() >= TICK_INTERVAL {
                last_tick = Instant::now();
                update(&mut model, Message::Tick);
            }

            if last_reload.elapsed() >= CONFIG_RELOAD_INTERVAL {
                last_reload = Instant::now();
                ctx.reload_config(&msg_tx);
            }

            // Background messages (bounded)
            for _ in 0..MAX_BG_MESSAGES {
                let Ok(msg) = msg_rx.try_recv() else { break };
                let cmds = update(&mut model, msg);
                if ctx
                    .run_all(cmds, &msg_tx, &render_paused, &render_acked)
                    .await
                {
                    shutdown.store(true, Ordering::Relaxed);
                    shutdown_actors(&actors);
                    return Ok(());
                }
            }

            flush_state(&state_tx, &mut model);

            tokio::time::sleep(Duration::from_micros(500)).await;
        }

        shutdown_actors(&actors);
        Ok(())
    }
}

struct Executor {
    manager: Arc<WorkerManager>,
    layout: Arc<LayoutComposer>,
    config: ConfigStore,
    lead_percent: u8,
    log_target: Arc<RwLock<Option<PathBuf>>>,
    shutdown: Arc<AtomicBool>,
}

impl Executor {
    fn reload_config(&self, msg_tx: &mpsc::UnboundedSender<Message>) {
        let config = self.config.clone();
        let tx = msg_tx.clone();
        tokio::spawn(async move {
            if let Ok(resolved) = blocking(move || Ok(config.resolve())).await {
                let _ = tx.send(Message::ConfigReloaded(resolved));
            }
        });
    }

    /// Returns true once a command asks to quit.
    async fn run_all(
        &self,
        cmds: Vec<Command>,
        msg_tx: &mpsc::UnboundedSender<Message>,
        render_paused: &Arc<AtomicBool>,
        render_acked: &Arc<AtomicBool>,
    ) -> bool {
        for cmd in cmds {
            if self.execute(cmd, msg_tx, render_paused, render_acked).await {
                return true;
            }
        }
        false
    }

    async fn execute(
        &self,
        cmd: Command,
        msg_tx: &mpsc::UnboundedSender<Message>,
        render_paused: &Arc<AtomicBool>,
        render_acked: &Arc<AtomicBool>,
    ) -> bool {
        match cmd {
            Command::Worker { op, slot } => {
                hlog_debug!("Command::Worker op={} slot={}", op, slot);
                let manager = self.manager.clone();
                let tx = msg_tx.clone();
                tokio::spawn(async move {
                    let outcome = blocking(move || Ok(manager.apply(op, slot)))
                        .await
                        .unwrap_or_else(|e| Outcome::Failed(e.to_string()));
                    let _ = tx.send(Message::OpFinished { op, slot, outcome });
                });
            }

            Command::ToggleStatusPane => {
                hlog_debug!("Command::ToggleStatusPane");
                let layout = self.layout.clone();
                let percent = self.lead_percent;
                let tx = msg_tx.clone();
                tokio::spawn(async move {
                    let result = blocking(move || layout.toggle_status_pane(percent))
                        .await
                        .map_err(|e| e.to_string());
                    let _ = tx.send(Message::PaneToggled(result));
                });
            }

            Command::ToggleTheme => {
                hlog_debug!("Command::ToggleTheme");
                let config = self.config.clone();
                let tx = msg_tx.clone();
                tokio::spawn(async move {
                    let result = blocking(move || config.toggle_theme())
                        .await
                        .map_err(|e| e.to_string());
                    let _ = tx.send(Message::ThemeChanged(result));
                });
            }

            Command::FollowLog(path) => {
                hlog_debug!("Command::FollowLog {:?}", path);
                *self.log_target.write().await = path;
            }

            Command::Attach(target) => {
                let registry = self.manager.registry();
                let name = match target {
                    AttachTarget::Worker(slot) => registry.name(slot),
                    AttachTarget::Lead => registry.lead_name(),
                };
                hlog_debug!("Command::Attach {}", name);

                let host = registry.host().clone();
                let result = if !host.has_session(&name) {
                    Err(format!("session '{}' is not running", name))
                } else if Tmux::inside_tmux() {
                    // Workers open in a popup over this pane; the lead is its own client.
                    match target {
                        AttachTarget::Worker(_) => host.attach(&name),
                        AttachTarget::Lead => host.switch_client(&name),
                    }
                    .map_err(|e| e.to_string())
                } else {
                    render_paused.store(true, Ordering::Release);
                    let result = if wait_for_ack(render_acked, &self.shutdown, RENDER_ACK_TIMEOUT)
                    {
                        let _ = disable_raw_mode();
                        let _ = execute!(std::io::stdout(), LeaveAlternateScreen);
                        let result = host.attach(&name).map_err(|e| e.to_string());
                        let _ = enable_raw_mode();
                        let _ = execute!(std::io::stdout(), EnterAlternateScreen);
                        result
                    } else {
                        Err("renderer did not release the terminal".to_string())
                    };
                    render_paused.store(false, Ordering::Release);
                    result
                };
                if let Err(ref e) = result {
                    hlog_error!("Attach to {} failed: {}", name, e);
                }
                let _ = msg_tx.send(Message::AttachFinished(result));
            }

            Command::Quit => {
                hlog_debug!("Command::Quit");
                return true;
            }
        }

        false
    }
}

fn send_state(state_tx: &Sender<RenderState>, model: &Model) -> bool {
    state_tx.try_send(model.snapshot()).is_ok()
}

/// Hand a dirty model to the renderer. Stays dirty while the slot is full.
fn flush_state(state_tx: &Sender<RenderState>, model: &mut Model) {
    if model.dirty && send_state(state_tx, model) {
        model.dirty = false;
    }
}

/// Wait for the render thread to confirm it paused. Gives up on shutdown or
/// after `timeout`.
fn wait_for_ack(acked: &AtomicBool, shutdown: &AtomicBool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !acked.load(Ordering::Acquire) {
        if shutdown.load(Ordering::Relaxed) || Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}

fn shutdown_actors(actors: &[ActorHandle]) {
    hlog_debug!("Shutting down {} actors", actors.len());
    for actor in actors {
        actor.shutdown();
    }
}
