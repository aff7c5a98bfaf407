use std::io::{self, stdout, Stdout};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::{Receiver, TryRecvError};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::{backend::CrosstermBackend, Terminal};

use hive::agent::{Agent, DEFAULT_AGENT};
use hive::aggregate::Aggregator;
use hive::app::{Dashboard, LogicThread};
use hive::config::{ConfigKey, ConfigScope, ConfigStore};
use hive::layout::{LayoutComposer, LayoutMode, LayoutSpec, PaneToggle, DEFAULT_LEAD_PERCENT};
use hive::lifecycle::{WorkerManager, WorkerOp};
use hive::paths::HivePaths;
use hive::render::RenderState;
use hive::session::{ProjectIdentity, SessionRegistry, SlotId, DEFAULT_WORKERS, MAX_WORKERS};
use hive::status::{StatusStore, StatusUpdate, Subagent, SubagentState, WorkerState};
use hive::tmux::{SessionHost, Tmux};
use hive::worktree::{project_root, WorktreeProvisioner};
use hive::{hlog, ui, Error, Result};

const FRAME_DURATION: Duration = Duration::from_micros(16_666); // 60fps

/// Hive - run a fixed pool of coding agents side by side in tmux
#[derive(Parser, Debug)]
#[command(name = "hive")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    \
    HIVE_DEBUG=1         Enable debug logging (alternative to --debug)\n    \
    HIVE_PROJECT=<dir>   Project directory (alternative to --project)\n    \
    HIVE_SLOT=<n>        Slot `hive report` writes for (set inside workers)")]
pub struct Cli {
    /// Project directory (defaults to the enclosing git checkout)
    #[arg(long, global = true, env = "HIVE_PROJECT")]
    pub project: Option<PathBuf>,

    /// Number of worker slots
    #[arg(
        short = 'w',
        long,
        global = true,
        default_value_t = DEFAULT_WORKERS,
        value_parser = clap::value_parser!(u8).range(1..=MAX_WORKERS as i64)
    )]
    pub workers: u8,

    /// Agent command run in each worker and in the lead pane
    #[arg(long, global = true, env = "HIVE_AGENT", default_value = DEFAULT_AGENT)]
    pub agent: String,

    /// Enable debug logging (writes to ~/.hive/hive.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a worker (all workers when no slot is given)
    Up { slot: Option<u8> },

    /// Ask a worker's agent to exit (all workers when no slot is given)
    Down { slot: Option<u8> },

    /// Destroy a worker session (all workers when no slot is given)
    Kill { slot: Option<u8> },

    /// Kill, wait for the session to go away, then start again
    Restart { slot: Option<u8> },

    /// Show every slot's session and reported status
    List,

    /// Attach to a worker session, or `lead`
    Attach { target: String },

    /// Interactive status dashboard
    Dashboard,

    /// Build the lead session: lead pane plus status or worker panes
    Layout {
        /// Width of the lead pane, clamped to 20..=80
        #[arg(long, default_value_t = DEFAULT_LEAD_PERCENT)]
        lead_percent: u8,

        #[arg(long, value_enum, default_value_t = ModeArg::Status)]
        mode: ModeArg,

        /// Build the session without attaching to it
        #[arg(long)]
        no_attach: bool,
    },

    /// Read or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Write the calling worker's status document
    Report(ReportArgs),

    /// Kill worker sessions and remove their worktrees (branches are kept)
    Cleanup { slot: Option<u8> },

    /// Lead window pane controls (used by key bindings)
    #[command(hide = true)]
    Pane {
        #[command(subcommand)]
        action: PaneAction,
    },

    /// Flip between the dark and light theme (used by key bindings)
    #[command(hide = true)]
    ThemeToggle,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Status,
    Workers,
    LeadOnly,
}

impl From<ModeArg> for LayoutMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Status => LayoutMode::Status,
            ModeArg::Workers => LayoutMode::Workers,
            ModeArg::LeadOnly => LayoutMode::LeadOnly,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Print the effective value of a key
    Get { key: ConfigKey },
    /// Store a value (global unless --local)
    Set {
        key: ConfigKey,
        value: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Print every key with its effective value and where it came from
    List,
    /// Remove a key from one scope (global unless --local)
    Unset {
        key: ConfigKey,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeArgs {
    /// Use <project>/.hive/config.json
    #[arg(long, conflicts_with = "global")]
    pub local: bool,
    /// Use the per-user config file
    #[arg(long)]
    pub global: bool,
}

impl ScopeArgs {
    fn scope(&self) -> ConfigScope {
        if self.local {
            ConfigScope::Local
        } else {
            ConfigScope::Global
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ReportArgs {
    /// Slot to report for
    #[arg(long, env = "HIVE_SLOT")]
    pub slot: u8,

    /// idle, coding, testing, reviewing, ready_for_review or approved
    #[arg(long)]
    pub status: Option<WorkerState>,

    #[arg(long)]
    pub branch: Option<String>,

    /// What the worker is doing right now
    #[arg(long)]
    pub current: Option<String>,

    /// Progress, 0 to 100
    #[arg(long, allow_negative_numbers = true)]
    pub percent: Option<f64>,

    /// Name of the subagent currently attached to this worker
    #[arg(long)]
    pub subagent: Option<String>,

    /// running, passed or failed (defaults to running)
    #[arg(long, requires = "subagent")]
    pub subagent_status: Option<SubagentState>,

    #[arg(long, requires = "subagent")]
    pub subagent_message: Option<String>,
}

impl ReportArgs {
    fn into_update(self) -> StatusUpdate {
        let subagent = self.subagent.map(|name| Subagent {
            name,
            status: self.subagent_status.unwrap_or(SubagentState::Running),
            message: self.subagent_message,
        });
        StatusUpdate {
            status: self.status,
            branch: self.branch,
            current: self.current,
            percent: self.percent,
            subagent,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum PaneAction {
    /// Remove the status pane if shown, otherwise add it back
    Toggle {
        #[arg(long, default_value_t = DEFAULT_LEAD_PERCENT)]
        lead_percent: u8,
    },
}

/// What every host-facing command needs, resolved from the global flags.
struct Project {
    paths: HivePaths,
    registry: SessionRegistry,
    agent: Agent,
    workers: u8,
}

impl Project {
    fn resolve(cli: &Cli) -> Result<Self> {
        let start = match &cli.project {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let root = project_root(&start);
        let paths = HivePaths::new(&root);
        let registry = SessionRegistry::new(Arc::new(Tmux), ProjectIdentity::from_root(&root));
        hlog!(
            "Project {} at {} ({} workers)",
            registry.identity(),
            root.display(),
            cli.workers
        );
        Ok(Self {
            paths,
            registry,
            agent: Agent::new(&cli.agent),
            workers: cli.workers,
        })
    }

    fn manager(&self) -> WorkerManager {
        WorkerManager::new(
            self.registry.clone(),
            WorktreeProvisioner::git(),
            self.paths.clone(),
            self.agent.clone(),
            self.workers,
        )
    }

    fn composer(&self) -> Result<LayoutComposer> {
        Ok(LayoutComposer::new(
            self.registry.clone(),
            self.paths.clone(),
            std::env::current_exe()?,
            self.agent.clone(),
            self.workers,
        ))
    }

    fn slot(&self, n: u8) -> Result<SlotId> {
        SlotId::new(n, self.workers)
    }
}

fn main() {
    let cli = Cli::parse();
    hive::log::init_with_debug(cli.debug);

    if let Err(e) = run(cli) {
        hive::hlog_error!("{}", e);
        eprintln!("hive: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let command = cli.command.clone().unwrap_or(Command::Dashboard);
    hlog!("hive {:?}", command);

    // Commands that only touch files work without tmux.
    match command {
        Command::Config { action } => run_config(&cli, action),
        Command::Report(args) => run_report(&cli, args),
        Command::ThemeToggle => run_theme_toggle(&cli),
        command => {
            Tmux.require()?;
            let project = Project::resolve(&cli)?;
            if launches_agents(&command) && !project.agent.is_available() {
                hive::hlog_warn!("Agent '{}' not found on PATH", project.agent.binary());
                eprintln!(
                    "hive: warning: agent '{}' not found on PATH; sessions will start without it",
                    project.agent.binary()
                );
            }
            run_host(&project, command)
        }
    }
}

fn launches_agents(command: &Command) -> bool {
    matches!(
        command,
        Command::Up { .. } | Command::Restart { .. } | Command::Layout { .. }
    )
}

fn run_host(project: &Project, command: Command) -> Result<()> {
    match command {
        Command::Up { slot } => run_op(project, WorkerOp::Start, slot),
        Command::Down { slot } => run_op(project, WorkerOp::Stop, slot),
        Command::Kill { slot } => run_op(project, WorkerOp::Kill, slot),
        Command::Restart { slot } => run_op(project, WorkerOp::Restart, slot),
        Command::Cleanup { slot } => run_op(project, WorkerOp::Cleanup, slot),
        Command::List => run_list(project),
        Command::Attach { target } => run_attach(project, &target),
        Command::Dashboard => run_dashboard(project),
        Command::Layout {
            lead_percent,
            mode,
            no_attach,
        } => run_layout(project, lead_percent, mode.into(), no_attach),
        Command::Pane {
            action: PaneAction::Toggle { lead_percent },
        } => run_pane_toggle(project, lead_percent),
        Command::Config { .. } | Command::Report(_) | Command::ThemeToggle => Ok(()),
    }
}

/// One line per slot, plus a count when acting on all of them.
fn run_op(project: &Project, op: WorkerOp, slot: Option<u8>) -> Result<()> {
    let manager = project.manager();
    match slot {
        Some(n) => {
            let slot = project.slot(n)?;
            println!("worker {}: {}", slot, manager.apply(op, slot));
        }
        None => {
            let report = manager.apply_all(op);
            for (slot, outcome) in &report.outcomes {
                println!("worker {}: {}", slot, outcome);
            }
            println!("{}: {} succeeded", op, report);
        }
    }
    Ok(())
}

fn run_list(project: &Project) -> Result<()> {
    let manager = project.manager();
    let mut aggregator =
        Aggregator::new(project.registry.clone(), project.paths.clone(), project.workers);
    println!(
        "{:<6}  {:<22}  {:<16}  {:<24}  {:>4}  CURRENT",
        "SLOT", "STATE", "STATUS", "BRANCH", "%"
    );
    for info in aggregator.poll() {
        let status = info.live_status();
        println!(
            "{:<6}  {:<22}  {:<16}  {:<24}  {:>4}  {}",
            info.slot,
            manager.state(info.slot).to_string(),
            status.map(|s| s.status.as_str()).unwrap_or("-"),
            status.and_then(|s| s.branch.as_deref()).unwrap_or("-"),
            status
                .and_then(|s| s.display_percent())
                .map(|p| p.to_string())
                .unwrap_or_default(),
            status.and_then(|s| s.current.as_deref()).unwrap_or(""),
        );
    }
    Ok(())
}

fn run_attach(project: &Project, target: &str) -> Result<()> {
    if target.eq_ignore_ascii_case("lead") {
        return attach_lead(&project.registry);
    }
    let n: u8 = target.parse().map_err(|_| {
        Error::Validation(format!(
            "attach target must be a slot number or 'lead', got '{}'",
            target
        ))
    })?;
    project.manager().attach(project.slot(n)?)
}

fn attach_lead(registry: &SessionRegistry) -> Result<()> {
    let name = registry.lead_name();
    let host = registry.host();
    if !host.has_session(&name) {
        return Err(Error::Tmux(format!(
            "lead session '{}' is not running (try `hive layout`)",
            name
        )));
    }
    if Tmux::inside_tmux() {
        host.switch_client(&name)
    } else {
        host.attach(&name)
    }
}

fn run_layout(project: &Project, lead_percent: u8, mode: LayoutMode, no_attach: bool) -> Result<()> {
    let composed = project
        .composer()?
        .compose(LayoutSpec::new(lead_percent, mode))?;
    println!(
        "{}: lead {}{}, {} worker panes, {} key bindings",
        composed.session,
        composed.lead_pane,
        composed
            .status_pane
            .as_deref()
            .map(|p| format!(", status {}", p))
            .unwrap_or_default(),
        composed.worker_panes.len(),
        composed.bindings_installed
    );
    if no_attach {
        return Ok(());
    }
    attach_lead(&project.registry)
}

fn run_pane_toggle(project: &Project, lead_percent: u8) -> Result<()> {
    match project.composer()?.toggle_status_pane(lead_percent)? {
        PaneToggle::Added => println!("status pane shown"),
        PaneToggle::Removed => println!("status pane hidden"),
    }
    Ok(())
}

fn config_store(cli: &Cli) -> Result<ConfigStore> {
    let start = match &cli.project {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    Ok(ConfigStore::for_project(&HivePaths::new(&project_root(&start))))
}

fn run_config(cli: &Cli, action: ConfigAction) -> Result<()> {
    let store = config_store(cli)?;
    match action {
        ConfigAction::Get { key } => println!("{}", store.get(key).value),
        ConfigAction::Set { key, value, scope } => {
            let stored = store.set(scope.scope(), key, &value)?;
            println!("{} = {}", key, stored);
        }
        ConfigAction::List => {
            for entry in store.list() {
                println!("{} = {} ({})", entry.key, entry.value, entry.source);
            }
        }
        ConfigAction::Unset { key, scope } => {
            if store.unset(scope.scope(), key)? {
                println!("{} unset", key);
            } else {
                println!("{} was not set", key);
            }
        }
    }
    Ok(())
}

fn run_theme_toggle(cli: &Cli) -> Result<()> {
    let theme = config_store(cli)?.toggle_theme()?;
    println!("theme: {}", theme);
    Ok(())
}

/// Workers are told where their status file lives; outside a worker the
/// project's status directory is used.
fn run_report(cli: &Cli, args: ReportArgs) -> Result<()> {
    let store = match std::env::var_os("HIVE_STATUS_FILE").map(PathBuf::from) {
        Some(file) => StatusStore::new(
            file.parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        ),
        None => {
            let start = match &cli.project {
                Some(dir) => dir.clone(),
                None => std::env::current_dir()?,
            };
            StatusStore::for_project(&HivePaths::new(&project_root(&start)))
        }
    };
    let slot = SlotId::new(args.slot, MAX_WORKERS)?;
    let doc = store.report(slot, args.into_update())?;
    hlog!("worker {} reported {}", slot, doc.status);
    println!("worker {}: {}", slot, doc.status);
    Ok(())
}

fn run_dashboard(project: &Project) -> Result<()> {
    let manager = Arc::new(project.manager());
    let dashboard = Dashboard {
        aggregator: Aggregator::new(
            project.registry.clone(),
            project.paths.clone(),
            project.workers,
        ),
        layout: Arc::new(project.composer()?),
        config: ConfigStore::for_project(&project.paths),
        lead_percent: DEFAULT_LEAD_PERCENT,
        manager,
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let render_paused = Arc::new(AtomicBool::new(false));
    let render_acked = Arc::new(AtomicBool::new(false));
    let (state_tx, state_rx) = crossbeam_channel::bounded::<RenderState>(1);

    let shutdown_clone = shutdown.clone();
    let render_paused_clone = render_paused.clone();
    let render_acked_clone = render_acked.clone();
    let logic_handle = thread::spawn(move || {
        LogicThread::run(
            dashboard,
            state_tx,
            shutdown_clone,
            render_paused_clone,
            render_acked_clone,
        )
    });

    let mut terminal = setup_terminal()?;
    let result = render_loop(
        &mut terminal,
        state_rx,
        &shutdown,
        &render_paused,
        &render_acked,
    );

    shutdown.store(true, Ordering::SeqCst);
    let logic_result = logic_handle
        .join()
        .unwrap_or_else(|_| Err(Error::TaskJoin("logic thread panicked".to_string())));
    restore_terminal(&mut terminal)?;
    result.and(logic_result)
}

fn render_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    state_rx: Receiver<RenderState>,
    shutdown: &AtomicBool,
    render_paused: &AtomicBool,
    render_acked: &AtomicBool,
) -> Result<()> {
    let mut state = RenderState::default();
    let mut last_version: u64 = 0;
    let mut last_frame = Instant::now();
    let mut dirty = true;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        if render_paused.load(Ordering::Acquire) {
            render_acked.store(true, Ordering::Release);
            while render_paused.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
            render_acked.store(false, Ordering::Release);
            terminal.clear()?;
            dirty = true;
            continue;
        }

        match state_rx.try_recv() {
            Ok(s) => {
                dirty = dirty || s.version != last_version;
                state = s;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        if last_frame.elapsed() < FRAME_DURATION {
            thread::sleep(Duration::from_micros(500));
            continue;
        }
        last_frame = Instant::now();

        if dirty {
            terminal.draw(|f| ui::draw(f, &state))?;
            last_version = state.version;
            dirty = false;
        }
    }
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.hide_cursor()?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(disable_raw_mode()?)
}
