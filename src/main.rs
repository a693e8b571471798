//! keypulse - turn key presses into single, double and long press pulses

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode as CtKeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::Style,
    widgets::Block,
    Terminal,
};
use std::io::stdout;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use keypulse::{
    classifier::{Action, Classifier},
    config::{self, Config},
    keyboard::{KeyboardListener, RawEvent},
    scheduler::TimerThread,
    sink::{JsonLinesPublisher, MqttPublisher, PublishQueue, PulseSink, Publisher},
    ui::{ActionLogPanel, AppState, Dashboard, HeldKeysPanel, StatusBar, SummaryPanel},
};

#[cfg(target_os = "linux")]
use keypulse::keyboard::{evdev_status, list_keyboards, EvdevListener};

/// Interval between key state samples when raw device access is unavailable
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Parser, Debug)]
#[command(name = "keypulse", version, about = "Turn key presses into single, double and long press pulses")]
struct Args {
    /// Config file (default: platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write published messages to this file as JSON lines instead of
    /// sending them to the MQTT broker
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show the live dashboard (needs --output or a broker)
    #[arg(short, long)]
    dashboard: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// List keyboard devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Write the default config file and exit
    #[arg(long)]
    write_config: bool,
}

/// Where raw key transitions come from
enum EventSource {
    #[cfg(target_os = "linux")]
    Evdev(EvdevListener),
    Polling(KeyboardListener),
}

impl EventSource {
    #[cfg_attr(not(target_os = "linux"), allow(unused_variables))]
    fn open(config: &Config, event_tx: mpsc::Sender<RawEvent>) -> Self {
        #[cfg(target_os = "linux")]
        {
            if let Some(listener) = EvdevListener::try_new(&config.input.keyboard_name, event_tx.clone()) {
                log::info!("listening on {} device(s)", listener.device_paths().len());
                return Self::Evdev(listener);
            }
        }

        log::warn!("raw keyboard access unavailable, polling key state instead");
        Self::Polling(KeyboardListener::new(event_tx))
    }

    /// Block for at most `timeout` waiting for input
    fn wait(&mut self, timeout: Duration) -> Result<usize> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Evdev(listener) => Ok(listener.wait(timeout)?),
            Self::Polling(listener) => {
                let sent = listener.poll();
                if sent == 0 {
                    thread::sleep(timeout.min(FALLBACK_POLL_INTERVAL));
                }
                Ok(sent)
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

#[cfg(target_os = "linux")]
fn list_devices() -> Result<()> {
    println!("{}", evdev_status());
    for device in list_keyboards()? {
        println!("{}\t{}", device.path.display(), device.name);
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn list_devices() -> Result<()> {
    println!("Device listing is only available on Linux");
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Config::load().context("loading config"),
    }
}

/// Pick where messages go: `--output` file, then the configured broker,
/// then stdout
fn open_publisher(config: &Config, output: Option<&PathBuf>) -> Result<Arc<dyn Publisher>> {
    if let Some(path) = output {
        let publisher = JsonLinesPublisher::create(path)
            .with_context(|| format!("opening {}", path.display()))?;
        log::info!("writing messages to {}", path.display());
        return Ok(Arc::new(publisher));
    }

    if config.mqtt.enabled() {
        let publisher = MqttPublisher::connect(&config.mqtt)
            .with_context(|| format!("connecting to {}", config.mqtt.broker))?;
        log::info!("publishing to MQTT broker {}", config.mqtt.broker);
        return Ok(Arc::new(publisher));
    }

    log::info!("no broker configured, writing messages to stdout");
    Ok(Arc::new(JsonLinesPublisher::stdout()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_devices {
        return list_devices();
    }

    if args.write_config {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => config::config_path()?,
        };
        Config::default()
            .save_to(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = load_config(&args)?;

    if args.dashboard && args.output.is_none() && !config.mqtt.enabled() {
        bail!("--dashboard needs --output or an [mqtt] broker so published messages stay off the screen");
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("installing signal handler")?;
    }

    let timer = Arc::new(TimerThread::spawn().context("starting timer thread")?);
    let queue = Arc::new(
        PublishQueue::spawn(open_publisher(&config, args.output.as_ref())?)
            .context("starting publish thread")?,
    );

    let (action_tx, action_rx) = mpsc::channel::<Action>();
    let mut sink = PulseSink::new(
        config.topic_builder(),
        config.pulse_timings(),
        queue.clone(),
        timer.clone(),
    );
    if args.dashboard {
        sink = sink.with_observer(action_tx);
    }

    let thresholds = config.thresholds();
    let classifier = Classifier::new(thresholds, timer.clone(), Arc::new(sink));
    log::info!(
        "double press window {} ms, long press after {} ms",
        thresholds.double_window.as_millis(),
        thresholds.long_window.as_millis()
    );

    let (event_tx, event_rx) = mpsc::channel::<RawEvent>();
    let mut source = EventSource::open(&config, event_tx);

    let result = if args.dashboard {
        run_dashboard(&config, &classifier, &mut source, &event_rx, &action_rx, &running)
    } else {
        run_headless(&config, &classifier, &mut source, &event_rx, &running)
    };

    timer.shutdown();
    queue.shutdown();
    log::info!("stopped, {} key(s) seen", classifier.store().len());
    result
}

fn run_headless(
    config: &Config,
    classifier: &Classifier,
    source: &mut EventSource,
    event_rx: &mpsc::Receiver<RawEvent>,
    running: &AtomicBool,
) -> Result<()> {
    let timeout = config.poll_timeout();
    while running.load(Ordering::SeqCst) {
        source.wait(timeout)?;
        for event in event_rx.try_iter() {
            log::debug!("{:?} {}", event.transition, event.key);
            classifier.handle(&event);
        }
    }
    Ok(())
}

fn run_dashboard(
    config: &Config,
    classifier: &Classifier,
    source: &mut EventSource,
    event_rx: &mpsc::Receiver<RawEvent>,
    action_rx: &mpsc::Receiver<Action>,
    running: &AtomicBool,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut dashboard = Dashboard::new(config);
    let tick_rate = config.refresh_interval();
    let mut last_draw: Option<Instant> = None;

    let result = (|| -> Result<()> {
        while running.load(Ordering::SeqCst) && dashboard.state == AppState::Running {
            source.wait(tick_rate)?;
            for event in event_rx.try_iter() {
                classifier.handle(&event);
            }
            for action in action_rx.try_iter() {
                dashboard.record(&action);
            }

            if last_draw.is_some_and(|t| t.elapsed() < tick_rate) {
                continue;
            }
            last_draw = Some(Instant::now());
            dashboard.set_held(classifier.store().held_keys());

            terminal.draw(|frame| {
                let size = frame.area();
                frame.render_widget(
                    Block::default().style(Style::default().bg(dashboard.colors.bg)),
                    size,
                );

                let rows = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([
                        Constraint::Length(4), // Held keys
                        Constraint::Min(6),    // Log and summary
                        Constraint::Length(1), // Status bar
                    ])
                    .split(size);
                let columns = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Min(30), Constraint::Length(36)])
                    .split(rows[1]);

                frame.render_widget(HeldKeysPanel::new(&dashboard), rows[0]);
                frame.render_widget(ActionLogPanel::new(&dashboard), columns[0]);
                frame.render_widget(SummaryPanel::new(&dashboard), columns[1]);
                frame.render_widget(StatusBar::new(&dashboard), rows[2]);
            })?;

            // Raw mode swallows SIGINT, so Ctrl+C arrives as a key
            while event::poll(Duration::ZERO)? {
                if let Event::Key(key) = event::read()? {
                    match key.code {
                        CtKeyCode::Char('q') | CtKeyCode::Esc => dashboard.quit(),
                        CtKeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            dashboard.quit()
                        }
                        CtKeyCode::Char('r') => dashboard.reset(),
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    })();

    // Cleanup terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    println!("keypulse session complete.");
    println!("Actions emitted: {}", dashboard.total());
    println!("Session duration: {}", dashboard.elapsed_formatted());

    result
}
