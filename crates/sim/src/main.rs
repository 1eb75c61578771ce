mod sim;
mod tui;

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use sim::{SimConfig, Simulation};

#[derive(Parser)]
#[command(name = "quadron-sim")]
#[command(about = "Overlay network demo with randomly walking entities")]
struct Args {
    /// Number of overlay nodes
    #[arg(short, long, default_value_t = 30)]
    nodes: usize,

    /// Width of the region the entities walk in
    #[arg(long, default_value_t = 800)]
    width: i64,

    /// Height of the region
    #[arg(long, default_value_t = 600)]
    height: i64,

    /// AOI radius of every entity
    #[arg(short, long, default_value_t = 100)]
    aoi_radius: i64,

    /// Milliseconds between simulation steps
    #[arg(long, default_value_t = 30)]
    step_ms: u64,

    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let config = SimConfig {
        nodes: args.nodes.max(2),
        width: args.width.max(100),
        height: args.height.max(100),
        aoi_radius: args.aoi_radius,
    };
    let step = Duration::from_millis(args.step_ms.max(1));

    let mut simulation = Simulation::start(config)?;

    if args.headless {
        run_headless(&mut simulation, step)
    } else {
        run_with_tui(&mut simulation, step)?;
        Ok(())
    }
}

fn run_headless(simulation: &mut Simulation, step: Duration) -> Result<()> {
    let mut last_report = Instant::now();

    loop {
        simulation.step();

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            log::info!(
                "observer sees {} of {} entities",
                simulation.observed_count(),
                simulation.node_count() - 1
            );
        }

        thread::sleep(step);
    }
}

fn run_with_tui(simulation: &mut Simulation, step: Duration) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut running = true;
    while running {
        simulation.step();

        if event::poll(step)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => running = false,
                        _ => {}
                    }
                }
            }
        }

        terminal.draw(|frame| tui::render(frame, simulation))?;
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
