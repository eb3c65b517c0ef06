use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Chart, Dataset, GraphType},
    Frame, Terminal,
};
use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};

/// Produces the latest channel activity as (channel index, value) pairs.
type ChannelGenerator = Box<dyn FnMut() -> Vec<(f64, f64)>>;

struct App {
    generator: ChannelGenerator,
    points: Vec<(f64, f64)>,
}

impl App {
    fn new(generator: ChannelGenerator) -> App {
        App {
            generator,
            points: vec![],
        }
    }

    fn on_tick(&mut self) {
        let latest = (self.generator)();
        // Keep the previous frame on screen when no sample arrived.
        if !latest.is_empty() {
            self.points = latest;
        }
    }
}

pub fn engage_gui(generator: ChannelGenerator) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let tick_rate = Duration::from_millis(100);
    let app = App::new(generator);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{:?}", err)
    }

    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &mut app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') = key.code {
                    return Ok(());
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chart = Chart::new(vec![Dataset::default()
        .name("channels")
        .marker(symbols::Marker::Dot)
        .graph_type(GraphType::Scatter)
        .style(Style::default().fg(Color::Cyan))
        .data(&app.points)])
    .block(Block::default().title("Live sEMG activity (q to quit)"))
    .x_axis(
        Axis::default()
            .title(Span::styled("channel", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds([-0.5, 15.5])
            .labels(
                ["0", "4", "8", "12", "15"]
                    .iter()
                    .cloned()
                    .map(Span::from)
                    .collect(),
            ),
    )
    .y_axis(
        Axis::default()
            .title(Span::styled("activation", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds([-150.0, 150.0])
            .labels(
                ["-150", "0", "150"]
                    .iter()
                    .cloned()
                    .map(Span::from)
                    .collect(),
            ),
    );

    f.render_widget(chart, f.size());
}
