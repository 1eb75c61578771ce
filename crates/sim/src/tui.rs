use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::widgets::canvas::{Canvas, Points, Rectangle};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::sim::Simulation;

pub fn render(frame: &mut Frame, simulation: &Simulation) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(frame.area());

    render_header(frame, chunks[0], simulation);
    render_world(frame, chunks[1], simulation);
}

fn render_header(frame: &mut Frame, area: Rect, simulation: &Simulation) {
    let observer = simulation.observer();
    let text = format!(
        "Observer at ({}, {})  |  sees {} of {} entities  |  'q' to quit",
        observer.position.x(),
        observer.position.y(),
        simulation.observed_count(),
        simulation.node_count() - 1,
    );

    let block = Block::default()
        .title(" Quadron ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_world(frame: &mut Frame, area: Rect, simulation: &Simulation) {
    let observer = simulation.observer();
    let aoi = observer.aoi_radius as f64;
    let (x, y) = (
        observer.position.x() as f64,
        observer.position.y() as f64,
    );
    let real = simulation.entity_positions();
    let observed = simulation.observed_positions();

    let canvas = Canvas::default()
        .block(Block::default().title(" World ").borders(Borders::ALL))
        .marker(Marker::Braille)
        .x_bounds([0.0, simulation.width()])
        .y_bounds([0.0, simulation.height()])
        .paint(|ctx| {
            // gray: true positions; blue: observer and its AOI square;
            // red: what the observer sees through the overlay
            ctx.draw(&Points {
                coords: &real,
                color: Color::DarkGray,
            });
            ctx.draw(&Rectangle {
                x: x - aoi,
                y: y - aoi,
                width: 2.0 * aoi,
                height: 2.0 * aoi,
                color: Color::Blue,
            });
            ctx.draw(&Points {
                coords: &[(x, y)],
                color: Color::Blue,
            });
            ctx.draw(&Points {
                coords: &observed,
                color: Color::Red,
            });
        });

    frame.render_widget(canvas, area);
}
