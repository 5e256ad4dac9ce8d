//! Phase-switched drawing for the session screen

use ratatui::prelude::*;
use ratatui::widgets::*;

use auricle::session::{PairwiseView, Phase, ProtocolView, SegmentationView};

use crate::App;

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();

    let title = match &app.snapshot.test_title {
        Some(name) => format!(" Auricle: {} ", name),
        None => format!(" Auricle v{} ", env!("CARGO_PKG_VERSION")),
    };
    let outer = Block::default()
        .title(title)
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let chunks = Layout::vertical([
        Constraint::Length(1), // status line
        Constraint::Min(6),    // phase body
        Constraint::Length(2), // prompt
        Constraint::Length(1), // help bar
    ])
    .split(inner);

    draw_status(f, app, chunks[0]);
    match app.snapshot.phase {
        Phase::Introduction => draw_introduction(f, app, chunks[1]),
        Phase::Training => draw_training(f, app, chunks[1]),
        Phase::Evaluation => draw_evaluation(f, app, chunks[1]),
        Phase::Submit | Phase::Complete => draw_complete(f, app, chunks[1]),
        Phase::Error => draw_error(f, app, chunks[1]),
    }
    draw_prompt(f, app, chunks[2]);
    draw_help(f, app, chunks[3]);
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let s = &app.snapshot;
    let mut spans = vec![
        Span::styled("  Phase: ", Style::default().fg(Color::DarkGray)),
        Span::styled(s.phase.to_string(), Style::default().fg(Color::White).bold()),
    ];
    if s.phase == Phase::Evaluation {
        spans.push(Span::styled("  Trial: ", Style::default().fg(Color::DarkGray)));
        spans.push(Span::styled(
            format!("{}/{}", s.condition_index + 1, s.condition_total),
            Style::default().fg(Color::White),
        ));
    }
    spans.push(Span::styled("  Loop: ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
        if s.loop_enabled { "on" } else { "off" },
        Style::default().fg(if s.loop_enabled {
            Color::Cyan
        } else {
            Color::DarkGray
        }),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_introduction(f: &mut Frame, app: &App, area: Rect) {
    let s = &app.snapshot;
    let rows =
        Layout::vertical([Constraint::Length(3), Constraint::Min(3)]).split(area);

    if s.loading_total > 0 {
        let done = s.loading_total - s.loading_remaining;
        let block = Block::default()
            .title(" Loading audio ")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::DarkGray));
        let gauge = Gauge::default()
            .block(block)
            .gauge_style(Style::default().fg(if s.loading_remaining == 0 {
                Color::Green
            } else {
                Color::Yellow
            }))
            .ratio(done as f64 / s.loading_total as f64)
            .label(format!("{}/{}", done, s.loading_total));
        f.render_widget(gauge, rows[0]);
    }

    f.render_widget(
        Paragraph::new(s.instructions.as_str()).wrap(Wrap { trim: true }),
        rows[1],
    );
}

fn draw_training(f: &mut Frame, app: &App, area: Rect) {
    let s = &app.snapshot;
    let rows =
        Layout::vertical([Constraint::Length(2), Constraint::Min(3)]).split(area);

    f.render_widget(
        Paragraph::new(s.instructions.as_str()).wrap(Wrap { trim: true }),
        rows[0],
    );

    let mut lines = Vec::new();
    for (i, item) in s.training.iter().enumerate() {
        let cursor = if i == app.selected { "> " } else { "  " };
        let mark = if item.played { "[x]" } else { "[ ]" };
        let style = if item.played {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::White)
        };
        lines.push(Line::from(vec![
            Span::raw(cursor.to_string()),
            Span::styled(format!("{} ", mark), style),
            Span::styled(
                format!("{} / {}", item.group, item.key),
                if i == app.selected {
                    Style::default().fg(Color::Yellow).bold()
                } else {
                    Style::default().fg(Color::White)
                },
            ),
        ]));
    }
    let block = Block::default()
        .title(" Training examples ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));
    f.render_widget(Paragraph::new(lines).block(block), rows[1]);
}

fn draw_evaluation(f: &mut Frame, app: &App, area: Rect) {
    let s = &app.snapshot;
    let rows = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(4),
    ])
    .split(area);

    f.render_widget(
        Paragraph::new(s.instructions.as_str()).wrap(Wrap { trim: true }),
        rows[0],
    );

    let playhead = Gauge::default()
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(s.position.clamp(0.0, 1.0))
        .label(format!("{:3.0}%", s.position.clamp(0.0, 1.0) * 100.0));
    f.render_widget(playhead, rows[1]);

    match &s.protocol {
        Some(ProtocolView::Rating {
            reference_keys,
            sliders,
        }) => draw_rating(f, app, reference_keys, sliders, rows[2]),
        Some(ProtocolView::Pairwise(view)) => draw_pairwise(f, view, rows[2]),
        Some(ProtocolView::Segmentation(view)) => draw_segmentation(f, view, rows[2]),
        None => {}
    }
}

fn draw_rating(
    f: &mut Frame,
    app: &App,
    reference_keys: &[String],
    sliders: &[auricle::session::RatingSlider],
    area: Rect,
) {
    let mut constraints = vec![Constraint::Length(1)];
    constraints.extend(sliders.iter().map(|_| Constraint::Length(1)));
    let rows = Layout::vertical(constraints).split(area);

    let reference_line = if reference_keys.is_empty() {
        Line::from(Span::styled(
            "  No reference for this condition",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(vec![
            Span::styled("  Reference: ", Style::default().fg(Color::DarkGray)),
            Span::styled(reference_keys.join(", "), Style::default().fg(Color::White)),
        ])
    };
    f.render_widget(Paragraph::new(reference_line), rows[0]);

    let span = (app.max_rating - app.min_rating).max(1) as f64;
    for (i, slider) in sliders.iter().enumerate() {
        let ratio = ((slider.value - app.min_rating) as f64 / span).clamp(0.0, 1.0);
        let style = if i == app.selected {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Cyan)
        };
        let gauge = Gauge::default()
            .gauge_style(style)
            .ratio(ratio)
            .label(format!("{}  {}", slider.key, slider.value));
        f.render_widget(gauge, rows[i + 1]);
    }
}

fn draw_pairwise(f: &mut Frame, view: &PairwiseView, area: Rect) {
    let rows =
        Layout::vertical([Constraint::Length(1), Constraint::Min(3)]).split(area);

    let reference_line = if view.reference_keys.is_empty() {
        Line::default()
    } else {
        Line::from(vec![
            Span::styled("  Reference: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                view.reference_keys.join(", "),
                Style::default().fg(Color::White),
            ),
        ])
    };
    f.render_widget(Paragraph::new(reference_line), rows[0]);

    let cols = Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);
    let candidates = [
        ("A", &view.candidate_a, view.played_a),
        ("B", &view.candidate_b, view.played_b),
    ];
    for ((label, key, played), col) in candidates.into_iter().zip(cols.iter()) {
        let selected = view.selected.as_deref() == Some(key.as_str());
        let border = if selected {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let block = Block::default()
            .title(format!(" {} ", label))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border);
        let heard = if played {
            Span::styled("heard", Style::default().fg(Color::Green))
        } else {
            Span::styled("not heard yet", Style::default().fg(Color::Yellow))
        };
        let text = vec![
            Line::from(Span::styled(
                key.to_string(),
                Style::default().fg(Color::White).bold(),
            )),
            Line::from(heard),
            Line::from(if selected {
                Span::styled("chosen", Style::default().fg(Color::Green).bold())
            } else {
                Span::raw("")
            }),
        ];
        f.render_widget(Paragraph::new(text).block(block), *col);
    }
}

fn draw_segmentation(f: &mut Frame, view: &SegmentationView, area: Rect) {
    let rows = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .split(area);

    let gate = if view.listen_complete {
        Span::styled(
            "  Mark where the recording changes",
            Style::default().fg(Color::White),
        )
    } else {
        Span::styled(
            "  Listen to the whole recording to unlock the marker",
            Style::default().fg(Color::Yellow),
        )
    };
    f.render_widget(Paragraph::new(Line::from(gate)), rows[0]);

    let (ratio, label) = if view.no_change {
        (0.0, "no change heard".to_string())
    } else {
        match view.marker {
            Some(m) => (m.clamp(0.0, 1.0), format!("change at {:3.0}%", m * 100.0)),
            None => (0.0, "marker not placed".to_string()),
        }
    };
    let block = Block::default()
        .title(format!(" {} ", view.stimulus_key))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));
    let marker = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(if view.listen_complete {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .ratio(ratio)
        .label(label);
    f.render_widget(marker, rows[1]);
}

fn draw_complete(f: &mut Frame, app: &App, area: Rect) {
    let text = if app.snapshot.phase == Phase::Complete {
        vec![
            Line::from(""),
            Line::from(Span::styled(
                "Results submitted.",
                Style::default().fg(Color::Green).bold(),
            )),
            Line::from("Thank you for taking part."),
        ]
    } else {
        vec![Line::from(""), Line::from("Submitting results...")]
    };
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center),
        area,
    );
}

fn draw_error(f: &mut Frame, app: &App, area: Rect) {
    let s = &app.snapshot;
    let message = s
        .fatal_error
        .as_deref()
        .or(s.prompt.as_deref())
        .unwrap_or("The session failed.");
    let mut text = vec![
        Line::from(""),
        Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(Color::Red).bold(),
        )),
    ];
    if s.advance_enabled {
        text.push(Line::from(""));
        text.push(Line::from("Press Enter to retry the submission."));
    }
    f.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        area,
    );
}

fn draw_prompt(f: &mut Frame, app: &App, area: Rect) {
    if app.snapshot.phase == Phase::Error {
        return;
    }
    if let Some(prompt) = &app.snapshot.prompt {
        f.render_widget(
            Paragraph::new(Span::styled(
                format!("  {}", prompt),
                Style::default().fg(Color::Yellow),
            ))
            .wrap(Wrap { trim: true }),
            area,
        );
    }
}

fn draw_help(f: &mut Frame, app: &App, area: Rect) {
    let keys: &[(&str, &str)] = match app.snapshot.phase {
        Phase::Introduction => &[("Enter", "start"), ("q", "quit")],
        Phase::Training => &[
            ("Up/Down", "choose"),
            ("p", "play"),
            ("Space", "pause"),
            ("Enter", "continue"),
            ("q", "quit"),
        ],
        Phase::Evaluation => match &app.snapshot.protocol {
            Some(ProtocolView::Pairwise(_)) => &[
                ("a/b", "listen"),
                ("1/2", "choose"),
                ("r", "reference"),
                ("Space", "pause"),
                ("Enter", "continue"),
            ],
            Some(ProtocolView::Segmentation(_)) => &[
                ("p", "listen"),
                ("Left/Right", "marker"),
                ("n", "no change"),
                ("v", "review"),
                ("Enter", "continue"),
            ],
            _ => &[
                ("Left/Right", "slider"),
                ("Up/Down", "adjust"),
                ("p", "play"),
                ("r", "reference"),
                ("Enter", "continue"),
            ],
        },
        Phase::Error if app.snapshot.advance_enabled => &[("Enter", "retry"), ("q", "quit")],
        _ => &[("q", "quit")],
    };

    let mut spans = Vec::new();
    for (i, (key, action)) in keys.iter().enumerate() {
        spans.push(Span::styled(
            format!("  '{}' ", key),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::raw(action.to_string()));
        if i + 1 < keys.len() {
            spans.push(Span::raw("  |"));
        }
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
