use crate::error::DartsError;
use crate::games::darts::{self, BustReason, Match, Phase, ThrowRecord, Turn};
use crate::games::GameState;

use ratatui::layout::{Constraint, Direction, Flex, Layout};
use ratatui::style::{self, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::{BorderType, Borders, Clear};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Stylize,
    symbols::border,
    text::{Line, Text},
    widgets::{Block, Paragraph, Widget},
};

// Index of the double checkbox in the focus cycle, after the three darts
const DOUBLE_FIELD: usize = 3;
const MAX_FIELD_LEN: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Warning(String),
    Error(String),
}

#[derive(Clone)]
pub struct InteractiveApp {
    pub game: Match,
    pub darts: [String; 3],
    pub is_double: bool,
    pub focus: usize,
    pub last_throw: Option<ThrowRecord>,
    pub status: Option<Status>,
    pub pending_save: bool,
}

impl InteractiveApp {
    pub fn new(game: Match) -> Self {
        Self {
            game,
            darts: Default::default(),
            is_double: false,
            focus: 0,
            last_throw: None,
            status: None,
            pending_save: false,
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % (DOUBLE_FIELD + 1);
    }

    pub fn focus_prev(&mut self) {
        self.focus = (self.focus + DOUBLE_FIELD) % (DOUBLE_FIELD + 1);
    }

    pub fn toggle_double(&mut self) {
        self.is_double = !self.is_double;
    }

    pub fn push_digit(&mut self, c: char) {
        if self.focus == DOUBLE_FIELD || !c.is_ascii_digit() {
            return;
        }

        let field = &mut self.darts[self.focus];
        if field.len() < MAX_FIELD_LEN {
            field.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.focus < DOUBLE_FIELD {
            self.darts[self.focus].pop();
        }
    }

    pub fn turn(&self) -> Result<Turn, DartsError> {
        let mut values = [0; 3];
        for (value, text) in values.iter_mut().zip(self.darts.iter()) {
            *value = darts::parse_dart(text)?;
        }

        Ok(Turn::new(values, self.is_double))
    }

    // Remaining score if the typed darts counted. None while a field does not
    // parse.
    pub fn preview(&self) -> Option<i32> {
        let turn = self.turn().ok()?;
        Some(self.game.current().remaining - turn.total() as i32)
    }

    // Take the committed turn: new match snapshot, cleared inputs and a status
    // line describing the outcome.
    pub fn record_throw(&mut self, record: ThrowRecord, game: Match) {
        self.status = Some(match (&record.winner, record.bust_reason) {
            (Some(winner), _) => Status::Info(format!("Winner: {}", winner)),
            (None, Some(reason)) => Status::Warning(bust_message(reason).to_string()),
            (None, None) => {
                Status::Info(format!("{} scored {}, {} left", record.player, record.total, record.remaining))
            }
        });

        self.game = game;
        self.last_throw = Some(record);
        self.darts = Default::default();
        self.is_double = false;
        self.focus = 0;
        self.pending_save = false;
    }

    pub fn report(&mut self, err: &DartsError, pending_save: bool) {
        self.pending_save = pending_save;
        self.status = Some(Status::Error(if pending_save {
            format!("{} Press <RET> to retry saving.", err)
        } else {
            err.to_string()
        }));
    }

    fn field_span(&self, idx: usize) -> Span<'static> {
        let style = if self.focus == idx {
            Style::default().fg(style::Color::Blue).add_modifier(Modifier::BOLD | Modifier::REVERSED)
        } else {
            Style::default()
        };
        Span::styled(format!(" {:>3} ", self.darts[idx]), style)
    }

    fn input_lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        lines.push(Line::from(""));

        for i in 0..3 {
            lines.push(Line::from(vec![format!("  Dart {}: ", i + 1).into(), self.field_span(i)]));
        }

        let checkbox = if self.is_double { "[x]" } else { "[ ]" };
        let style = if self.focus == DOUBLE_FIELD {
            Style::default().fg(style::Color::Blue).add_modifier(Modifier::BOLD | Modifier::REVERSED)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            "  ".into(),
            Span::styled(format!("{} This turn included a double", checkbox), style),
        ]));
        lines.push(Line::from(""));

        match self.preview() {
            Some(candidate) => {
                lines.push(Line::from(vec![
                    "  Remaining Score (Preview): ".into(),
                    candidate.max(0).to_string().bold(),
                ]));

                let current = self.game.current_player();
                if self.game.phase(current) == Phase::NeedsDoubleIn {
                    lines.push(Line::from(
                        "  Double-In required! Score will not count until a double is hit.".blue(),
                    ));
                } else if darts::is_bust_candidate(candidate) {
                    lines.push(Line::from("  This turn would be a bust!".yellow()));
                }
            }
            None => lines.push(Line::from(format!("  Darts score 0 to {}", darts::MAX_DART).red())),
        }

        lines
    }
}

fn throw_line(record: &ThrowRecord) -> Line<'static> {
    let [d1, d2, d3] = record.darts;
    let mut spans = vec![
        format!("  Last throw by {}: ", record.player).italic(),
        format!("{} + {} + {} = {}", d1, d2, d3, record.total).into(),
    ];
    if record.double {
        spans.push(" (double)".into());
    }
    spans.push(format!(" -> {}", record.remaining).into());
    if record.bust {
        spans.push(Span::styled(" BUST", Style::default().fg(style::Color::Red)).bold());
    }

    Line::from(spans)
}

fn bust_message(reason: BustReason) -> &'static str {
    match reason {
        BustReason::NoDoubleIn => "Double in required! Score not counted.",
        BustReason::NoDoubleOut => "Must finish on a double! Bust.",
        BustReason::LeftOnOne => "Cannot finish from 1! Bust.",
        BustReason::Overshoot => "Bust! Score reset.",
    }
}

fn status_line(status: &Option<Status>) -> Line<'static> {
    match status {
        Some(Status::Info(text)) => Line::from(format!("  {}", text).green()),
        Some(Status::Warning(text)) => Line::from(format!("  {}", text).yellow()),
        Some(Status::Error(text)) => Line::from(format!("  {}", text).red().bold()),
        None => Line::from(""),
    }
}

impl Widget for InteractiveApp {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(12),
                Constraint::Length(4),
            ])
            .split(area);

        let current = self.game.current_player();

        let header_text = Text::from(vec![Line::from(vec![
            " ".into(),
            if self.game.is_game_over() {
                Span::styled(" GAME OVER ", Style::default().fg(style::Color::Red)).bold().add_modifier(Modifier::REVERSED)
            } else {
                Span::styled(" GAME RUNNING ", Style::default().fg(style::Color::Blue)).bold().add_modifier(Modifier::REVERSED)
            },
            format!(" {} ", self.game.variant()).bold(),
            format!(" Players: {}, ", self.game.n_players()).into(),
            format!("Turn: {}, ", self.game.turn_number()).into(),
            format!("Match: {}", self.game.id()).dim(),
        ])]);

        Paragraph::new(header_text)
            .block(Block::bordered().border_set(border::THICK))
            .render(layout[0], buf);

        let body_layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(layout[1]);

        let mut score_lines = vec![Line::from("")];
        for (i, player) in self.game.players().iter().enumerate() {
            let mut spans = vec![
                if i == current { " -> ".blue().bold() } else { "    ".into() },
                format!("{}: {}", player.name, player.remaining).bold(),
                format!("  (Busts/No Scores: {})", player.busts).into(),
            ];
            match self.game.phase(i) {
                Phase::NeedsDoubleIn => spans.push("  needs double".dim()),
                Phase::Won => spans.push("  WINNER".green().bold()),
                Phase::Active => {}
            }
            score_lines.push(Line::from(spans));
        }

        Paragraph::new(score_lines)
            .block(Block::default().title(Line::from(" Scores & Busts ".bold())).borders(Borders::ALL))
            .render(body_layout[0], buf);

        let input_block = Block::default()
            .title(Line::from(format!(" {}'s Turn (3 Darts) ", self.game.current().name).bold()))
            .border_type(if self.game.is_game_over() { BorderType::Plain } else { BorderType::QuadrantOutside })
            .border_style(Style::default().fg(style::Color::Blue))
            .borders(Borders::ALL);

        if !self.game.is_game_over() {
            Paragraph::new(self.input_lines()).render(input_block.inner(body_layout[1]), buf);
        }
        input_block.render(body_layout[1], buf);

        let mut footer_lines = Vec::new();
        match &self.last_throw {
            Some(record) => footer_lines.push(throw_line(record)),
            None => footer_lines.push("  Last throw: NA".italic().into()),
        }
        footer_lines.push(status_line(&self.status));

        let keys = if self.game.is_game_over() {
            Line::from(vec![" New Game ".into(), "<n> ".blue().bold(), " Quit ".into(), "<q> ".blue().bold()])
        } else {
            Line::from(vec![
                " Next Field ".into(),
                "<TAB> ".blue().bold(),
                " Double ".into(),
                "<SPC> ".blue().bold(),
                if self.pending_save { " Retry Save ".into() } else { " Submit Turn ".into() },
                "<RET> ".blue().bold(),
                " Quit ".into(),
                "<q> ".blue().bold(),
            ])
        };

        Paragraph::new(footer_lines)
            .block(Block::bordered().title_bottom(keys.right_aligned()))
            .render(layout[2], buf);

        // Winner popup
        if let Some(winner) = self.game.winner() {
            let vertical = Layout::vertical([Constraint::Length(5)]).flex(Flex::Center);
            let horizontal = Layout::horizontal([Constraint::Percentage(50)]).flex(Flex::Center);
            let [popup] = vertical.areas(area);
            let [popup] = horizontal.areas(popup);
            Clear.render(popup, buf);

            let lines = vec![
                Line::from(""),
                Line::from(format!("Winner: {}", winner.name).green().bold()).centered(),
            ];
            Paragraph::new(lines)
                .block(Block::bordered().border_type(BorderType::Thick).title(" Game Over "))
                .render(popup, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::darts::Variant;

    fn app(variant: Variant) -> InteractiveApp {
        InteractiveApp::new(Match::start(variant, ["Eoin", "John", "Sarah"]).unwrap())
    }

    fn rendered(app: &InteractiveApp) -> String {
        let mut buf = Buffer::empty(Rect::new(0, 0, 140, 24));
        app.clone().render(buf.area, &mut buf);
        buf.content.iter().map(|cell| cell.symbol()).collect()
    }

    fn type_turn(app: &mut InteractiveApp, darts: [&str; 3]) {
        for text in darts {
            for c in text.chars() {
                app.push_digit(c);
            }
            app.focus_next();
        }
    }

    #[test]
    fn test_field_editing() {
        let mut app = app(Variant::FiveOhOne);
        type_turn(&mut app, ["60", "1800", "7"]);
        assert_eq!(app.darts, ["60".to_string(), "180".to_string(), "7".to_string()]);
        assert_eq!(app.focus, DOUBLE_FIELD);

        app.push_digit('5');
        app.toggle_double();
        assert!(app.is_double);

        app.focus_next();
        assert_eq!(app.focus, 0);
        app.backspace();
        app.focus_prev();
        assert_eq!(app.focus, DOUBLE_FIELD);

        assert_eq!(app.turn().unwrap(), Turn::new([6, 180, 7], true));
    }

    #[test]
    fn test_preview() {
        let mut app = app(Variant::FiveOhOne);
        assert_eq!(app.preview(), Some(501));

        type_turn(&mut app, ["60", "60", "60"]);
        assert_eq!(app.preview(), Some(321));

        app.darts[0] = "999".to_string();
        assert_eq!(app.preview(), None);
        assert!(matches!(app.turn(), Err(DartsError::InvalidInput { .. })));
    }

    #[test]
    fn test_record_throw_messages() {
        let mut app = app(Variant::ThreeOhOne);
        let mut game = app.game.clone();

        let (resolution, record) = game.resolve_turn(&Turn::new([20, 20, 16], false)).unwrap();
        game.apply_resolved_turn(&resolution).unwrap();
        app.record_throw(record, game.clone());
        assert_eq!(app.status, Some(Status::Warning("Double in required! Score not counted.".to_string())));
        assert_eq!(app.game.current().name, "John");

        let (resolution, record) = game.resolve_turn(&Turn::new([20, 20, 16], true)).unwrap();
        game.apply_resolved_turn(&resolution).unwrap();
        app.record_throw(record, game);
        assert_eq!(app.status, Some(Status::Info("John scored 56, 245 left".to_string())));
        assert!(app.darts.iter().all(|d| d.is_empty()));
        assert!(!app.is_double);
    }

    #[test]
    fn test_bust_messages() {
        let mut app = InteractiveApp::new(Match::start(Variant::FiveOhOne, ["Eoin", "John"]).unwrap());
        let mut game = app.game.clone();
        let mut play = |darts, is_double| {
            let (resolution, record) = game.resolve_turn(&Turn::new(darts, is_double)).unwrap();
            game.apply_resolved_turn(&resolution).unwrap();
            app.record_throw(record, game.clone());
            app.status.clone()
        };
        let warning = |text: &str| Some(Status::Warning(text.to_string()));

        play([180, 180, 101], false);
        play([0, 0, 0], false);
        assert_eq!(play([20, 20, 0], false), warning("Must finish on a double! Bust."));
        play([0, 0, 0], false);
        assert_eq!(play([20, 20, 1], true), warning("Bust! Score reset."));
        play([0, 0, 0], false);
        assert_eq!(play([20, 19, 0], true), warning("Cannot finish from 1! Bust."));
        play([0, 0, 0], false);
        assert_eq!(play([20, 20, 0], true), Some(Status::Info("Winner: Eoin".to_string())));
    }

    #[test]
    fn test_render_scoreboard() {
        let mut app = app(Variant::ThreeOhOne);
        let screen = rendered(&app);
        assert!(screen.contains("GAME RUNNING"));
        assert!(screen.contains("Eoin: 301"));
        assert!(screen.contains("Eoin's Turn"));
        assert!(screen.contains("Double-In required!"));

        app.report(&DartsError::persistence("disk full"), true);
        let screen = rendered(&app);
        assert!(screen.contains("disk full"));
        assert!(screen.contains("Retry Save"));
    }

    #[test]
    fn test_render_winner() {
        let mut game = Match::start(Variant::FiveOhOne, ["Eoin", "John"]).unwrap();
        for (darts, is_double) in [([180, 180, 101], false), ([0, 0, 0], false), ([20, 20, 0], true)] {
            let (resolution, _) = game.resolve_turn(&Turn::new(darts, is_double)).unwrap();
            game.apply_resolved_turn(&resolution).unwrap();
        }

        let screen = rendered(&InteractiveApp::new(game));
        assert!(screen.contains("GAME OVER"));
        assert!(screen.contains("Winner: Eoin"));
    }
}
