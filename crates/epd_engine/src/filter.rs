use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use epd_core::FilterSettings;
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};
use thiserror::Error;

use crate::decode::{decode_record, DecodeError};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("bad FEN tag '{fen}': {message}")]
    StartPosition { fen: String, message: String },
    #[error("illegal move '{san}' at ply {ply}")]
    IllegalMove { ply: usize, san: String },
}

/// Turns one raw record into zero or one output record.
///
/// `Ok(None)` drops the record. A returned string is written to the chunk
/// output as is, with a single write, so it should carry its own newlines.
pub trait RecordFilter: Send + Sync {
    fn filter(&self, record: &[u8]) -> Result<Option<String>, FilterError>;
}

/// Keeps every record unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughFilter;

impl RecordFilter for PassThroughFilter {
    fn filter(&self, record: &[u8]) -> Result<Option<String>, FilterError> {
        Ok(Some(decode_record(record)?.text))
    }
}

/// Extracts opening positions from one PGN game as EPD lines.
///
/// Each kept ply yields `<FEN> id "<ECO> <date> <white> vs <black>";`, the
/// position after that ply. With `dedup` set, a line this filter already
/// produced is not produced again.
#[derive(Debug)]
pub struct PgnRecordFilter {
    settings: FilterSettings,
    seen: Mutex<HashSet<String>>,
}

impl PgnRecordFilter {
    pub fn new(settings: FilterSettings) -> Self {
        Self {
            settings,
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn accepts(&self, game: &PgnGame) -> bool {
        let eco = game.tag("ECO").unwrap_or("?");
        if !eco.starts_with(self.settings.eco_prefix.as_str()) {
            return false;
        }
        if self.settings.min_rating == 0 {
            return true;
        }
        let rating = |name| game.tag(name).unwrap_or("0").trim().parse::<u32>().ok();
        match (rating("WhiteElo"), rating("BlackElo")) {
            (Some(white), Some(black)) => {
                white >= self.settings.min_rating && black >= self.settings.min_rating
            }
            _ => false,
        }
    }

    /// Keeps the lines not seen before, in order.
    fn unseen(&self, lines: Vec<String>) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        lines
            .into_iter()
            .filter(|line| seen.insert(line.clone()))
            .collect()
    }
}

impl RecordFilter for PgnRecordFilter {
    fn filter(&self, record: &[u8]) -> Result<Option<String>, FilterError> {
        let decoded = decode_record(record)?;
        let game = PgnGame::parse(&decoded.text);
        if !self.accepts(&game) {
            return Ok(None);
        }

        let moves = game.main_line();
        let first = self.settings.min_ply.max(1) as usize;
        let last = (self.settings.max_ply as usize).min(moves.len());
        if first > last {
            return Ok(None);
        }

        let id = game.id_opcode();
        let mut position = game.start_position()?;
        let mut lines = Vec::with_capacity(last + 1 - first);
        for (index, san) in moves[..last].iter().enumerate() {
            let ply = index + 1;
            let illegal = || FilterError::IllegalMove {
                ply,
                san: san.clone(),
            };
            let parsed: SanPlus = san.parse().map_err(|_| illegal())?;
            let mv = parsed.san.to_move(&position).map_err(|_| illegal())?;
            position.play_unchecked(&mv);
            if ply >= first {
                let fen = Fen::from_position(position.clone(), EnPassantMode::Legal);
                lines.push(format!("{fen} {id}\n"));
            }
        }

        if self.settings.dedup {
            lines = self.unseen(lines);
        }
        if lines.is_empty() {
            return Ok(None);
        }
        Ok(Some(lines.concat()))
    }
}

#[derive(Debug, Default)]
struct PgnGame {
    tags: HashMap<String, String>,
    movetext: String,
}

impl PgnGame {
    fn parse(text: &str) -> Self {
        let mut game = PgnGame::default();
        for line in text.lines() {
            if line.starts_with('%') {
                continue;
            }
            let trimmed = line.trim();
            if game.movetext.trim().is_empty() && trimmed.starts_with('[') {
                if let Some((name, value)) = parse_tag(trimmed) {
                    game.tags.entry(name).or_insert(value);
                }
                continue;
            }
            game.movetext.push_str(line);
            game.movetext.push('\n');
        }
        game
    }

    fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// The standard start, or the position a `FEN` tag sets up.
    fn start_position(&self) -> Result<Chess, FilterError> {
        let Some(fen) = self.tag("FEN") else {
            return Ok(Chess::default());
        };
        let bad = |message: String| FilterError::StartPosition {
            fen: fen.to_string(),
            message,
        };
        let parsed: Fen = fen.trim().parse().map_err(|err| bad(format!("{err}")))?;
        parsed
            .into_position::<Chess>(CastlingMode::Standard)
            .map_err(|err| bad(format!("{err}")))
    }

    fn id_opcode(&self) -> String {
        let eco = self.tag("ECO").unwrap_or("?");
        let date = self.tag("Date").unwrap_or("????.??.??").replace('.', "-");
        let white = escape(self.tag("White").unwrap_or("?"));
        let black = escape(self.tag("Black").unwrap_or("?"));
        format!("id \"{eco} {date} {white} vs {black}\";")
    }

    /// SAN tokens of the main line, without comments, variations or annotations.
    fn main_line(&self) -> Vec<String> {
        let mut moves = Vec::new();
        let mut token = String::new();
        let mut depth = 0usize;
        let mut chars = self.movetext.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    for c in chars.by_ref() {
                        if c == '}' {
                            break;
                        }
                    }
                }
                ';' => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if c.is_whitespace() => push_move(&mut moves, &mut token),
                c if depth == 0 => token.push(c),
                _ => {}
            }
            if matches!(c, '{' | ';' | '(' | ')') {
                push_move(&mut moves, &mut token);
            }
        }
        push_move(&mut moves, &mut token);
        moves
    }
}

fn push_move(moves: &mut Vec<String>, token: &mut String) {
    let raw = std::mem::take(token);
    if matches!(raw.as_str(), "1-0" | "0-1" | "1/2-1/2" | "*") || raw.starts_with('$') {
        return;
    }
    let san = match raw.rfind('.') {
        Some(dot) if raw.starts_with(|c: char| c.is_ascii_digit()) => &raw[dot + 1..],
        _ => raw.as_str(),
    };
    let san = san.trim_end_matches(['!', '?']);
    match san {
        "" => {}
        "0-0" => moves.push("O-O".to_string()),
        "0-0-0" => moves.push("O-O-O".to_string()),
        san => moves.push(san.to_string()),
    }
}

fn parse_tag(line: &str) -> Option<(String, String)> {
    let body = line.strip_prefix('[')?.trim_end().strip_suffix(']')?;
    let (name, rest) = body.trim_start().split_once(char::is_whitespace)?;
    let rest = rest.trim_start().strip_prefix('"')?;

    let mut value = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?),
            '"' => return Some((name.to_string(), value)),
            c => value.push(c),
        }
    }
    None
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
