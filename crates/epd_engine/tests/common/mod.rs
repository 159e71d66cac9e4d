#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};

use epd_engine::{FilterError, RecordFilter};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(engine_logging::initialize_for_tests);
}

pub const ECO_CODES: [&str; 4] = ["B20", "C42", "D37", "A04"];

/// One tagged game with six plies, a comment and a variation.
pub fn game(index: usize) -> String {
    format!(
        "[Event \"Game {index}\"]\n\
         [Site \"?\"]\n\
         [Date \"2020.01.{day:02}\"]\n\
         [White \"White {index}\"]\n\
         [Black \"Black {index}\"]\n\
         [Result \"1-0\"]\n\
         [WhiteElo \"{elo}\"]\n\
         [BlackElo \"2500\"]\n\
         [ECO \"{eco}\"]\n\
         \n\
         1. e4 {{[Event \"not a tag\"]}} e5 2. Nf3 (2. f4 exf4) Nc6 3. Bb5 a6 1-0\n\
         \n",
        day = index % 28 + 1,
        elo = 2300 + (index % 3) * 100,
        eco = ECO_CODES[index % 4],
    )
}

pub fn games(count: usize) -> String {
    (0..count).map(game).collect()
}

pub fn write_games(dir: &Path, count: usize) -> PathBuf {
    let path = dir.join("games.pgn");
    fs::write(&path, games(count)).expect("write pgn");
    path
}

pub fn temp_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "tmp"))
        .collect()
}

pub fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("read output")
        .lines()
        .map(str::to_string)
        .collect()
}

/// True if `part` appears in `whole` in the same relative order.
pub fn is_subsequence(part: &[String], whole: &[String]) -> bool {
    let mut rest = whole.iter();
    part.iter().all(|line| rest.any(|candidate| candidate == line))
}

pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Emits the first line of each record; blocks every call after the first
/// `pass` until the gate is opened.
pub struct GatedFilter {
    pass: usize,
    calls: AtomicUsize,
    open: Mutex<bool>,
    wake: Condvar,
}

impl GatedFilter {
    pub fn new(pass: usize) -> Self {
        Self {
            pass,
            calls: AtomicUsize::new(0),
            open: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.wake.notify_all();
    }
}

impl RecordFilter for GatedFilter {
    fn filter(&self, record: &[u8]) -> Result<Option<String>, FilterError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.pass {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.wake.wait(open).unwrap();
            }
        }
        let text = String::from_utf8_lossy(record);
        Ok(Some(format!("{}\n", text.lines().next().unwrap_or_default())))
    }
}

/// Fails on every record whose text contains `needle`.
pub struct FailingFilter {
    pub needle: &'static str,
}

impl RecordFilter for FailingFilter {
    fn filter(&self, record: &[u8]) -> Result<Option<String>, FilterError> {
        let text = String::from_utf8_lossy(record);
        if text.contains(self.needle) {
            return Err(FilterError::Malformed(format!("found {}", self.needle)));
        }
        Ok(Some(format!("{}\n", text.lines().next().unwrap_or_default())))
    }
}
