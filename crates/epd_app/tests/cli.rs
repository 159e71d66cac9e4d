use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn pgn2epd(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pgn2epd"))
        .args(args)
        .current_dir(dir)
        .output()
        .expect("run pgn2epd")
}

fn write_games(dir: &Path, count: usize) {
    let mut pgn = String::new();
    for i in 0..count {
        let eco = if i % 2 == 0 { "B20" } else { "C42" };
        pgn.push_str(&format!(
            "[Event \"Game {i}\"]\n[White \"W{i}\"]\n[Black \"B{i}\"]\n[Date \"2021.03.04\"]\n\
             [ECO \"{eco}\"]\n[WhiteElo \"2500\"]\n[BlackElo \"2450\"]\n\n\
             1. e4 {{best by test}} e5 2. Nf3 (2. f4 exf4) Nc6 1-0\n\n"
        ));
    }
    fs::write(dir.join("games.pgn"), pgn).unwrap();
}

fn leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}

#[test]
fn run_converts_with_worker_processes() {
    let temp = TempDir::new().unwrap();
    write_games(temp.path(), 30);

    let output = pgn2epd(&["run", "games.pgn", "-m", "2", "-w", "3"], temp.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("[COMPLETE] 100% - Success! Kept 30 of 30 games"));
    assert!(stdout.contains("Kept 30 of 30 games in "));

    let epd = fs::read_to_string(temp.path().join("output_positions.epd")).unwrap();
    let lines: Vec<&str> = epd.lines().collect();
    assert_eq!(lines.len(), 60);
    assert_eq!(
        lines[0],
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1 id \"B20 2021-03-04 W0 vs B0\";"
    );
    assert_eq!(
        lines[59],
        "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2 id \"C42 2021-03-04 W29 vs B29\";"
    );
    assert!(leftovers(temp.path()).is_empty());
}

#[test]
fn profile_supplies_defaults_and_flags_win() {
    let temp = TempDir::new().unwrap();
    write_games(temp.path(), 10);
    fs::write(
        temp.path().join("sicilian.ron"),
        "(output: \"sicilian.epd\", max_ply: 1, eco: \"B\", workers: Some(2))",
    )
    .unwrap();

    let output = pgn2epd(
        &["run", "games.pgn", "--profile", "sicilian.ron", "-m", "3"],
        temp.path(),
    );
    assert!(output.status.success());
    let epd = fs::read_to_string(temp.path().join("sicilian.epd")).unwrap();
    assert_eq!(epd.lines().count(), 5 * 3);
    assert!(epd.lines().all(|line| line.contains("\"B20 ")));
}

#[test]
fn repeated_games_yield_each_line_once() {
    let temp = TempDir::new().unwrap();
    let game = "[White \"Same\"]\n[Black \"Pair\"]\n[ECO \"C42\"]\n\n1. e4 e5 2. Nf3 Nf6 1/2-1/2\n\n";
    fs::write(temp.path().join("games.pgn"), game.repeat(12)).unwrap();

    let output = pgn2epd(
        &["run", "games.pgn", "-e", "0", "-m", "4", "-w", "3", "-o", "once.epd"],
        temp.path(),
    );
    assert!(output.status.success());
    let once = fs::read_to_string(temp.path().join("once.epd")).unwrap();
    assert_eq!(once.lines().count(), 4);

    let output = pgn2epd(
        &[
            "run", "games.pgn", "-e", "0", "-m", "4", "-w", "3", "-o", "all.epd",
            "--keep-duplicates",
        ],
        temp.path(),
    );
    assert!(output.status.success());
    let all = fs::read_to_string(temp.path().join("all.epd")).unwrap();
    assert_eq!(all.lines().count(), 12 * 4);
    assert_eq!(all.lines().take(4).collect::<Vec<_>>(), once.lines().collect::<Vec<_>>());
}

#[test]
fn invalid_settings_exit_with_failure() {
    let temp = TempDir::new().unwrap();
    write_games(temp.path(), 2);

    let output = pgn2epd(&["run", "games.pgn", "-s", "9", "-m", "3"], temp.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("min ply"));
    assert!(!temp.path().join("output_positions.epd").exists());

    let output = pgn2epd(&["run", "missing.pgn"], temp.path());
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn interactive_abort_discards_everything() {
    use std::io::Write;
    use std::process::Stdio;

    let temp = TempDir::new().unwrap();
    write_games(temp.path(), 20);

    let mut child = Command::new(env!("CARGO_BIN_EXE_pgn2epd"))
        .args(["run", "games.pgn", "-w", "2", "--interactive"])
        .current_dir(temp.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    // Either the abort lands mid-run or the job already finished; both settle.
    writeln!(child.stdin.take().unwrap(), "abort").unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.contains("[STOPPED]") {
        assert!(!temp.path().join("output_positions.epd").exists());
    }
    assert!(leftovers(temp.path()).is_empty());
}
