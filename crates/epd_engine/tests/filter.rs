mod common;

use epd_core::FilterSettings;
use epd_engine::{FilterError, PassThroughFilter, PgnRecordFilter, RecordFilter};
use pretty_assertions::assert_eq;

use common::{game, init_logging};

fn settings(min_ply: u32, max_ply: u32, min_rating: u32, eco_prefix: &str) -> FilterSettings {
    FilterSettings {
        min_ply,
        max_ply,
        min_rating,
        eco_prefix: eco_prefix.to_string(),
        dedup: true,
    }
}

fn run(filter: &PgnRecordFilter, record: &str) -> Option<String> {
    filter.filter(record.as_bytes()).expect("filter")
}

#[test]
fn emits_one_line_per_ply_in_range() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(2, 3, 0, ""));
    let output = run(&filter, &game(1)).expect("accepted");
    assert_eq!(
        output,
        "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2 \
         id \"C42 2020-01-02 White 1 vs Black 1\";\n\
         rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2 \
         id \"C42 2020-01-02 White 1 vs Black 1\";\n"
    );
}

#[test]
fn ply_range_is_clamped_to_the_game() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(0, 40, 0, ""));
    let output = run(&filter, &game(0)).expect("accepted");
    assert_eq!(output.lines().count(), 6);
    assert!(output
        .lines()
        .last()
        .is_some_and(|line| line.starts_with("r1bqkbnr/1ppp1ppp/p1n5/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 0 4 id ")));

    let filter = PgnRecordFilter::new(settings(7, 40, 0, ""));
    assert_eq!(run(&filter, &game(0)), None);
}

#[test]
fn both_players_must_reach_the_rating() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(1, 1, 2400, ""));
    // White is rated 2300, 2400 and 2500 for games 0, 1 and 2.
    assert_eq!(run(&filter, &game(0)), None);
    assert!(run(&filter, &game(1)).is_some());
    assert!(run(&filter, &game(2)).is_some());

    let unrated = "[White \"a\"]\n[Black \"b\"]\n\n1. d4 *\n";
    assert_eq!(run(&filter, unrated), None);
    let garbled = "[WhiteElo \"?\"]\n[BlackElo \"2600\"]\n\n1. d4 *\n";
    assert_eq!(run(&filter, garbled), None);

    let open = PgnRecordFilter::new(settings(1, 1, 0, ""));
    assert!(run(&open, unrated).is_some());
}

#[test]
fn eco_prefix_selects_openings() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(1, 1, 0, "B"));
    assert!(run(&filter, &game(0)).is_some());
    assert_eq!(run(&filter, &game(1)), None);

    let untagged = "1. e4 c5 *\n";
    assert_eq!(run(&filter, untagged), None);
    let any = PgnRecordFilter::new(settings(1, 1, 0, ""));
    assert_eq!(
        run(&any, untagged).as_deref(),
        Some("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1 id \"? ????-??-?? ? vs ?\";\n")
    );
}

#[test]
fn quotes_in_names_are_escaped() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(1, 1, 0, ""));
    let record = "[White \"O\\\"Kelly\"]\n[Black \"Smith\"]\n[ECO \"A00\"]\n\n1. b3 *\n";
    assert_eq!(
        run(&filter, record).as_deref(),
        Some("rnbqkbnr/pppppppp/8/8/8/1P6/P1PPPPPP/RNBQKBNR b KQkq - 0 1 id \"A00 ????-??-?? O\\\"Kelly vs Smith\";\n")
    );
}

#[test]
fn positions_follow_a_fen_tag() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(1, 2, 0, ""));
    let record = "[FEN \"4k3/8/8/8/8/8/8/4K2R w K - 0 1\"]\n[SetUp \"1\"]\n\n1. 0-0 Kd7 *\n";
    assert_eq!(
        run(&filter, record).as_deref(),
        Some(
            "4k3/8/8/8/8/8/8/5RK1 b - - 1 1 id \"? ????-??-?? ? vs ?\";\n\
             8/3k4/8/8/8/8/8/5RK1 w - - 2 2 id \"? ????-??-?? ? vs ?\";\n"
        )
    );
}

#[test]
fn an_illegal_move_fails_the_record() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(1, 10, 0, ""));
    let record = "[ECO \"C20\"]\n\n1. e4 e5 2. Ke3 Nc6 *\n";
    match filter.filter(record.as_bytes()) {
        Err(FilterError::IllegalMove { ply, san }) => {
            assert_eq!(ply, 3);
            assert_eq!(san, "Ke3");
        }
        other => panic!("unexpected {other:?}"),
    }

    // Plies past the range are never replayed.
    let short = PgnRecordFilter::new(settings(1, 2, 0, ""));
    assert_eq!(run(&short, record).map(|out| out.lines().count()), Some(2));
}

#[test]
fn repeated_positions_are_written_once() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(1, 8, 0, ""));
    let first = run(&filter, &game(4)).expect("accepted");
    assert_eq!(first.lines().count(), 6);
    assert_eq!(run(&filter, &game(4)), None);

    // A game sharing only a prefix keeps its new positions.
    let longer = game(4).replace("3. Bb5 a6", "3. Bb5 a6 4. Ba4 Nf6");
    let fresh = run(&filter, &longer).expect("new plies");
    assert_eq!(fresh.lines().count(), 2);
    assert!(fresh.starts_with("r1bqkbnr/1ppp1ppp/p1n5/4p3/B3P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 1 4 "));

    let keep_all = PgnRecordFilter::new(FilterSettings {
        dedup: false,
        ..settings(1, 8, 0, "")
    });
    assert_eq!(run(&keep_all, &game(4)), Some(first.clone()));
    assert_eq!(run(&keep_all, &game(4)), Some(first));
}

#[test]
fn byte_order_mark_does_not_hide_tags() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(1, 1, 0, "B20"));
    let mut record = b"\xEF\xBB\xBF".to_vec();
    record.extend_from_slice(game(0).as_bytes());
    let output = filter.filter(&record).unwrap().expect("accepted");
    assert!(output.ends_with("id \"B20 2020-01-01 White 0 vs Black 0\";\n"));
}

#[test]
fn latin1_records_are_decoded() {
    init_logging();
    let filter = PgnRecordFilter::new(settings(1, 1, 0, ""));
    let record = b"[White \"M\xFCller\"]\n[Black \"Nunn\"]\n\n1. c4 *\n";
    let output = filter.filter(record).unwrap().expect("accepted");
    assert!(output.contains("M\u{fc}ller vs Nunn"));
}

#[test]
fn pass_through_keeps_records_verbatim() {
    init_logging();
    let record = game(3);
    assert_eq!(
        PassThroughFilter.filter(record.as_bytes()).unwrap(),
        Some(record)
    );
}
