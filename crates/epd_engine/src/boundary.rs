const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Detects where games start while a PGN stream is read line by line.
///
/// A new record begins at a tag line (`[`) once movetext has been seen since
/// the previous record start, unless the line sits inside a `{}` comment.
/// The first meaningful line of the stream always begins a record. Escape
/// lines (`%`) and blank lines never change the state. A UTF-8 byte order
/// mark ahead of the first record is ignored.
#[derive(Debug, Default, Clone)]
pub(crate) struct BoundaryTracker {
    started: bool,
    seen_movetext: bool,
    in_comment: bool,
}

impl BoundaryTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds one line, terminator included. Returns true if a record starts on it.
    pub(crate) fn feed(&mut self, line: &[u8]) -> bool {
        let line = match line.strip_prefix(UTF8_BOM) {
            Some(rest) if !self.started => rest,
            _ => line,
        };
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() || (!self.in_comment && line.first() == Some(&b'%')) {
            return false;
        }

        if !self.in_comment && trimmed[0] == b'[' {
            if !self.started || self.seen_movetext {
                self.started = true;
                self.seen_movetext = false;
                return true;
            }
            return false;
        }

        let starts = !self.started;
        self.started = true;
        self.scan_movetext(trimmed);
        starts
    }

    fn scan_movetext(&mut self, line: &[u8]) {
        for &byte in line {
            if self.in_comment {
                if byte == b'}' {
                    self.in_comment = false;
                }
                continue;
            }
            match byte {
                b'{' => self.in_comment = true,
                b';' => return,
                byte if byte.is_ascii_whitespace() => {}
                _ => self.seen_movetext = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BoundaryTracker;

    fn starts(text: &str) -> Vec<usize> {
        let mut tracker = BoundaryTracker::new();
        text.split_inclusive('\n')
            .enumerate()
            .filter(|(_, line)| tracker.feed(line.as_bytes()))
            .map(|(index, _)| index)
            .collect()
    }

    #[test]
    fn tag_lines_after_movetext_start_games() {
        let text = "[Event \"a\"]\n[Site \"b\"]\n\n1. e4 e5 1-0\n\n[Event \"c\"]\n\n1. d4 *\n";
        assert_eq!(starts(text), vec![0, 5]);
    }

    #[test]
    fn brackets_inside_comments_are_not_tags() {
        let text = "[Event \"a\"]\n1. e4 {a comment\n[not a tag]\n} e5 *\n[Event \"b\"]\n1. c4 *\n";
        assert_eq!(starts(text), vec![0, 4]);
    }

    #[test]
    fn leading_blank_and_escape_lines_are_skipped() {
        let text = "\n% exported\n\n[Event \"a\"]\n1. e4 *\n";
        assert_eq!(starts(text), vec![3]);
    }

    #[test]
    fn byte_order_mark_does_not_hide_the_first_tag() {
        let text = "\u{feff}[Event \"a\"]\n[Site \"b\"]\n\n1. e4 *\n\n[Event \"c\"]\n1. d4 *\n";
        assert_eq!(starts(text), vec![0, 5]);

        let text = "\u{feff}\n% exported\n[Event \"a\"]\n1. e4 *\n";
        assert_eq!(starts(text), vec![2]);
    }

    #[test]
    fn blank_input_has_no_records() {
        assert!(starts("\n\n  \n").is_empty());
    }

    #[test]
    fn games_without_tags_start_at_movetext() {
        assert_eq!(starts("1. e4 e5 *\n"), vec![0]);
    }
}
