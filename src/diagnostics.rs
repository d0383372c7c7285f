// src/diagnostics.rs
//
// Simulator diagnostic stream: one record per line, `;`-separated, record kind
// in the first field.
//   E;<unused>;<frame>;<error code>[;...]   error occurrence
//   F[;...]                                  replay finished
// Anything else is ignored.

use crate::model::{ErrorCode, TestCase, TestResult};

const SEPARATOR: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Error { frame: i64, code: ErrorCode },
    Finished,
}

/// Parses one line. `None` for unknown kinds and malformed records.
pub fn parse_line(line: &str) -> Option<Record> {
    let mut fields = line.trim_end_matches(['\r', '\n']).split(SEPARATOR);
    match fields.next()? {
        "E" => {
            let _ = fields.next()?;
            let frame = fields.next()?.trim().parse::<i64>().ok()?;
            let code = fields.next()?.trim().parse::<ErrorCode>().ok()?;
            if frame < 0 {
                return None;
            }
            Some(Record::Error { frame, code })
        }
        "F" => Some(Record::Finished),
        _ => None,
    }
}

/// Whether the line claims to be an error record, parseable or not.
fn is_error_kind(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']).split(SEPARATOR).next() == Some("E")
}

/// Folds a whole diagnostic stream into a result for `case`.
pub fn parse_stream(case: &TestCase, stream: &str) -> TestResult {
    let mut result = TestResult::new(case);
    let mut skipped = 0usize;
    for line in stream.lines() {
        match parse_line(line) {
            Some(Record::Error { frame, code }) => result.record_error(code, frame),
            Some(Record::Finished) => result.finished = true,
            None if is_error_kind(line) => skipped += 1,
            None => {}
        }
    }
    if skipped > 0 {
        log::warn!("{}: skipped {skipped} malformed error records", case.name);
    }
    result
}
