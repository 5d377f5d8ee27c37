//! Response Parser: pulls `(score, reason)` out of the model's free-text reply.
//!
//! Markers are matched by substring containment so minor formatting drift
//! (bullets or prose before the label) is tolerated. When a marker occurs on
//! several lines the last one wins. A missing or malformed score is an error;
//! a missing reason is just an empty string.

use thiserror::Error;

pub const SCORE_MARKER: &str = "Score:";
pub const REASON_MARKER: &str = "Reason:";

const MAX_SCORE: i64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("reply has no 'Score:' line")]
    MissingScore,

    #[error("score '{value}' is not an integer")]
    InvalidScore { value: String },

    #[error("score {value} is outside 0-100")]
    ScoreOutOfRange { value: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub score: u32,
    pub reason: String,
}

enum MarkedLine<'a> {
    Score(&'a str),
    Reason(&'a str),
}

/// A line feeds whichever marker appears first on it.
fn classify(line: &str) -> Option<MarkedLine<'_>> {
    let score_at = line.find(SCORE_MARKER);
    let reason_at = line.find(REASON_MARKER);

    match (score_at, reason_at) {
        (Some(s), Some(r)) if r < s => Some(MarkedLine::Reason(&line[r + REASON_MARKER.len()..])),
        (Some(s), _) => Some(MarkedLine::Score(&line[s + SCORE_MARKER.len()..])),
        (None, Some(r)) => Some(MarkedLine::Reason(&line[r + REASON_MARKER.len()..])),
        (None, None) => None,
    }
}

pub fn parse_reply(raw: &str) -> Result<ParsedReply, ParseError> {
    let mut score_text: Option<&str> = None;
    let mut reason = String::new();

    for line in raw.lines() {
        match classify(line) {
            Some(MarkedLine::Score(rest)) => score_text = Some(rest.trim()),
            Some(MarkedLine::Reason(rest)) => reason = rest.trim().to_string(),
            None => {}
        }
    }

    let score_text = score_text.ok_or(ParseError::MissingScore)?;
    let value: i64 = score_text.parse().map_err(|_| ParseError::InvalidScore {
        value: score_text.to_string(),
    })?;

    if !(0..=MAX_SCORE).contains(&value) {
        return Err(ParseError::ScoreOutOfRange { value });
    }

    Ok(ParsedReply {
        score: value as u32,
        reason,
    })
}
