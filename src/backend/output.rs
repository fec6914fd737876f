//! Extraction of a RUN step's output from a plain-progress build transcript
//!
//! With `--progress plain` BuildKit prints a header per step, e.g.
//!
//! ```text
//! #6 [version 2/2] RUN <<EOF
//! #6 sha256:2c5e0b9b6cbd0b3b2f1f1b0b8a1c0d0e
//! #6 0.412 v1.4.2
//! #6 DONE 0.5s
//! ```
//!
//! The first completed RUN step is located, the line after its header is
//! skipped and every payload line up to `DONE` is collected.

use crate::error::ParseError;
use regex::Regex;
use std::sync::OnceLock;

const DONE_MARK: &str = "DONE";

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^#\d+ \[(?:[^\]]*\s)?(?P<progress>\S+)\] (?P<verb>[A-Z]+)\b")
            .expect("valid header regex")
    })
}

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^#\d+ (?P<mark>\S+)(?: (?P<payload>.*))?$").expect("valid line regex")
    })
}

/// Return the output of the first completed RUN step in `transcript`
pub fn extract_run_output(transcript: &str) -> Result<String, ParseError> {
    let mut lines = transcript.lines();

    while let Some(line) = lines.next() {
        let Some(header) = header_regex().captures(line) else {
            continue;
        };

        if &header["verb"] != "RUN" {
            continue;
        }

        if !completed(&header["progress"])? {
            continue;
        }

        // Intermediate container hash
        lines.next().ok_or(ParseError::MissingIntermediateLine)?;

        return collect_until_done(&mut lines);
    }

    Err(ParseError::NoRunStep)
}

fn collect_until_done<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<String, ParseError> {
    let mut collected = Vec::new();

    for line in lines {
        let caps = line_regex()
            .captures(line)
            .ok_or_else(|| ParseError::MalformedLine(line.to_string()))?;

        if &caps["mark"] == DONE_MARK {
            return Ok(collected.join("\n"));
        }

        collected.push(caps.name("payload").map_or("", |m| m.as_str()));
    }

    Err(ParseError::Unterminated(collected.join("\n")))
}

/// Whether a `done/total` progress fraction is complete
fn completed(progress: &str) -> Result<bool, ParseError> {
    let malformed = || ParseError::MalformedProgress(progress.to_string());

    let (done, total) = progress.split_once('/').ok_or_else(malformed)?;
    let done: u32 = done.parse().map_err(|_| malformed())?;
    let total: u32 = total.parse().map_err(|_| malformed())?;

    Ok(done == total)
}
