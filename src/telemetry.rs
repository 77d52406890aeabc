//! Parsing of device telemetry lines.
//!
//! The device shares one channel between rendering progress reports and
//! free-form diagnostic text, so the parser is deliberately tolerant: it
//! recognizes one line shape and classifies everything else as
//! [`TelemetryEvent::Unrecognized`] instead of failing.
//!
//! ## Character report shape
//!
//! ```text
//! Character: a -> Pattern: 100000 Servo A (0): 900µs Servo B (0): 1900µs
//! ```
//!
//! A line is a character-completion report iff it contains `"Character:"`
//! and exactly one `"->"` separator. The character token is the text after
//! the colon and before the separator. The right-hand segment is scanned
//! for a `Pattern:` token (a run of binary digits, normalized to six bits)
//! and for up to two `Servo X (n): <pulse>µs` readings; both servo readings
//! are optional and order-independent, and a report may carry no pulse data
//! at all. Partial lines and fragments are expected during normal operation
//! and must never abort the reader.

use crate::braille::BraillePattern;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

#[allow(clippy::expect_used)]
static PATTERN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Pattern:\s*([01]+)").expect("pattern regex is valid"));

#[allow(clippy::expect_used)]
static SERVO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Servo ([AB]) \((?:\d+)\): (\d+)µs").expect("servo regex is valid"));

/// One decoded telemetry line. Produced per raw line, consumed immediately,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// The device finished rendering one character of the in-flight group.
    CharacterRendered {
        /// The character the device reports as rendered.
        ch: char,
        /// Dot pattern bits, when the report carries a `Pattern:` token.
        pattern: Option<BraillePattern>,
        /// Actuator A pulse width in microseconds, when reported.
        pulse_a: Option<u32>,
        /// Actuator B pulse width in microseconds, when reported.
        pulse_b: Option<u32>,
    },
    /// Anything else sharing the wire: log noise, fragments, boot banners.
    Unrecognized {
        /// The raw line as received.
        raw: String,
    },
}

/// Parses one whitespace-stripped telemetry line.
pub fn parse_line(line: &str) -> TelemetryEvent {
    if !line.contains("Character:") {
        return unrecognized(line);
    }
    let parts: Vec<&str> = line.split("->").collect();
    if parts.len() != 2 {
        return unrecognized(line);
    }

    let Some(token) = parts[0].split(':').nth(1) else {
        return unrecognized(line);
    };
    let token = token.trim();
    let mut chars = token.chars();
    let (Some(ch), None) = (chars.next(), chars.next()) else {
        // The device contract is a single character between "Character:"
        // and "->"; anything else is treated as noise.
        warn!("Discarding character report with token '{}'", token);
        return unrecognized(line);
    };

    let report = parts[1];
    let pattern = PATTERN_RE
        .captures(report)
        .map(|caps| normalize_bits(&caps[1]));

    let mut pulse_a = None;
    let mut pulse_b = None;
    for caps in SERVO_RE.captures_iter(report) {
        match caps[2].parse::<u32>() {
            Ok(pulse) => match &caps[1] {
                "A" => pulse_a = Some(pulse),
                _ => pulse_b = Some(pulse),
            },
            Err(e) => warn!("Discarding unparsable pulse reading '{}': {}", &caps[2], e),
        }
    }

    TelemetryEvent::CharacterRendered {
        ch,
        pattern,
        pulse_a,
        pulse_b,
    }
}

fn unrecognized(line: &str) -> TelemetryEvent {
    debug!("Unrecognized telemetry line: {}", line);
    TelemetryEvent::Unrecognized {
        raw: line.to_string(),
    }
}

/// Normalizes a run of binary digits to exactly six bits: short runs are
/// left-padded with zeros, long runs keep the low six bits.
fn normalize_bits(run: &str) -> BraillePattern {
    let tail = if run.len() > 6 {
        &run[run.len() - 6..]
    } else {
        run
    };
    let bits = tail
        .bytes()
        .fold(0u8, |acc, b| (acc << 1) | u8::from(b == b'1'));
    BraillePattern::from_bits(bits)
}
