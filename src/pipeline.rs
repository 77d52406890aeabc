//! Group-sequenced transmission pipeline.
//!
//! Input text is chunked into groups of at most the number of display cells
//! (1-7) and sent one group at a time as a single `TEXT:` command. The
//! device renders the group character by character, reporting each
//! completion over telemetry; the controller advances to the next group
//! only after the report for the group's last cell arrives, waiting the
//! configured `char_delay` in between.
//!
//! The controller is single-threaded: the transport's reader
//! thread produces raw lines on an `mpsc` channel, and whichever thread
//! owns the controller drains that channel ([`PipelineController::pump`])
//! and mutates session state. Nothing here is touched from two threads.
//!
//! Decoded per-cell state (pattern bits, actuator angles recovered from
//! pulse widths) is forwarded through the [`DisplaySink`] seam; rendering
//! is a collaborator's concern, not the pipeline's.

use crate::braille::BraillePattern;
use crate::config::Settings;
use crate::error::{AppResult, BrailleError};
use crate::servo;
use crate::telemetry::{self, TelemetryEvent};
use crate::transport::BrailleLink;
use log::{debug, info, warn};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Fewest simultaneously displayed cells a device variant carries.
pub const MIN_GROUP_SIZE: usize = 1;
/// Most simultaneously displayed cells a device variant carries.
pub const MAX_GROUP_SIZE: usize = 7;

/// Settings snapshot consumed by one send operation.
///
/// Read once at submit time; a live configuration edit never races an
/// in-flight session.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Cells per group, clamped to [`MIN_GROUP_SIZE`]..=[`MAX_GROUP_SIZE`].
    pub group_size: usize,
    /// Wait between a group's completion and the next group's send, ms.
    pub char_delay_ms: u64,
    /// Actuator settle time, ms. Owned by the device; carried for
    /// collaborators that display it.
    pub servo_delay_ms: u64,
}

impl SendOptions {
    /// Builds options from the persisted settings and a group size.
    pub fn from_settings(settings: &Settings, group_size: usize) -> Self {
        SendOptions {
            group_size,
            char_delay_ms: settings.char_delay,
            servo_delay_ms: settings.servo_delay,
        }
    }
}

/// Where the pipeline stands, per send operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No session in flight.
    Idle,
    /// Group `index` has been sent and is awaiting completion reports.
    GroupInFlight(usize),
}

/// Decoded state for one display cell, forwarded to the visualization.
#[derive(Debug, Clone, PartialEq)]
pub struct CellUpdate {
    /// Cell position within the current group.
    pub slot: usize,
    /// The character the device rendered.
    pub ch: char,
    /// Dot pattern bits, when the report carried them.
    pub pattern: Option<BraillePattern>,
    /// Actuator angles in degrees, decoded from the pulse widths when the
    /// report carried both readings.
    pub servo_angles: Option<(f64, f64)>,
}

/// Consumer of decoded display state. Implementations draw; the core
/// produces updates and nothing else.
pub trait DisplaySink {
    /// One cell of the in-flight group was rendered.
    fn cell_update(&mut self, update: CellUpdate);

    /// A new group was sent to the device.
    fn group_started(&mut self, _index: usize, _group: &str) {}

    /// The session finished: every group was rendered.
    fn session_complete(&mut self) {}
}

/// Splits `text` into consecutive chunks of at most `group_size` chars.
///
/// All groups except possibly the last have exactly `group_size`
/// characters, and concatenating them reproduces `text`.
pub fn chunk_text(text: &str, group_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(group_size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

struct PipelineSession {
    groups: Vec<String>,
    current: usize,
    acked: Vec<bool>,
    opts: SendOptions,
}

/// Orchestrates one send operation across its groups.
///
/// Generic over the link so tests drive it with a recording mock instead of
/// a physical port.
pub struct PipelineController<L: BrailleLink, D: DisplaySink> {
    link: L,
    display: D,
    session: Option<PipelineSession>,
}

impl<L: BrailleLink, D: DisplaySink> PipelineController<L, D> {
    /// Creates an idle controller over `link` and `display`.
    pub fn new(link: L, display: D) -> Self {
        PipelineController {
            link,
            display,
            session: None,
        }
    }

    /// Current position in the send operation.
    pub fn state(&self) -> PipelineState {
        match &self.session {
            Some(session) => PipelineState::GroupInFlight(session.current),
            None => PipelineState::Idle,
        }
    }

    /// The underlying link (for connection management and config pushes).
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// The display sink.
    pub fn display(&self) -> &D {
        &self.display
    }

    /// Starts a new send operation, discarding any session in flight.
    ///
    /// Chunks `text` into groups and sends group 0. Fails with
    /// [`BrailleError::EmptyInput`] on blank text; a failed send leaves the
    /// controller idle.
    pub fn submit(&mut self, text: &str, opts: SendOptions) -> AppResult<()> {
        self.cancel();

        let text = text.trim();
        if text.is_empty() {
            return Err(BrailleError::EmptyInput);
        }

        let group_size = opts.group_size.clamp(MIN_GROUP_SIZE, MAX_GROUP_SIZE);
        let groups = chunk_text(text, group_size);
        info!(
            "Submitting {} chars as {} group(s) of up to {}",
            text.chars().count(),
            groups.len(),
            group_size
        );

        self.link.send_text(&groups[0])?;
        self.display.group_started(0, &groups[0]);

        let acked = vec![false; groups[0].chars().count()];
        self.session = Some(PipelineSession {
            groups,
            current: 0,
            acked,
            opts,
        });
        Ok(())
    }

    /// Discards the session in flight, if any.
    ///
    /// No cleanup command goes to the device; its display state is whatever
    /// the last rendered group left behind until the next submit.
    pub fn cancel(&mut self) {
        if self.session.take().is_some() {
            info!("Pipeline session discarded");
        }
    }

    /// Parses one raw telemetry line and feeds the event in.
    pub fn handle_line(&mut self, line: &str) -> AppResult<()> {
        self.handle_event(telemetry::parse_line(line))
    }

    /// Advances the session on a telemetry event.
    ///
    /// Events are acted on strictly by current state: reports whose
    /// character is not an unacknowledged member of the in-flight group are
    /// logged and dropped (stale telemetry after a timing race), and
    /// unrecognized lines are ignored outright.
    pub fn handle_event(&mut self, event: TelemetryEvent) -> AppResult<()> {
        let TelemetryEvent::CharacterRendered {
            ch,
            pattern,
            pulse_a,
            pulse_b,
        } = event
        else {
            return Ok(());
        };

        let Some(session) = self.session.as_mut() else {
            debug!("Dropping report for '{}': no session in flight", ch);
            return Ok(());
        };

        let group = &session.groups[session.current];
        // Leftmost occurrence not yet acknowledged; repeated characters
        // within a group resolve in reading order.
        let slot = group
            .chars()
            .enumerate()
            .find(|&(i, c)| c == ch && !session.acked[i])
            .map(|(i, _)| i);
        let Some(slot) = slot else {
            warn!("Character '{}' not found in current group '{}'", ch, group);
            return Ok(());
        };
        session.acked[slot] = true;

        let servo_angles = match (pulse_a, pulse_b) {
            (Some(a), Some(b)) => Some((servo::angle_from_pulse(a), servo::angle_from_pulse(b))),
            _ => None,
        };
        self.display.cell_update(CellUpdate {
            slot,
            ch,
            pattern,
            servo_angles,
        });

        let group_len = group.chars().count();
        if slot + 1 == group_len {
            let next = session.current + 1;
            if next < session.groups.len() {
                let delay = Duration::from_millis(session.opts.char_delay_ms);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                let group = session.groups[next].clone();
                // Send before advancing: a failed send must leave the
                // session where it stands.
                self.link.send_text(&group)?;
                session.current = next;
                session.acked = vec![false; group.chars().count()];
                self.display.group_started(next, &group);
            } else {
                info!("Transmission complete");
                self.session = None;
                self.display.session_complete();
            }
        }
        Ok(())
    }

    /// Drains the line channel until the session completes.
    ///
    /// Gives up (leaving the session as-is) when no line arrives within
    /// `idle_timeout` or the transport side of the channel closes.
    pub fn pump(&mut self, lines: &Receiver<String>, idle_timeout: Duration) -> AppResult<()> {
        while self.session.is_some() {
            match lines.recv_timeout(idle_timeout) {
                Ok(line) => self.handle_line(&line)?,
                Err(RecvTimeoutError::Timeout) => {
                    warn!("No telemetry within {:?}; giving up on session", idle_timeout);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Telemetry channel closed with session in flight");
                    break;
                }
            }
        }
        Ok(())
    }
}
