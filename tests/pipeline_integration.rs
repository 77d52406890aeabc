//! End-to-end pipeline tests: raw telemetry lines in, wire commands and
//! display updates out, through the same seams the binary wires together.

use braille_host::error::AppResult;
use braille_host::pipeline::{
    CellUpdate, DisplaySink, PipelineController, PipelineState, SendOptions,
};
use braille_host::transport::{BrailleLink, LineBuffer};

#[derive(Default)]
struct RecordingLink {
    sent: Vec<String>,
}

impl BrailleLink for RecordingLink {
    fn send_line(&mut self, line: &str) -> AppResult<()> {
        self.sent.push(line.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct CollectingDisplay {
    updates: Vec<CellUpdate>,
    completed: usize,
}

impl DisplaySink for CollectingDisplay {
    fn cell_update(&mut self, update: CellUpdate) {
        self.updates.push(update);
    }
    fn session_complete(&mut self) {
        self.completed += 1;
    }
}

fn opts(group_size: usize) -> SendOptions {
    SendOptions {
        group_size,
        char_delay_ms: 0,
        servo_delay_ms: 0,
    }
}

#[test]
fn full_session_from_raw_telemetry() {
    let mut ctl = PipelineController::new(RecordingLink::default(), CollectingDisplay::default());
    ctl.submit("abcdef", opts(3)).unwrap();
    assert_eq!(ctl.link_mut().sent, vec!["TEXT:abc\n"]);

    // The device streams reports interleaved with diagnostic noise,
    // arriving as arbitrarily chunked bytes on the wire.
    let mut wire = LineBuffer::default();
    let stream: &[&[u8]] = &[
        b"Servo sweep complete\nCharacter: a -> Pattern: 100000 ",
        b"Servo A (0): 900\xc2\xb5s Servo B (0): 1900\xc2\xb5s\n",
        b"Character: b -> Pattern: 101000\nChara",
        b"cter: c -> Pattern: 110000 Servo A (0): 844\xc2\xb5s\n",
    ];
    for chunk in stream {
        for line in wire.push(chunk) {
            ctl.handle_line(&line).unwrap();
        }
    }

    // Group 1 drained: the second group went out exactly once.
    assert_eq!(ctl.link_mut().sent, vec!["TEXT:abc\n", "TEXT:def\n"]);
    assert_eq!(ctl.state(), PipelineState::GroupInFlight(1));
    assert_eq!(ctl.display().updates.len(), 3);

    // Only the full A+B report decoded to servo angles.
    assert_eq!(ctl.display().updates[0].servo_angles, Some((36.0, 126.0)));
    assert_eq!(ctl.display().updates[1].servo_angles, None);
    assert_eq!(ctl.display().updates[2].servo_angles, None);

    for line in [
        "Character: d -> Pattern: 110100",
        "Character: e -> Pattern: 100100",
        "Character: f -> Pattern: 111000",
    ] {
        ctl.handle_line(line).unwrap();
    }
    assert_eq!(ctl.state(), PipelineState::Idle);
    assert_eq!(ctl.display().completed, 1);
    assert_eq!(ctl.link_mut().sent.len(), 2);
}

#[test]
fn stale_report_after_resubmit_is_ignored() {
    let mut ctl = PipelineController::new(RecordingLink::default(), CollectingDisplay::default());
    ctl.submit("abc", opts(3)).unwrap();
    ctl.handle_line("Character: a -> Pattern: 100000").unwrap();

    // The session is abandoned mid-group and a fresh one started; late
    // telemetry for the old group must not advance the new session.
    ctl.submit("xyz", opts(3)).unwrap();
    assert_eq!(ctl.state(), PipelineState::GroupInFlight(0));
    ctl.handle_line("Character: b -> Pattern: 101000").unwrap();
    assert_eq!(ctl.state(), PipelineState::GroupInFlight(0));
    assert_eq!(ctl.display().updates.len(), 1);

    ctl.handle_line("Character: x -> Pattern: 110011").unwrap();
    ctl.handle_line("Character: y -> Pattern: 110111").unwrap();
    ctl.handle_line("Character: z -> Pattern: 100111").unwrap();
    assert_eq!(ctl.state(), PipelineState::Idle);
}

#[test]
fn cancel_then_resubmit_starts_at_group_zero() {
    let mut ctl = PipelineController::new(RecordingLink::default(), CollectingDisplay::default());
    ctl.submit("abcdef", opts(3)).unwrap();
    for line in [
        "Character: a -> Pattern: 100000",
        "Character: b -> Pattern: 101000",
        "Character: c -> Pattern: 110000",
    ] {
        ctl.handle_line(line).unwrap();
    }
    assert_eq!(ctl.state(), PipelineState::GroupInFlight(1));

    // Disconnecting discards the session outright; no cleanup command.
    ctl.cancel();
    assert_eq!(ctl.state(), PipelineState::Idle);
    let sent_before = ctl.link_mut().sent.len();

    ctl.submit("abcdef", opts(3)).unwrap();
    assert_eq!(ctl.state(), PipelineState::GroupInFlight(0));
    assert_eq!(ctl.link_mut().sent.len(), sent_before + 1);
    assert_eq!(ctl.link_mut().sent.last().map(String::as_str), Some("TEXT:abc\n"));
}
