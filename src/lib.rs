//! # Braille Display Host Library
//!
//! Host-side counterpart of a multi-cell refreshable braille display: it
//! encodes text into dot patterns, streams the text to the embedded device
//! in timed groups over a serial line, and decodes the device's telemetry
//! (rendered character, pattern bits, actuator pulse widths) for a live
//! visualization.
//!
//! ## Crate Structure
//!
//! - **`braille`**: the pattern codec: character-to-dot-pattern tables and
//!   the empirical pattern-to-angle calibration table shared with the
//!   device firmware.
//! - **`servo`**: linear pulse-width/angle conversions and the displacement
//!   metric used by the actuator-bar visualization.
//! - **`transport`**: the serial connection: lifecycle, reset handshake,
//!   background line reader, and the outgoing command protocol. The
//!   physical port sits behind the `serial` cargo feature; the
//!   `BrailleLink` trait is the seam everything else talks through.
//! - **`telemetry`**: tolerant parsing of the device's free-form telemetry
//!   lines into structured events.
//! - **`pipeline`**: the group pipeline controller, which chunks input text,
//!   sends one group at a time, and advances on the device's per-character
//!   completion reports.
//! - **`config`**: the persisted timing/device-mode settings consumed at
//!   submit time.
//! - **`error`**: the `BrailleError` taxonomy shared across the crate.

pub mod braille;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod servo;
pub mod telemetry;
pub mod transport;
