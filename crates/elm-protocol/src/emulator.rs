//! Command Dispatcher and Session State

use crate::bus::CanBus;
use crate::command::{AtCommand, Command, StCommand};
use crate::filter::{FilterTable, DEFAULT_FILTER_SLOTS};
use crate::hex;
use crate::line::{CommandLine, LineAssembler};
use crate::pid::PidRequest;
use crate::protocol::ObdProtocol;
use metrics::counter;
use ring_buffer::{CanFrame, FrameConsumer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Banner returned by `ATZ`, `ATWS` and `ATI`
const ELM_VERSION: &str = "ELM327 v1.3a";
/// Returned by `AT@1`
const DEVICE_DESCRIPTION: &str = "ELM327 Emulator";
/// Returned by `STDI`
const STN_VERSION: &str = "STM1110 v1.5";
/// Returned by `ATRV`; there is no voltage measurement behind it
const RAIL_VOLTAGE: &str = "14.2V";
const OK: &str = "OK";
const PROMPT: char = '>';

/// Persisted flags a session starts from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    /// Include identifier and length byte in OBD replies
    pub headers: bool,
    /// Terminate lines with `\r\n` instead of `\r`
    pub linefeed: bool,
}

/// Emulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Flags applied at the start of every session
    pub session: SessionDefaults,
    /// Number of pass filter slots
    pub filter_slots: usize,
    /// Apply the pass filter table when relaying monitored frames. Capture
    /// itself always stores every frame.
    pub monitor_filtering: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            session: SessionDefaults::default(),
            filter_slots: DEFAULT_FILTER_SLOTS,
            monitor_filtering: false,
        }
    }
}

/// Per-connection adapter state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    pub headers: bool,
    pub linefeed: bool,
    pub monitor: bool,
}

impl Session {
    /// Fresh session state; monitoring always starts off
    pub fn new(defaults: SessionDefaults) -> Self {
        Self {
            headers: defaults.headers,
            linefeed: defaults.linefeed,
            monitor: false,
        }
    }

    /// Line ending selected with `ATL`
    pub fn line_ending(&self) -> &'static str {
        if self.linefeed {
            "\r\n"
        } else {
            "\r"
        }
    }
}

/// The adapter: assembles command lines, executes them and renders bus
/// traffic for the host.
///
/// The emulator owns the consumer half of the capture buffer; the producer
/// half belongs to whatever receives frames from the bus.
pub struct Emulator {
    config: EmulatorConfig,
    session: Session,
    assembler: LineAssembler,
    filters: FilterTable,
    frames: FrameConsumer,
    protocol: ObdProtocol,
}

impl Emulator {
    /// Create an emulator draining `frames`
    pub fn new(config: EmulatorConfig, frames: FrameConsumer) -> Self {
        info!(
            "Creating ELM327 emulator: {} filter slots, {} frame slots",
            config.filter_slots,
            frames.capacity()
        );
        Self {
            session: Session::new(config.session),
            assembler: LineAssembler::new(),
            filters: FilterTable::new(config.filter_slots),
            frames,
            protocol: ObdProtocol::default(),
            config,
        }
    }

    /// Start a new host session: flags back to their defaults, partial input
    /// and pass filters discarded. Captured frames are kept.
    pub fn begin_session(&mut self) {
        self.session = Session::new(self.config.session);
        self.assembler.reset();
        self.filters.clear();
    }

    /// Current session flags
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Pass filters set by the host
    pub fn filters(&self) -> &FilterTable {
        &self.filters
    }

    /// Capture buffer statistics
    pub fn frames(&self) -> &FrameConsumer {
        &self.frames
    }

    /// Feed one byte from the host; returns the response once a command
    /// line completes
    pub fn feed<B: CanBus>(&mut self, byte: u8, bus: &mut B) -> Option<String> {
        let line = self.assembler.feed(byte)?;
        Some(self.dispatch(&line, bus))
    }

    /// Feed a chunk of host input, concatenating every response it produces
    pub fn feed_bytes<B: CanBus>(&mut self, bytes: &[u8], bus: &mut B) -> String {
        let mut out = String::new();
        for &byte in bytes {
            if let Some(response) = self.feed(byte, bus) {
                out.push_str(&response);
            }
        }
        out
    }

    /// Execute a complete command line and produce the adapter's reply.
    ///
    /// Every reply ends with the line ending and the `>` prompt, except
    /// `STM` which returns only its frame list.
    pub fn dispatch<B: CanBus>(&mut self, line: &CommandLine, bus: &mut B) -> String {
        // Selected before the command runs, so ATL answers in the old style
        let line_ending = self.session.line_ending();
        let command = Command::parse(line);
        counter!("elm_commands_total", "kind" => command.kind()).increment(1);

        let mut out = String::new();
        match command {
            Command::At(at) => self.execute_at(at, line_ending, &mut out),
            Command::St(StCommand::Monitor) => {
                self.session.monitor = true;
                if self.drain_monitor(&mut out) == 0 {
                    out.push('\r');
                }
                debug!("In: {} Out: {}", line, out.escape_debug());
                return out;
            }
            Command::St(st) => self.execute_st(st, &mut out),
            Command::Pid(request) => self.send_request(line, request, bus),
        }

        out.push_str(line_ending);
        out.push(PROMPT);
        debug!("In: {} Out: {}", line, out.escape_debug());
        out
    }

    fn execute_at(&mut self, command: AtCommand, line_ending: &str, out: &mut String) {
        match command {
            AtCommand::Reset => {
                out.push_str(line_ending);
                out.push_str(ELM_VERSION);
            }
            AtCommand::Headers(on) => {
                self.session.headers = on;
                out.push_str(OK);
            }
            AtCommand::Linefeeds(on) => {
                self.session.linefeed = on;
                out.push_str(OK);
            }
            AtCommand::DeviceDescription => out.push_str(DEVICE_DESCRIPTION),
            AtCommand::Identify => out.push_str(ELM_VERSION),
            AtCommand::DescribeProtocol => out.push_str(self.protocol.description()),
            AtCommand::DescribeProtocolNumber => out.push_str(self.protocol.elm_number()),
            AtCommand::ReadVoltage => out.push_str(RAIL_VOLTAGE),
            AtCommand::SetProtocol(requested) => {
                match requested {
                    Some(p) if p != self.protocol && p != ObdProtocol::Auto => info!(
                        "Host selected {:?}, staying on {}",
                        p,
                        self.protocol.description()
                    ),
                    Some(p) => debug!("Host selected {:?}", p),
                    None => debug!("Unrecognised protocol selection"),
                }
                out.push_str(OK);
            }
            AtCommand::SetHeader
            | AtCommand::Echo
            | AtCommand::AdaptiveTiming
            | AtCommand::CanAutoFormat
            | AtCommand::Defaults
            | AtCommand::Memory
            | AtCommand::Unknown => out.push_str(OK),
        }
    }

    fn execute_st(&mut self, command: StCommand, out: &mut String) {
        match command {
            StCommand::DeviceId => out.push_str(STN_VERSION),
            StCommand::ClearPassFilters => {
                self.filters.clear();
                out.push_str(OK);
            }
            StCommand::AddPassFilter(Some(entry)) => {
                self.filters.insert(entry.id, entry.mask);
                out.push_str(OK);
            }
            StCommand::AddPassFilter(None) => {
                debug!("Malformed STFAP arguments, filter table unchanged");
                out.push_str(OK);
            }
            // Monitor never reaches here, it has its own reply framing
            StCommand::Monitor | StCommand::Unknown => out.push_str(OK),
        }
    }

    fn send_request<B: CanBus>(&mut self, line: &CommandLine, request: Option<PidRequest>, bus: &mut B) {
        let Some(request) = request else {
            if !line.is_empty() {
                debug!("Ignoring line that is not a PID request: {}", line);
            }
            return;
        };

        debug!("Mode: {:02X}, PID: {:02X}", request.mode, request.pid);

        match bus.send_frame(&request.to_frame()) {
            Ok(()) => counter!("elm_frames_sent_total").increment(1),
            Err(e) => warn!(
                "Failed to send request {:02X}{:02X}: {}",
                request.mode, request.pid, e
            ),
        }
    }

    /// Drain captured frames for a monitoring host. Returns `None` when
    /// monitoring is off or there's nothing to send.
    pub fn relay_monitor(&mut self) -> Option<String> {
        if !self.session.monitor || self.frames.is_empty() {
            return None;
        }
        let mut out = String::new();
        match self.drain_monitor(&mut out) {
            0 => None,
            _ => Some(out),
        }
    }

    /// Render every queued frame as a monitor line; shared by `STM` and the
    /// background relay. Returns the number of lines written.
    fn drain_monitor(&mut self, out: &mut String) -> usize {
        let filtering = self.config.monitor_filtering;
        let filters = &self.filters;
        let mut written = 0;
        for frame in self.frames.drain() {
            if filtering && !filters.admits(frame.id) {
                continue;
            }
            hex::write_monitor_frame(out, &frame);
            written += 1;
        }
        written
    }

    /// Render a diagnostic response frame for the host. No line ending or
    /// prompt is added.
    pub fn obd_reply(&self, frame: &CanFrame) -> String {
        hex::encode_obd_reply(frame, self.session.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ElmError;
    use ring_buffer::{channel, FrameProducer};

    fn emulator() -> (Emulator, FrameProducer) {
        let (producer, consumer) = channel(8);
        (Emulator::new(EmulatorConfig::default(), consumer), producer)
    }

    fn run(emu: &mut Emulator, text: &str) -> String {
        let mut bus: Vec<CanFrame> = Vec::new();
        emu.dispatch(&CommandLine::new(text), &mut bus)
    }

    struct BrokenBus;

    impl CanBus for BrokenBus {
        fn send_frame(&mut self, _frame: &CanFrame) -> Result<(), ElmError> {
            Err(ElmError::CanBusError("bus off".to_string()))
        }
    }

    #[test]
    fn test_linefeed_toggle_answers_in_previous_style() {
        let (mut emu, _tx) = emulator();
        assert_eq!(run(&mut emu, "atl1"), "OK\r>");
        assert!(emu.session().linefeed);
        assert_eq!(run(&mut emu, "atl0"), "OK\r\n>");
        assert_eq!(run(&mut emu, "ati"), "ELM327 v1.3a\r>");
    }

    #[test]
    fn test_reset_keeps_state() {
        let (mut emu, _tx) = emulator();
        run(&mut emu, "ath1");
        assert_eq!(run(&mut emu, "atz"), "\rELM327 v1.3a\r>");
        assert!(emu.session().headers);
    }

    #[test]
    fn test_protocol_queries() {
        let (mut emu, _tx) = emulator();
        assert_eq!(run(&mut emu, "atsp0"), "OK\r>");
        assert_eq!(run(&mut emu, "atsp8"), "OK\r>");
        assert_eq!(run(&mut emu, "atdp"), "can11/500\r>");
        assert_eq!(run(&mut emu, "atdpn"), "6\r>");
    }

    #[test]
    fn test_monitor_relay_after_stm() {
        let (mut emu, mut tx) = emulator();
        assert!(emu.relay_monitor().is_none());

        assert_eq!(run(&mut emu, "stm"), "\r");
        assert!(emu.session().monitor);
        assert!(emu.relay_monitor().is_none());

        tx.push(CanFrame::new(0x123, &[0xDE, 0xAD]).unwrap()).unwrap();
        tx.push(CanFrame::new(0x456, &[]).unwrap()).unwrap();
        assert_eq!(emu.relay_monitor().unwrap(), "123DEAD\r456\r");
        assert!(emu.frames().is_empty());
    }

    #[test]
    fn test_frames_wait_in_buffer_until_monitoring() {
        let (mut emu, mut tx) = emulator();
        tx.push(CanFrame::new(0x100, &[0x01]).unwrap()).unwrap();
        assert!(emu.relay_monitor().is_none());
        assert_eq!(emu.frames().len(), 1);
        assert_eq!(run(&mut emu, "stm"), "10001\r");
    }

    #[test]
    fn test_monitor_filtering() {
        let (producer, consumer) = channel(8);
        let mut tx = producer;
        let config = EmulatorConfig {
            monitor_filtering: true,
            ..Default::default()
        };
        let mut emu = Emulator::new(config, consumer);

        run(&mut emu, "stfap7e8,7f8");
        tx.push(CanFrame::new(0x100, &[0x01]).unwrap()).unwrap();
        tx.push(CanFrame::new(0x7E9, &[0x02]).unwrap()).unwrap();
        assert_eq!(run(&mut emu, "stm"), "7E902\r");

        // Everything filtered out still produces a bare line terminator
        tx.push(CanFrame::new(0x100, &[0x01]).unwrap()).unwrap();
        assert_eq!(run(&mut emu, "stm"), "\r");
        assert!(emu.frames().is_empty());
    }

    #[test]
    fn test_obd_reply_follows_header_flag() {
        let (mut emu, _tx) = emulator();
        let frame = CanFrame::with_data(0x7E8, [0x03, 0x41, 0x0D, 0x28, 0, 0, 0, 0]);
        assert_eq!(emu.obd_reply(&frame), "410D2800000000");
        run(&mut emu, "ath1");
        assert_eq!(emu.obd_reply(&frame), "7E803410D2800000000");
    }

    #[test]
    fn test_bus_failure_still_prompts() {
        let (mut emu, _tx) = emulator();
        let response = emu.dispatch(&CommandLine::new("010c"), &mut BrokenBus);
        assert_eq!(response, "\r>");
    }

    #[test]
    fn test_begin_session_resets_flags_and_filters() {
        let (producer, consumer) = channel(8);
        let config = EmulatorConfig {
            session: SessionDefaults {
                headers: false,
                linefeed: true,
            },
            ..Default::default()
        };
        let mut emu = Emulator::new(config, consumer);
        let mut tx = producer;

        run(&mut emu, "ath1");
        run(&mut emu, "atl0");
        run(&mut emu, "stfap123,456");
        run(&mut emu, "stm");
        tx.push(CanFrame::new(0x100, &[]).unwrap()).unwrap();

        emu.begin_session();
        assert_eq!(
            *emu.session(),
            Session {
                headers: false,
                linefeed: true,
                monitor: false
            }
        );
        assert!(emu.filters().is_empty());
        assert_eq!(emu.frames().len(), 1);
    }

    #[test]
    fn test_empty_line_prompts() {
        let (mut emu, _tx) = emulator();
        assert_eq!(run(&mut emu, ""), "\r>");
    }
}
