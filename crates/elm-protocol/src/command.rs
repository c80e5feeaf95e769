//! Command Classification
//!
//! Maps a normalized command line onto a tagged command. Precedence follows
//! the adapter firmware: `at` commands first, then `st` commands, and
//! anything else is treated as a PID request. Unrecognised `at`/`st`
//! commands become `Unknown` and are answered with `OK`.

use crate::error::ElmError;
use crate::filter::FilterEntry;
use crate::hex::parse_hex_u32;
use crate::pid::PidRequest;
use crate::protocol::ObdProtocol;

/// A classified command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// ELM327 adapter configuration (`at...`)
    At(AtCommand),
    /// STN extended monitor and filter commands (`st...`)
    St(StCommand),
    /// OBD-II request; `None` when the line isn't a well formed request
    Pid(Option<PidRequest>),
}

impl Command {
    /// Classify a normalized line
    pub fn parse(line: &[u8]) -> Self {
        if line.starts_with(b"at") {
            Command::At(AtCommand::parse(line))
        } else if line.starts_with(b"st") {
            Command::St(StCommand::parse(line))
        } else {
            Command::Pid(PidRequest::parse(line))
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Command::At(_) => "at",
            Command::St(_) => "st",
            Command::Pid(_) => "pid",
        }
    }
}

/// ELM327 `AT` commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    /// `ATZ` / `ATWS`
    Reset,
    /// `ATSH` set header address
    SetHeader,
    /// `ATE` echo on/off
    Echo,
    /// `ATH` headers on/off
    Headers(bool),
    /// `ATL` linefeeds on/off
    Linefeeds(bool),
    /// `AT@1` device description
    DeviceDescription,
    /// `ATI` chip identification
    Identify,
    /// `ATAT` adaptive timing
    AdaptiveTiming,
    /// `ATSP` select protocol
    SetProtocol(Option<ObdProtocol>),
    /// `ATCAF` CAN auto formatting
    CanAutoFormat,
    /// `ATDP` describe protocol
    DescribeProtocol,
    /// `ATDPN` describe protocol by number
    DescribeProtocolNumber,
    /// `ATD` set defaults
    Defaults,
    /// `ATM` memory on/off
    Memory,
    /// `ATRV` read rail voltage
    ReadVoltage,
    /// Any other `AT` command, acknowledged with `OK`
    Unknown,
}

impl AtCommand {
    fn parse(line: &[u8]) -> Self {
        // Order matters: exact matches and prefixes are checked in firmware
        // order, so e.g. `atdp` wins over `atd`.
        match line {
            b"atz" | b"atws" => AtCommand::Reset,
            _ if line.starts_with(b"atsh") => AtCommand::SetHeader,
            _ if line.starts_with(b"ate") => AtCommand::Echo,
            _ if line.starts_with(b"ath") => AtCommand::Headers(line.get(3) == Some(&b'1')),
            _ if line.starts_with(b"atl") => AtCommand::Linefeeds(line.get(3) == Some(&b'1')),
            b"at@1" => AtCommand::DeviceDescription,
            b"ati" => AtCommand::Identify,
            _ if line.starts_with(b"atat") => AtCommand::AdaptiveTiming,
            _ if line.starts_with(b"atsp") => {
                AtCommand::SetProtocol(ObdProtocol::from_elm_argument(&line[4..]))
            }
            _ if line.starts_with(b"atcaf") => AtCommand::CanAutoFormat,
            b"atdp" => AtCommand::DescribeProtocol,
            b"atdpn" => AtCommand::DescribeProtocolNumber,
            b"atd" => AtCommand::Defaults,
            _ if line.starts_with(b"atm") => AtCommand::Memory,
            b"atrv" => AtCommand::ReadVoltage,
            _ => AtCommand::Unknown,
        }
    }
}

/// STN `ST` commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StCommand {
    /// `STM` monitor the bus
    Monitor,
    /// `STDI` device hardware identification
    DeviceId,
    /// `STFCP` clear pass filters
    ClearPassFilters,
    /// `STFAP id,mask` add a pass filter; `None` when the arguments are
    /// malformed
    AddPassFilter(Option<FilterEntry>),
    /// Any other `ST` command, acknowledged with `OK`
    Unknown,
}

impl StCommand {
    fn parse(line: &[u8]) -> Self {
        if line.starts_with(b"stm") {
            StCommand::Monitor
        } else if line.starts_with(b"stdi") {
            StCommand::DeviceId
        } else if line.starts_with(b"stfcp") {
            StCommand::ClearPassFilters
        } else if line.starts_with(b"stfap") {
            StCommand::AddPassFilter(parse_filter_arguments(&line[5..]).ok())
        } else {
            StCommand::Unknown
        }
    }
}

/// Parse `id,mask` as two hex tokens. Tokens after the second are ignored.
pub(crate) fn parse_filter_arguments(args: &[u8]) -> Result<FilterEntry, ElmError> {
    let malformed = || ElmError::FilterArguments(String::from_utf8_lossy(args).into_owned());

    let mut tokens = args.split(|&b| b == b',');
    let id = tokens.next().filter(|t| !t.is_empty()).ok_or_else(malformed)?;
    let mask = tokens.next().filter(|t| !t.is_empty()).ok_or_else(malformed)?;

    Ok(FilterEntry {
        id: parse_hex_u32(id)?,
        mask: parse_hex_u32(mask)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Command {
        Command::parse(text.as_bytes())
    }

    #[test]
    fn test_at_precedence() {
        assert_eq!(parse("atz"), Command::At(AtCommand::Reset));
        assert_eq!(parse("atws"), Command::At(AtCommand::Reset));
        assert_eq!(parse("atdp"), Command::At(AtCommand::DescribeProtocol));
        assert_eq!(parse("atdpn"), Command::At(AtCommand::DescribeProtocolNumber));
        assert_eq!(parse("atd"), Command::At(AtCommand::Defaults));
        assert_eq!(parse("atsh7e0"), Command::At(AtCommand::SetHeader));
        assert_eq!(parse("ate0"), Command::At(AtCommand::Echo));
        assert_eq!(parse("atma"), Command::At(AtCommand::Memory));
        assert_eq!(parse("atcaf1"), Command::At(AtCommand::CanAutoFormat));
        assert_eq!(parse("atat2"), Command::At(AtCommand::AdaptiveTiming));
        assert_eq!(parse("atrv"), Command::At(AtCommand::ReadVoltage));
        assert_eq!(parse("atzz"), Command::At(AtCommand::Unknown));
        assert_eq!(parse("at"), Command::At(AtCommand::Unknown));
    }

    #[test]
    fn test_toggle_argument() {
        assert_eq!(parse("ath1"), Command::At(AtCommand::Headers(true)));
        assert_eq!(parse("ath0"), Command::At(AtCommand::Headers(false)));
        assert_eq!(parse("ath"), Command::At(AtCommand::Headers(false)));
        assert_eq!(parse("atl1"), Command::At(AtCommand::Linefeeds(true)));
        assert_eq!(parse("atlx"), Command::At(AtCommand::Linefeeds(false)));
    }

    #[test]
    fn test_set_protocol() {
        assert_eq!(
            parse("atsp6"),
            Command::At(AtCommand::SetProtocol(Some(ObdProtocol::Iso15765_4Can11bit500)))
        );
        assert_eq!(parse("atsp"), Command::At(AtCommand::SetProtocol(None)));
    }

    #[test]
    fn test_st_commands() {
        assert_eq!(parse("stm"), Command::St(StCommand::Monitor));
        assert_eq!(parse("stdi"), Command::St(StCommand::DeviceId));
        assert_eq!(parse("stfcp"), Command::St(StCommand::ClearPassFilters));
        assert_eq!(
            parse("stfap123,456"),
            Command::St(StCommand::AddPassFilter(Some(FilterEntry { id: 0x123, mask: 0x456 })))
        );
        assert_eq!(parse("stxyz"), Command::St(StCommand::Unknown));
    }

    #[test]
    fn test_malformed_filter_arguments() {
        for args in ["stfap", "stfap123", "stfap123,", "stfap,456", "stfapxyz,456", "stfap1,zz"] {
            assert_eq!(parse(args), Command::St(StCommand::AddPassFilter(None)), "{args}");
        }
        // Extra tokens are ignored
        assert_eq!(
            parse_filter_arguments(b"7e8,7ff,1").unwrap(),
            FilterEntry { id: 0x7E8, mask: 0x7FF }
        );
    }

    #[test]
    fn test_pid_lines() {
        assert_eq!(parse("0105"), Command::Pid(Some(PidRequest { mode: 1, pid: 5 })));
        assert_eq!(parse("01"), Command::Pid(None));
        assert_eq!(parse(""), Command::Pid(None));
        assert_eq!(parse("sxyz"), Command::Pid(None));
    }
}
