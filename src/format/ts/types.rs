use std::time::Duration;

/// PID carrying the Program Association Table.
pub const PID_PAT: u16 = 0x0000;

/// Table id of a PAT section.
pub const TABLE_ID_PAT: u8 = 0x00;
/// Table id of a PMT section.
pub const TABLE_ID_PMT: u8 = 0x02;

/// Metadata carried in PES packets (ISO/IEC 13818-1 Table 2-34).
pub const STREAM_TYPE_METADATA: u8 = 0x15;

/// First byte of every transport packet.
pub const TS_SYNC_BYTE: u8 = 0x47;
/// Size of one transport packet.
pub const TS_PACKET_SIZE: usize = 188;
/// Size of the fixed transport packet header.
pub const TS_HEADER_SIZE: usize = 4;
/// Start code, stream id and packet length.
pub const PES_FIXED_HEADER_SIZE: usize = 6;
/// PTS/DTS clock rate.
pub const PTS_HZ: u64 = 90_000;

/// One program entry of a Program Association Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PATEntry {
    /// Program number; 0 marks the network information entry
    pub program_number: u16,
    /// Network PID, set only for program 0
    pub network_pid: u16,
    /// PMT PID of the program
    pub program_map_pid: u16,
}

/// Program Association Table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PAT {
    /// Transport stream id from the section header
    pub transport_stream_id: u16,
    /// Entries in table order
    pub entries: Vec<PATEntry>,
}

impl PAT {
    /// PMT PIDs of all real programs, skipping the network information entry.
    pub fn program_map_pids(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.program_number != 0)
            .map(|entry| entry.program_map_pid)
    }
}

/// Raw PSI descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Descriptor tag
    pub tag: u8,
    /// Descriptor body
    pub data: Vec<u8>,
}

/// One elementary stream listed in a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    /// Stream type (ISO/IEC 13818-1 Table 2-34)
    pub stream_type: u8,
    /// PID carrying the stream
    pub elementary_pid: u16,
    /// ES info descriptors
    pub descriptors: Vec<Descriptor>,
}

/// Program Map Table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PMT {
    /// Program this table describes
    pub program_number: u16,
    /// PID carrying the program clock reference
    pub pcr_pid: u16,
    /// Program-level descriptors
    pub program_descriptors: Vec<Descriptor>,
    /// Elementary streams in table order
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

impl PMT {
    /// Returns the PID of the first elementary stream with the given type.
    pub fn find_stream(&self, stream_type: u8) -> Option<u16> {
        self.elementary_stream_infos
            .iter()
            .find(|info| info.stream_type == stream_type)
            .map(|info| info.elementary_pid)
    }
}

/// Fixed 4-byte transport packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSHeader {
    /// Always 0x47
    pub sync_byte: u8,
    /// Transport error indicator
    pub transport_error: bool,
    /// Payload unit start indicator
    pub payload_unit_start: bool,
    /// Transport priority
    pub transport_priority: bool,
    /// 13-bit packet identifier
    pub pid: u16,
    /// Transport scrambling control
    pub scrambling_control: u8,
    /// An adaptation field follows the header
    pub adaptation_field_exists: bool,
    /// The packet carries payload
    pub contains_payload: bool,
    /// Continuity counter
    pub continuity_counter: u8,
}

/// Converts 90 kHz ticks to a duration.
pub fn pts_to_time(pts: u64) -> Duration {
    Duration::from_nanos(((pts as u128 * 1_000_000_000) / PTS_HZ as u128) as u64)
}

/// Converts 90 kHz ticks to seconds.
pub fn pts_to_seconds(pts: u64) -> f64 {
    pts as f64 / PTS_HZ as f64
}
