use std::fmt;

/// Class IN (RFC 1035 Section 3.2.4)
pub const CLASS_IN: u16 = 1;

/// DNS Record Types (RFC 1035 Section 3.2.2, RFC 3596)
///
/// Only [`RecordType::A`] is ever requested or accepted. The other variants
/// exist so skipped answers can be named in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// A record: IPv4 address (32 bits)
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    /// AAAA record: IPv6 address (128 bits) - RFC 3596
    Aaaa,
    Unknown(u16),
}

impl RecordType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::A,
            2 => Self::Ns,
            5 => Self::Cname,
            6 => Self::Soa,
            12 => Self::Ptr,
            15 => Self::Mx,
            16 => Self::Txt,
            28 => Self::Aaaa,
            n => Self::Unknown(n),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::A => 1,
            Self::Ns => 2,
            Self::Cname => 5,
            Self::Soa => 6,
            Self::Ptr => 12,
            Self::Mx => 15,
            Self::Txt => 16,
            Self::Aaaa => 28,
            Self::Unknown(n) => n,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::Ns => f.write_str("NS"),
            Self::Cname => f.write_str("CNAME"),
            Self::Soa => f.write_str("SOA"),
            Self::Ptr => f.write_str("PTR"),
            Self::Mx => f.write_str("MX"),
            Self::Txt => f.write_str("TXT"),
            Self::Aaaa => f.write_str("AAAA"),
            Self::Unknown(n) => write!(f, "TYPE{n}"),
        }
    }
}
