use std::fmt;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DNSResourceType {
    #[default]
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    LOC,
    NAPTR,
    DNAME,
    DS,
    OPT,
    SSHFP,
    TLSA,
    SVCB,
    HTTPS,
    CAA,
    AXFR,
    ANY,
    Unknown(u16),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DNSResourceClass {
    #[default]
    IN,
    CS,
    CH,
    HS,
    ANY,
    Unknown(u16),
}

impl From<u16> for DNSResourceClass {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceClass::IN,
            2 => DNSResourceClass::CS,
            3 => DNSResourceClass::CH,
            4 => DNSResourceClass::HS,
            255 => DNSResourceClass::ANY,
            other => DNSResourceClass::Unknown(other),
        }
    }
}

impl From<DNSResourceClass> for u16 {
    fn from(class: DNSResourceClass) -> Self {
        match class {
            DNSResourceClass::IN => 1,
            DNSResourceClass::CS => 2,
            DNSResourceClass::CH => 3,
            DNSResourceClass::HS => 4,
            DNSResourceClass::ANY => 255,
            DNSResourceClass::Unknown(value) => value,
        }
    }
}

impl From<u16> for DNSResourceType {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceType::A,
            2 => DNSResourceType::NS,
            5 => DNSResourceType::CNAME,
            6 => DNSResourceType::SOA,
            12 => DNSResourceType::PTR,
            15 => DNSResourceType::MX,
            16 => DNSResourceType::TXT,
            28 => DNSResourceType::AAAA,
            29 => DNSResourceType::LOC,
            33 => DNSResourceType::SRV,
            35 => DNSResourceType::NAPTR,
            39 => DNSResourceType::DNAME,
            41 => DNSResourceType::OPT,
            43 => DNSResourceType::DS,
            44 => DNSResourceType::SSHFP,
            52 => DNSResourceType::TLSA,
            64 => DNSResourceType::SVCB,
            65 => DNSResourceType::HTTPS,
            252 => DNSResourceType::AXFR,
            255 => DNSResourceType::ANY,
            257 => DNSResourceType::CAA,
            other => DNSResourceType::Unknown(other),
        }
    }
}

impl From<DNSResourceType> for u16 {
    fn from(rtype: DNSResourceType) -> Self {
        match rtype {
            DNSResourceType::A => 1,
            DNSResourceType::NS => 2,
            DNSResourceType::CNAME => 5,
            DNSResourceType::SOA => 6,
            DNSResourceType::PTR => 12,
            DNSResourceType::MX => 15,
            DNSResourceType::TXT => 16,
            DNSResourceType::AAAA => 28,
            DNSResourceType::LOC => 29,
            DNSResourceType::SRV => 33,
            DNSResourceType::NAPTR => 35,
            DNSResourceType::DNAME => 39,
            DNSResourceType::OPT => 41,
            DNSResourceType::DS => 43,
            DNSResourceType::SSHFP => 44,
            DNSResourceType::TLSA => 52,
            DNSResourceType::SVCB => 64,
            DNSResourceType::HTTPS => 65,
            DNSResourceType::AXFR => 252,
            DNSResourceType::ANY => 255,
            DNSResourceType::CAA => 257,
            DNSResourceType::Unknown(value) => value,
        }
    }
}

/// Registered types without a dedicated variant; they travel as `Unknown`
const OTHER_MNEMONICS: &[(&str, u16)] = &[
    ("HINFO", 13),
    ("RP", 17),
    ("AFSDB", 18),
    ("CERT", 37),
    ("RRSIG", 46),
    ("NSEC", 47),
    ("DNSKEY", 48),
    ("NSEC3", 50),
    ("NSEC3PARAM", 51),
    ("SMIMEA", 53),
    ("CDS", 59),
    ("CDNSKEY", 60),
    ("OPENPGPKEY", 61),
    ("URI", 256),
];

impl DNSResourceType {
    /// Look up a type by its zone-file mnemonic (`A`, `MX`, `TYPE65`, ...)
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        let upper = s.to_ascii_uppercase();
        let rtype = match upper.as_str() {
            "A" => DNSResourceType::A,
            "NS" => DNSResourceType::NS,
            "CNAME" => DNSResourceType::CNAME,
            "SOA" => DNSResourceType::SOA,
            "PTR" => DNSResourceType::PTR,
            "MX" => DNSResourceType::MX,
            "TXT" => DNSResourceType::TXT,
            "AAAA" => DNSResourceType::AAAA,
            "SRV" => DNSResourceType::SRV,
            "DS" => DNSResourceType::DS,
            "CAA" => DNSResourceType::CAA,
            "LOC" => DNSResourceType::LOC,
            "NAPTR" => DNSResourceType::NAPTR,
            "DNAME" => DNSResourceType::DNAME,
            "SSHFP" => DNSResourceType::SSHFP,
            "TLSA" => DNSResourceType::TLSA,
            "SVCB" => DNSResourceType::SVCB,
            "HTTPS" => DNSResourceType::HTTPS,
            other => match OTHER_MNEMONICS.iter().find(|(name, _)| *name == other) {
                Some((_, number)) => DNSResourceType::from(*number),
                None => {
                    let number = other.strip_prefix("TYPE")?.parse::<u16>().ok()?;
                    DNSResourceType::from(number)
                }
            },
        };
        Some(rtype)
    }
}

impl fmt::Display for DNSResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSResourceType::Unknown(value) => write!(f, "TYPE{}", value),
            other => write!(f, "{:?}", other),
        }
    }
}

/// DNS response codes from RFC 1035
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    NoError = 0,
    FormatError = 1,
    ServerFailure = 2,
    NameError = 3,
    NotImplemented = 4,
    Refused = 5,
}

impl ResponseCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ResponseCode::NoError),
            1 => Some(ResponseCode::FormatError),
            2 => Some(ResponseCode::ServerFailure),
            3 => Some(ResponseCode::NameError),
            4 => Some(ResponseCode::NotImplemented),
            5 => Some(ResponseCode::Refused),
            _ => None,
        }
    }
}

/// DNS opcodes we distinguish; everything else is answered with NOTIMP
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DnsOpcode {
    Query,
    Other(u8),
}

impl From<u8> for DnsOpcode {
    fn from(value: u8) -> Self {
        match value {
            0 => DnsOpcode::Query,
            other => DnsOpcode::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_types_keep_their_number() {
        let rtype = DNSResourceType::from(65280);
        assert_eq!(rtype, DNSResourceType::Unknown(65280));
        assert_eq!(u16::from(rtype), 65280);
        assert_eq!(rtype.to_string(), "TYPE65280");
        assert_eq!(DNSResourceType::from(65), DNSResourceType::HTTPS);
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(DNSResourceType::from_mnemonic("aaaa"), Some(DNSResourceType::AAAA));
        assert_eq!(DNSResourceType::from_mnemonic("TYPE16"), Some(DNSResourceType::TXT));
        assert_eq!(DNSResourceType::from_mnemonic("tlsa"), Some(DNSResourceType::TLSA));
        assert_eq!(DNSResourceType::from_mnemonic("HINFO"), Some(DNSResourceType::Unknown(13)));
        assert_eq!(DNSResourceType::from_mnemonic("bogus"), None);
    }
}
