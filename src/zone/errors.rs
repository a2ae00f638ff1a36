use thiserror::Error;

/// Zone-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    /// Zone file parsing error
    #[error("Zone parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },
    /// Invalid record format
    #[error("Invalid record at line {line}: {message}")]
    InvalidRecord { line: usize, message: String },
    /// Missing SOA record
    #[error("Zone missing required SOA record at the apex")]
    MissingSOA,
    /// Duplicate SOA record
    #[error("Zone contains duplicate SOA records")]
    DuplicateSOA,
    /// No NS record at the apex
    #[error("Zone has no NS records at the apex")]
    MissingNS,
    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),
    /// Owner name outside of the zone being loaded
    #[error("Record owner {name} is outside of zone {zone}")]
    OutOfZone { name: String, zone: String },
    /// Document is not valid UTF-8
    #[error("Zone document is not valid UTF-8")]
    InvalidEncoding,
    /// Zone file too large
    #[error("Zone file exceeds maximum size")]
    FileTooLarge,
    /// Invalid TTL value
    #[error("Invalid TTL value: {0}")]
    InvalidTTL(String),
    /// Invalid resource record type
    #[error("Invalid resource record type: {0}")]
    InvalidRRType(String),
    /// Only the IN class is served
    #[error("Unsupported record class: {0}")]
    UnsupportedClass(String),
    /// Directive we do not process
    #[error("Unsupported directive: {0}")]
    UnsupportedDirective(String),
    /// Validation error
    #[error("Zone validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ZoneError>;
