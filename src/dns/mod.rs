pub mod common;
pub mod enums;
pub mod header;
pub mod question;
pub mod resource;

use bitstream_io::{BigEndian, BitReader, BitWriter};
use common::PacketComponent;
use enums::ResponseCode;
use header::DNSHeader;
use question::DNSQuestion;
use resource::DNSResource;
use thiserror::Error;
use tracing::trace;

/// Size of the fixed DNS header
pub const HEADER_SIZE: usize = 12;

/// Largest response sent over UDP without EDNS
pub const MAX_UDP_PAYLOAD: usize = 512;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid DNS header")]
    InvalidHeader,
    #[error("Invalid DNS label")]
    InvalidLabel,
    #[error("DNS name too long")]
    NameTooLong,
    #[error("Invalid resource record")]
    InvalidResource,
    #[error("Invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

impl DNSPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        if buf.len() < HEADER_SIZE {
            return Err(ParseError::InvalidHeader);
        }

        let mut reader = BitReader::<_, BigEndian>::new(buf);
        let mut packet = DNSPacket::default();
        packet.header.read(&mut reader, buf)?;

        for _ in 0..packet.header.qdcount {
            let mut question = DNSQuestion::default();
            question.read(&mut reader, buf)?;
            packet.questions.push(question);
        }

        for _ in 0..packet.header.ancount {
            let mut answer = DNSResource::default();
            answer.read(&mut reader, buf)?;
            packet.answers.push(answer);
        }

        for _ in 0..packet.header.nscount {
            let mut authority = DNSResource::default();
            authority.read(&mut reader, buf)?;
            packet.authorities.push(authority);
        }

        for _ in 0..packet.header.arcount {
            let mut resource = DNSResource::default();
            resource.read(&mut reader, buf)?;
            packet.resources.push(resource);
        }

        Ok(packet)
    }

    /// Serialize to wire format; section counts are taken from the vectors
    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut header = self.header.clone();
        header.qdcount = section_count(self.questions.len())?;
        header.ancount = section_count(self.answers.len())?;
        header.nscount = section_count(self.authorities.len())?;
        header.arcount = section_count(self.resources.len())?;

        let mut buf = Vec::with_capacity(MAX_UDP_PAYLOAD);
        {
            let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);
            header.write(&mut writer)?;

            for question in &self.questions {
                question.write(&mut writer)?;
            }
            for answer in &self.answers {
                answer.write(&mut writer)?;
            }
            for authority in &self.authorities {
                authority.write(&mut writer)?;
            }
            for resource in &self.resources {
                resource.write(&mut writer)?;
            }
        }

        Ok(buf)
    }

    /// Start a response to `query`: same ID, opcode, RD flag and question section
    pub fn reply_to(query: &DNSPacket) -> Self {
        DNSPacket {
            header: DNSHeader {
                id: query.header.id,
                qr: true,
                opcode: query.header.opcode,
                rd: query.header.rd,
                qdcount: query.questions.len() as u16,
                ..Default::default()
            },
            questions: query.questions.clone(),
            ..Default::default()
        }
    }

    /// A reply to `query` carrying only `rcode`
    pub fn error_response(query: &DNSPacket, rcode: ResponseCode) -> Self {
        let mut response = Self::reply_to(query);
        response.header.rcode = rcode.to_u8();
        response
    }

    /// Copy of this response with all record sections dropped and TC set
    pub fn truncated(&self) -> Self {
        let mut response = DNSPacket {
            header: self.header.clone(),
            questions: self.questions.clone(),
            ..Default::default()
        };
        response.header.tc = true;
        response
    }

    pub fn rcode(&self) -> Option<ResponseCode> {
        ResponseCode::from_u8(self.header.rcode)
    }
}

fn section_count(len: usize) -> Result<u16, ParseError> {
    u16::try_from(len).map_err(|_| ParseError::InvalidResource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::{DNSResourceClass, DNSResourceType};

    fn query_bytes() -> Vec<u8> {
        vec![
            0x12, 0x34, // ID
            0x01, 0x00, // Flags: standard query, RD
            0x00, 0x01, // Questions: 1
            0x00, 0x00, // Answers: 0
            0x00, 0x00, // Authority: 0
            0x00, 0x00, // Additional: 0
            0x03, b'w', b'w', b'w', 0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0x03, b'c',
            b'o', b'm', 0x00, // www.example.com
            0x00, 0x01, // Type: A
            0x00, 0x01, // Class: IN
        ]
    }

    #[test]
    fn test_parse_query() {
        let packet = DNSPacket::parse(&query_bytes()).unwrap();
        assert_eq!(packet.header.id, 0x1234);
        assert!(packet.header.rd);
        assert!(!packet.header.qr);
        assert_eq!(packet.questions.len(), 1);
        assert_eq!(packet.questions[0].name(), "www.example.com.");
        assert_eq!(packet.questions[0].qtype, DNSResourceType::A);
        assert_eq!(packet.questions[0].qclass, DNSResourceClass::IN);
    }

    #[test]
    fn test_short_packet_is_rejected() {
        assert!(matches!(
            DNSPacket::parse(&[0x12, 0x34, 0x01]),
            Err(ParseError::InvalidHeader)
        ));
    }

    #[test]
    fn test_truncated_question_is_rejected() {
        let bytes = query_bytes();
        assert!(DNSPacket::parse(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn test_reply_mirrors_query() {
        let query = DNSPacket::parse(&query_bytes()).unwrap();
        let mut reply = DNSPacket::reply_to(&query);
        reply.answers.push(DNSResource {
            labels: query.questions[0].labels.clone(),
            rtype: DNSResourceType::A,
            rclass: DNSResourceClass::IN,
            ttl: 300,
            rdata: vec![192, 0, 2, 1],
            parsed_rdata: Some("192.0.2.1".to_string()),
        });

        let bytes = reply.serialize().unwrap();
        let decoded = DNSPacket::parse(&bytes).unwrap();
        assert_eq!(decoded.header.id, 0x1234);
        assert!(decoded.header.qr);
        assert!(decoded.header.rd);
        assert_eq!(decoded.header.ancount, 1);
        assert_eq!(decoded.questions, query.questions);
        assert_eq!(decoded.answers[0].rdata, vec![192, 0, 2, 1]);
    }

    #[test]
    fn test_truncated_response_keeps_question() {
        let query = DNSPacket::parse(&query_bytes()).unwrap();
        let mut reply = DNSPacket::error_response(&query, ResponseCode::NoError);
        reply.answers.push(DNSResource::default());
        let truncated = reply.truncated();
        assert!(truncated.header.tc);
        assert!(truncated.answers.is_empty());
        assert_eq!(truncated.questions.len(), 1);
    }
}
