use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{ParseError, common::PacketComponent};

const QR: u16 = 1 << 15;
const AA: u16 = 1 << 10;
const TC: u16 = 1 << 9;
const RD: u16 = 1 << 8;
const RA: u16 = 1 << 7;
const OPCODE_SHIFT: u16 = 11;
const Z_SHIFT: u16 = 4;

/// Fixed 12-byte message header (RFC 1035 section 4.1.1)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSHeader {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DNSHeader {
    /// Second header word: QR, opcode, AA, TC, RD, RA, Z and rcode
    pub fn flags(&self) -> u16 {
        let bit = |set: bool, mask: u16| if set { mask } else { 0 };
        bit(self.qr, QR)
            | (u16::from(self.opcode & 0x0f) << OPCODE_SHIFT)
            | bit(self.aa, AA)
            | bit(self.tc, TC)
            | bit(self.rd, RD)
            | bit(self.ra, RA)
            | (u16::from(self.z & 0x07) << Z_SHIFT)
            | u16::from(self.rcode & 0x0f)
    }

    pub fn set_flags(&mut self, flags: u16) {
        self.qr = flags & QR != 0;
        self.opcode = ((flags >> OPCODE_SHIFT) & 0x0f) as u8;
        self.aa = flags & AA != 0;
        self.tc = flags & TC != 0;
        self.rd = flags & RD != 0;
        self.ra = flags & RA != 0;
        self.z = ((flags >> Z_SHIFT) & 0x07) as u8;
        self.rcode = (flags & 0x0f) as u8;
    }
}

impl PacketComponent for DNSHeader {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        for word in [
            self.id,
            self.flags(),
            self.qdcount,
            self.ancount,
            self.nscount,
            self.arcount,
        ] {
            writer.write_var::<u16>(16, word)?;
        }
        Ok(())
    }

    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        _packet: &[u8],
    ) -> Result<(), ParseError> {
        self.id = reader.read_var::<u16>(16)?;
        let flags = reader.read_var::<u16>(16)?;
        self.set_flags(flags);
        self.qdcount = reader.read_var::<u16>(16)?;
        self.ancount = reader.read_var::<u16>(16)?;
        self.nscount = reader.read_var::<u16>(16)?;
        self.arcount = reader.read_var::<u16>(16)?;
        Ok(())
    }
}
