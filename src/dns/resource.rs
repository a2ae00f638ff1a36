use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{PacketComponent, labels_to_fqdn},
    enums::{DNSResourceClass, DNSResourceType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    /// RDATA in wire format (names uncompressed)
    pub rdata: Vec<u8>,
    /// RDATA in presentation format, absolute names, when built from zone data
    pub parsed_rdata: Option<String>,
}

impl DNSResource {
    /// Owner name as a lowercase FQDN
    pub fn owner(&self) -> String {
        labels_to_fqdn(&self.labels)
    }

    /// The domain name this record points at, for types that carry one
    /// (NS, CNAME, PTR, MX exchange, SRV target).
    pub fn target_name(&self) -> Option<&str> {
        match self.rtype {
            DNSResourceType::NS
            | DNSResourceType::CNAME
            | DNSResourceType::PTR
            | DNSResourceType::MX
            | DNSResourceType::SRV => self
                .parsed_rdata
                .as_deref()
                .and_then(|rdata| rdata.split_whitespace().last()),
            _ => None,
        }
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        let rdlength =
            u16::try_from(self.rdata.len()).map_err(|_| ParseError::InvalidResource)?;
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, rdlength)?;
        writer.write_bytes(&self.rdata)?;
        Ok(())
    }

    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<(), ParseError> {
        self.labels = self.read_labels(reader, packet)?;
        self.rtype = reader.read_var::<u16>(16)?.into();
        self.rclass = reader.read_var::<u16>(16)?.into();
        self.ttl = reader.read_var::<u32>(32)?;
        let rdlength = reader.read_var::<u16>(16)?;
        let mut buf = vec![0_u8; rdlength as usize];
        reader.read_bytes(&mut buf)?;
        self.rdata = buf;
        self.parsed_rdata = None;

        Ok(())
    }
}
