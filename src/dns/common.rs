use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Maximum number of compression pointers followed while decoding one name
const MAX_POINTER_JUMPS: usize = 16;

/// Maximum length of a domain name in wire format
pub const MAX_NAME_LENGTH: usize = 255;

pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    /// Read this component; `packet` is the whole message so compression
    /// pointers can be resolved.
    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<(), ParseError>;

    fn read_labels<E: Endianness>(
        &self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        loop {
            let label_len = reader.read_var::<u8>(8)?;
            if label_len == 0 {
                break;
            }
            if label_len & 0xC0 == 0xC0 {
                let low = reader.read_var::<u8>(8)?;
                let pointer = (usize::from(label_len & 0x3F) << 8) | usize::from(low);
                labels.extend(decode_name_at(packet, pointer)?);
                break;
            }
            if label_len > 63 {
                return Err(ParseError::InvalidLabel);
            }
            let mut buf = vec![0; label_len as usize];
            reader.read_bytes(&mut buf)?;
            let label = String::from_utf8(buf).map_err(|_| ParseError::InvalidLabel)?;
            labels.push(label);
        }

        check_name_length(&labels)?;
        Ok(labels)
    }

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        check_name_length(labels)?;
        for label in labels.iter().filter(|l| !l.is_empty()) {
            if label.len() > 63 {
                return Err(ParseError::InvalidLabel);
            }
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;

        Ok(())
    }
}

/// Decode a (possibly compressed) name starting at `offset` in `packet`
fn decode_name_at(packet: &[u8], mut offset: usize) -> Result<Vec<String>, ParseError> {
    let mut labels = Vec::new();
    let mut jumps = 0;

    loop {
        let len = *packet.get(offset).ok_or(ParseError::InvalidLabel)?;

        if len & 0xC0 == 0xC0 {
            let low = *packet.get(offset + 1).ok_or(ParseError::InvalidLabel)?;
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(ParseError::InvalidLabel);
            }
            offset = (usize::from(len & 0x3F) << 8) | usize::from(low);
            continue;
        }

        if len == 0 {
            return Ok(labels);
        }

        if len > 63 {
            return Err(ParseError::InvalidLabel);
        }

        let start = offset + 1;
        let end = start + len as usize;
        let bytes = packet.get(start..end).ok_or(ParseError::InvalidLabel)?;
        let label = String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidLabel)?;
        labels.push(label);
        offset = end;
    }
}

fn check_name_length(labels: &[String]) -> Result<(), ParseError> {
    let wire_len: usize = labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1;
    if wire_len > MAX_NAME_LENGTH {
        return Err(ParseError::NameTooLong);
    }
    Ok(())
}

/// Join wire labels into a lowercase, fully-qualified presentation name
pub fn labels_to_fqdn(labels: &[String]) -> String {
    let mut name = labels
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| l.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(".");
    name.push('.');
    name
}

/// Split a presentation name into wire labels (root yields no labels)
pub fn fqdn_to_labels(name: &str) -> Vec<String> {
    name.split('.')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
