use super::name::absolute_name;
use super::{Result, ZoneError};
use crate::dns::common::fqdn_to_labels;
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::resource::DNSResource;
use base64::{Engine, engine::general_purpose::STANDARD};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Defaults from RFC 1876, in centimetres
const LOC_DEFAULT_SIZE: u64 = 100;
const LOC_DEFAULT_HORIZONTAL_PRECISION: u64 = 1_000_000;
const LOC_DEFAULT_VERTICAL_PRECISION: u64 = 1_000;
/// LOC altitudes are stored relative to 100 000 m below the WGS 84 spheroid
const LOC_ALTITUDE_BASE: i64 = 10_000_000;
/// Latitude and longitude are offsets from 2^31 in thousandths of an arcsecond
const LOC_EQUATOR: i64 = 1 << 31;

/// A zone record represents a single resource record in a zone file
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRecord {
    /// Absolute, lowercase owner name
    pub name: String,
    /// Time to live in seconds
    pub ttl: u32,
    pub class: DNSResourceClass,
    pub rtype: DNSResourceType,
    /// RDATA fields as they appeared in the zone file, escapes resolved
    pub rdata: Vec<String>,
    /// Source line, for error reporting
    pub line: usize,
}

impl ZoneRecord {
    /// Convert to a DNS resource record; relative names in RDATA resolve against `origin`
    pub fn to_dns_resource(&self, origin: &str) -> Result<DNSResource> {
        let (rdata, presentation) = self.encode_rdata(origin)?;
        Ok(DNSResource {
            labels: fqdn_to_labels(&self.name),
            rtype: self.rtype,
            rclass: self.class,
            ttl: self.ttl,
            rdata,
            parsed_rdata: Some(presentation),
        })
    }

    /// Whether this record can be compiled to wire format. Types without a
    /// presentation-format encoder only load in the RFC 3597 `\#` form.
    pub fn is_encodable(&self) -> bool {
        self.is_generic()
            || !matches!(
                self.rtype,
                DNSResourceType::Unknown(_)
                    | DNSResourceType::OPT
                    | DNSResourceType::AXFR
                    | DNSResourceType::ANY
            )
    }

    fn is_generic(&self) -> bool {
        self.rdata.first().map(String::as_str) == Some("#")
    }

    fn invalid(&self, message: impl Into<String>) -> ZoneError {
        ZoneError::InvalidRecord {
            line: self.line,
            message: message.into(),
        }
    }

    fn expect_fields(&self, count: usize) -> Result<()> {
        if self.rdata.len() != count {
            return Err(self.invalid(format!(
                "{} record requires {} fields, got {}",
                self.rtype,
                count,
                self.rdata.len()
            )));
        }
        Ok(())
    }

    fn encode_rdata(&self, origin: &str) -> Result<(Vec<u8>, String)> {
        if self.is_generic() {
            return self.encode_generic();
        }
        match self.rtype {
            DNSResourceType::A => {
                self.expect_fields(1)?;
                let addr: Ipv4Addr = self.rdata[0]
                    .parse()
                    .map_err(|_| self.invalid(format!("Invalid IPv4 address: {}", self.rdata[0])))?;
                Ok((addr.octets().to_vec(), addr.to_string()))
            }
            DNSResourceType::AAAA => {
                self.expect_fields(1)?;
                let addr: Ipv6Addr = self.rdata[0]
                    .parse()
                    .map_err(|_| self.invalid(format!("Invalid IPv6 address: {}", self.rdata[0])))?;
                Ok((addr.octets().to_vec(), addr.to_string()))
            }
            DNSResourceType::NS
            | DNSResourceType::CNAME
            | DNSResourceType::PTR
            | DNSResourceType::DNAME => {
                self.expect_fields(1)?;
                let target = absolute_name(&self.rdata[0], origin)?;
                Ok((encode_name(&target), target))
            }
            DNSResourceType::MX => {
                self.expect_fields(2)?;
                let preference = self.number::<u16>(0, "MX preference")?;
                let exchange = absolute_name(&self.rdata[1], origin)?;
                let mut rdata = preference.to_be_bytes().to_vec();
                rdata.extend_from_slice(&encode_name(&exchange));
                Ok((rdata, format!("{} {}", preference, exchange)))
            }
            DNSResourceType::SRV => {
                self.expect_fields(4)?;
                let priority = self.number::<u16>(0, "SRV priority")?;
                let weight = self.number::<u16>(1, "SRV weight")?;
                let port = self.number::<u16>(2, "SRV port")?;
                let target = absolute_name(&self.rdata[3], origin)?;
                let mut rdata = Vec::with_capacity(6 + target.len() + 1);
                rdata.extend_from_slice(&priority.to_be_bytes());
                rdata.extend_from_slice(&weight.to_be_bytes());
                rdata.extend_from_slice(&port.to_be_bytes());
                rdata.extend_from_slice(&encode_name(&target));
                Ok((rdata, format!("{} {} {} {}", priority, weight, port, target)))
            }
            DNSResourceType::SOA => self.encode_soa(origin),
            DNSResourceType::TXT => self.encode_txt(),
            DNSResourceType::CAA => self.encode_caa(),
            DNSResourceType::DS => self.encode_ds(),
            DNSResourceType::TLSA => self.encode_hex_tail(3, "TLSA"),
            DNSResourceType::SSHFP => self.encode_hex_tail(2, "SSHFP"),
            DNSResourceType::NAPTR => self.encode_naptr(origin),
            DNSResourceType::SVCB | DNSResourceType::HTTPS => self.encode_svcb(origin),
            DNSResourceType::LOC => self.encode_loc(),
            other => Err(self.invalid(format!("Unsupported record type for zone files: {}", other))),
        }
    }

    fn number<T: std::str::FromStr>(&self, index: usize, what: &str) -> Result<T> {
        self.rdata[index]
            .parse()
            .map_err(|_| self.invalid(format!("Invalid {}: {}", what, self.rdata[index])))
    }

    fn encode_soa(&self, origin: &str) -> Result<(Vec<u8>, String)> {
        // mname rname serial refresh retry expire minimum
        self.expect_fields(7)?;
        let mname = absolute_name(&self.rdata[0], origin)?;
        let rname = absolute_name(&self.rdata[1], origin)?;
        let serial = self.number::<u32>(2, "SOA serial")?;

        let mut rdata = encode_name(&mname);
        rdata.extend_from_slice(&encode_name(&rname));
        rdata.extend_from_slice(&serial.to_be_bytes());

        let mut timers = Vec::with_capacity(4);
        for field in &self.rdata[3..7] {
            let value = super::parser::parse_ttl(field)
                .ok_or_else(|| self.invalid(format!("Invalid SOA timer: {}", field)))?;
            rdata.extend_from_slice(&value.to_be_bytes());
            timers.push(value.to_string());
        }

        Ok((
            rdata,
            format!("{} {} {} {}", mname, rname, serial, timers.join(" ")),
        ))
    }

    fn encode_txt(&self) -> Result<(Vec<u8>, String)> {
        if self.rdata.is_empty() {
            return Err(self.invalid("TXT record requires at least one string"));
        }
        let mut rdata = Vec::new();
        let mut strings = Vec::with_capacity(self.rdata.len());
        for text in &self.rdata {
            // Character-strings are capped at 255 bytes; longer input is split
            let bytes = text.as_bytes();
            if bytes.is_empty() {
                rdata.push(0);
            }
            for chunk in bytes.chunks(255) {
                rdata.push(chunk.len() as u8);
                rdata.extend_from_slice(chunk);
            }
            strings.push(quote(text));
        }
        Ok((rdata, strings.join(" ")))
    }

    fn encode_caa(&self) -> Result<(Vec<u8>, String)> {
        // flags tag value
        self.expect_fields(3)?;
        let flags = self.number::<u8>(0, "CAA flags")?;
        let tag = self.rdata[1].to_ascii_lowercase();
        if tag.is_empty() || tag.len() > 255 || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(self.invalid(format!("Invalid CAA tag: {}", self.rdata[1])));
        }
        let value = &self.rdata[2];

        let mut rdata = vec![flags, tag.len() as u8];
        rdata.extend_from_slice(tag.as_bytes());
        rdata.extend_from_slice(value.as_bytes());
        Ok((rdata, format!("{} {} \"{}\"", flags, tag, value)))
    }

    fn encode_ds(&self) -> Result<(Vec<u8>, String)> {
        // key-tag algorithm digest-type digest (digest may be split across fields)
        if self.rdata.len() < 4 {
            return Err(self.invalid("DS record requires 4 fields"));
        }
        let key_tag = self.number::<u16>(0, "DS key tag")?;
        let algorithm = self.number::<u8>(1, "DS algorithm")?;
        let digest_type = self.number::<u8>(2, "DS digest type")?;
        let digest_hex = self.rdata[3..].concat();
        let digest = hex::decode(&digest_hex)
            .map_err(|_| self.invalid(format!("Invalid DS digest: {}", digest_hex)))?;

        let mut rdata = key_tag.to_be_bytes().to_vec();
        rdata.push(algorithm);
        rdata.push(digest_type);
        rdata.extend_from_slice(&digest);
        Ok((
            rdata,
            format!(
                "{} {} {} {}",
                key_tag,
                algorithm,
                digest_type,
                digest_hex.to_ascii_uppercase()
            ),
        ))
    }

    /// RFC 3597 `\# <length> <hex>` form
    fn encode_generic(&self) -> Result<(Vec<u8>, String)> {
        if self.rdata.len() < 2 {
            return Err(self.invalid("Generic RDATA requires a length"));
        }
        let length = self.number::<usize>(1, "generic RDATA length")?;
        let data = self.rdata[2..].concat();
        let rdata = if data.is_empty() {
            Vec::new()
        } else {
            hex::decode(&data).map_err(|_| self.invalid(format!("Invalid hex RDATA: {}", data)))?
        };
        if rdata.len() != length {
            return Err(self.invalid(format!(
                "Generic RDATA length mismatch: declared {}, got {}",
                length,
                rdata.len()
            )));
        }
        Ok((rdata, format!("\\# {} {}", length, data.to_ascii_uppercase())))
    }

    /// `count` single-octet fields followed by hex data (TLSA, SSHFP)
    fn encode_hex_tail(&self, count: usize, what: &str) -> Result<(Vec<u8>, String)> {
        if self.rdata.len() <= count {
            return Err(self.invalid(format!("{} record requires {} fields", what, count + 1)));
        }
        let mut rdata = Vec::new();
        let mut fields = Vec::with_capacity(count + 1);
        for index in 0..count {
            let value = self.number::<u8>(index, what)?;
            rdata.push(value);
            fields.push(value.to_string());
        }
        let data = self.rdata[count..].concat();
        let decoded = hex::decode(&data)
            .map_err(|_| self.invalid(format!("Invalid {} data: {}", what, data)))?;
        rdata.extend_from_slice(&decoded);
        fields.push(data.to_ascii_uppercase());
        Ok((rdata, fields.join(" ")))
    }

    fn encode_naptr(&self, origin: &str) -> Result<(Vec<u8>, String)> {
        // order preference flags services regexp replacement
        self.expect_fields(6)?;
        let order = self.number::<u16>(0, "NAPTR order")?;
        let preference = self.number::<u16>(1, "NAPTR preference")?;
        let replacement = if self.rdata[5] == "." {
            ".".to_string()
        } else {
            absolute_name(&self.rdata[5], origin)?
        };

        let mut rdata = order.to_be_bytes().to_vec();
        rdata.extend_from_slice(&preference.to_be_bytes());
        for text in &self.rdata[2..5] {
            rdata.extend_from_slice(&self.character_string(text)?);
        }
        rdata.extend_from_slice(&encode_name(&replacement));

        Ok((
            rdata,
            format!(
                "{} {} {} {} {} {}",
                order,
                preference,
                quote(&self.rdata[2]),
                quote(&self.rdata[3]),
                quote(&self.rdata[4]),
                replacement
            ),
        ))
    }

    /// SVCB and HTTPS (RFC 9460): priority, target, then `key=value` parameters
    fn encode_svcb(&self, origin: &str) -> Result<(Vec<u8>, String)> {
        if self.rdata.len() < 2 {
            return Err(self.invalid(format!("{} record requires a priority and target", self.rtype)));
        }
        let priority = self.number::<u16>(0, "SVCB priority")?;
        let target = if self.rdata[1] == "." {
            ".".to_string()
        } else {
            absolute_name(&self.rdata[1], origin)?
        };

        let mut params: Vec<(u16, Vec<u8>, String)> = Vec::new();
        let mut fields = self.rdata[2..].iter();
        while let Some(field) = fields.next() {
            let (name, value) = match field.split_once('=') {
                // `key="quoted value"` arrives as two fields
                Some((name, "")) => (name, fields.next().map(String::as_str).unwrap_or("")),
                Some((name, value)) => (name, value),
                None => (field.as_str(), ""),
            };
            let name = name.to_ascii_lowercase();
            let key = svc_param_key(&name)
                .ok_or_else(|| self.invalid(format!("Unknown SVCB parameter: {}", name)))?;
            if params.iter().any(|(k, _, _)| *k == key) {
                return Err(self.invalid(format!("Duplicate SVCB parameter: {}", name)));
            }
            let wire = self.svc_param_value(key, value)?;
            let presentation = if value.is_empty() {
                name
            } else {
                format!("{}={}", name, value)
            };
            params.push((key, wire, presentation));
        }
        params.sort_by_key(|(key, _, _)| *key);

        let mut rdata = priority.to_be_bytes().to_vec();
        rdata.extend_from_slice(&encode_name(&target));
        let mut presentation = vec![priority.to_string(), target];
        for (key, value, text) in params {
            let length = u16::try_from(value.len())
                .map_err(|_| self.invalid("SVCB parameter value too long"))?;
            rdata.extend_from_slice(&key.to_be_bytes());
            rdata.extend_from_slice(&length.to_be_bytes());
            rdata.extend_from_slice(&value);
            presentation.push(text);
        }
        Ok((rdata, presentation.join(" ")))
    }

    fn svc_param_value(&self, key: u16, value: &str) -> Result<Vec<u8>> {
        let bad = |what: &str| self.invalid(format!("Invalid SVCB {}: {}", what, value));
        let list = || value.split(',').filter(|v| !v.is_empty());
        let mut wire = Vec::new();
        match key {
            0 => {
                let mut keys = list()
                    .map(|name| svc_param_key(&name.to_ascii_lowercase()))
                    .collect::<Option<Vec<u16>>>()
                    .ok_or_else(|| bad("mandatory"))?;
                keys.sort_unstable();
                for key in keys {
                    wire.extend_from_slice(&key.to_be_bytes());
                }
            }
            1 => {
                for alpn in list() {
                    wire.extend_from_slice(&self.character_string(alpn)?);
                }
            }
            2 => {
                if !value.is_empty() {
                    return Err(bad("no-default-alpn"));
                }
            }
            3 => {
                let port: u16 = value.parse().map_err(|_| bad("port"))?;
                wire.extend_from_slice(&port.to_be_bytes());
            }
            4 => {
                for addr in list() {
                    let addr: Ipv4Addr = addr.parse().map_err(|_| bad("ipv4hint"))?;
                    wire.extend_from_slice(&addr.octets());
                }
            }
            5 => {
                wire = STANDARD.decode(value).map_err(|_| bad("ech"))?;
            }
            6 => {
                for addr in list() {
                    let addr: Ipv6Addr = addr.parse().map_err(|_| bad("ipv6hint"))?;
                    wire.extend_from_slice(&addr.octets());
                }
            }
            _ => wire.extend_from_slice(value.as_bytes()),
        }
        // Only no-default-alpn may be empty
        if wire.is_empty() && key != 2 {
            return Err(bad("parameter value"));
        }
        Ok(wire)
    }

    /// RFC 1876 location: `lat... N|S lon... E|W alt[m] [size[m] [hp[m] [vp[m]]]]`
    fn encode_loc(&self) -> Result<(Vec<u8>, String)> {
        let mut fields = self.rdata.iter().map(String::as_str);
        let latitude = self.loc_coordinate(&mut fields, ('N', 'S'), 90)?;
        let longitude = self.loc_coordinate(&mut fields, ('E', 'W'), 180)?;

        let altitude = fields
            .next()
            .ok_or_else(|| self.invalid("LOC record requires an altitude"))?;
        let altitude = self
            .loc_centimetres(altitude)
            .and_then(|cm| u32::try_from(cm + LOC_ALTITUDE_BASE).ok())
            .ok_or_else(|| self.invalid(format!("Invalid LOC altitude: {}", altitude)))?;

        let mut precision = [
            LOC_DEFAULT_SIZE,
            LOC_DEFAULT_HORIZONTAL_PRECISION,
            LOC_DEFAULT_VERTICAL_PRECISION,
        ];
        for slot in precision.iter_mut() {
            let Some(field) = fields.next() else {
                break;
            };
            *slot = self
                .loc_centimetres(field)
                .and_then(|cm| u64::try_from(cm).ok())
                .ok_or_else(|| self.invalid(format!("Invalid LOC precision: {}", field)))?;
        }
        if fields.next().is_some() {
            return Err(self.invalid("Too many fields in LOC record"));
        }

        let mut rdata = vec![0u8];
        for value in precision {
            rdata.push(
                loc_precision(value)
                    .ok_or_else(|| self.invalid(format!("LOC precision out of range: {}cm", value)))?,
            );
        }
        rdata.extend_from_slice(&latitude.to_be_bytes());
        rdata.extend_from_slice(&longitude.to_be_bytes());
        rdata.extend_from_slice(&altitude.to_be_bytes());
        Ok((rdata, self.rdata.join(" ")))
    }

    fn loc_coordinate<'a>(
        &self,
        fields: &mut impl Iterator<Item = &'a str>,
        (positive, negative): (char, char),
        max_degrees: i64,
    ) -> Result<u32> {
        let mut parts: Vec<f64> = Vec::with_capacity(3);
        let sign = loop {
            let field = fields
                .next()
                .ok_or_else(|| self.invalid("Truncated LOC coordinate"))?;
            match field.to_ascii_uppercase().as_str() {
                h if h.len() == 1 && h.starts_with(positive) => break 1,
                h if h.len() == 1 && h.starts_with(negative) => break -1,
                _ => {}
            }
            if parts.len() == 3 {
                return Err(self.invalid(format!("Invalid LOC coordinate near {}", field)));
            }
            let value: f64 = field
                .parse()
                .map_err(|_| self.invalid(format!("Invalid LOC coordinate: {}", field)))?;
            parts.push(value);
        };

        let (degrees, minutes, seconds) = match parts.as_slice() {
            [d] => (*d, 0.0, 0.0),
            [d, m] => (*d, *m, 0.0),
            [d, m, s] => (*d, *m, *s),
            _ => return Err(self.invalid("LOC coordinate requires degrees")),
        };
        if degrees.fract() != 0.0
            || minutes.fract() != 0.0
            || !(0.0..60.0).contains(&minutes)
            || !(0.0..60.0).contains(&seconds)
        {
            return Err(self.invalid("Invalid LOC coordinate"));
        }

        let thousandths = ((degrees * 3600.0 + minutes * 60.0 + seconds) * 1000.0).round() as i64;
        if !(0..=max_degrees * 3_600_000).contains(&thousandths) {
            return Err(self.invalid("LOC coordinate out of range"));
        }
        u32::try_from(LOC_EQUATOR + sign * thousandths)
            .map_err(|_| self.invalid("LOC coordinate out of range"))
    }

    /// `12.5m` or `12.5` metres to centimetres
    fn loc_centimetres(&self, field: &str) -> Option<i64> {
        let metres: f64 = field.trim_end_matches(['m', 'M']).parse().ok()?;
        if !metres.is_finite() {
            return None;
        }
        Some((metres * 100.0).round() as i64)
    }

    fn character_string(&self, text: &str) -> Result<Vec<u8>> {
        let bytes = text.as_bytes();
        let length = u8::try_from(bytes.len())
            .map_err(|_| self.invalid(format!("Character string longer than 255 bytes: {}", text)))?;
        let mut encoded = Vec::with_capacity(bytes.len() + 1);
        encoded.push(length);
        encoded.extend_from_slice(bytes);
        Ok(encoded)
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn svc_param_key(name: &str) -> Option<u16> {
    match name {
        "mandatory" => Some(0),
        "alpn" => Some(1),
        "no-default-alpn" => Some(2),
        "port" => Some(3),
        "ipv4hint" => Some(4),
        "ech" => Some(5),
        "ipv6hint" => Some(6),
        other => other.strip_prefix("key")?.parse().ok(),
    }
}

/// RFC 1876 size/precision byte: mantissa in the high nibble, power of ten in the low
fn loc_precision(centimetres: u64) -> Option<u8> {
    let mut mantissa = centimetres;
    let mut exponent = 0u8;
    while mantissa > 9 {
        if exponent == 9 {
            return None;
        }
        mantissa /= 10;
        exponent += 1;
    }
    Some(((mantissa as u8) << 4) | exponent)
}

/// Encode an absolute name to uncompressed wire format
pub fn encode_name(name: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(name.len() + 1);
    for label in name.split('.').filter(|l| !l.is_empty()) {
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    encoded
}
