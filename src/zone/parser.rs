use super::name::{ZoneName, absolute_name};
use super::{Result, Zone, ZoneError, ZoneRecord, constants};
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use tracing::{debug, trace};

/// One whitespace-separated field; quoted fields keep their spaces
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

/// Fields of one logical line (parentheses joined)
#[derive(Debug)]
struct Entry {
    line: usize,
    /// Line started with whitespace: owner is inherited from the previous record
    inherits_owner: bool,
    tokens: Vec<Token>,
}

/// RFC 1035 master file parser for a single zone
pub struct ZoneParser {
    zone: ZoneName,
    /// Current origin for relative names
    current_origin: String,
    /// `$TTL` value, if any
    default_ttl: Option<u32>,
    /// Last explicit TTL seen, used when there is no `$TTL`
    last_ttl: Option<u32>,
    last_owner: Option<String>,
}

impl ZoneParser {
    pub fn new(zone: &ZoneName) -> Self {
        Self {
            zone: zone.clone(),
            current_origin: zone.as_str().to_string(),
            default_ttl: None,
            last_ttl: None,
            last_owner: None,
        }
    }

    /// Parse a raw document as delivered by a provider
    pub fn parse_bytes(&mut self, contents: &[u8]) -> Result<Zone> {
        if contents.len() > constants::MAX_ZONE_FILE_SIZE {
            return Err(ZoneError::FileTooLarge);
        }
        let text = std::str::from_utf8(contents).map_err(|_| ZoneError::InvalidEncoding)?;
        self.parse(text)
    }

    /// Parse zone file contents
    pub fn parse(&mut self, contents: &str) -> Result<Zone> {
        if contents.len() > constants::MAX_ZONE_FILE_SIZE {
            return Err(ZoneError::FileTooLarge);
        }

        let entries = tokenize(contents)?;
        let mut records = Vec::with_capacity(entries.len());

        for entry in entries {
            trace!("Parsing line {}: {:?}", entry.line, entry.tokens);
            let first = &entry.tokens[0];
            if !entry.inherits_owner && !first.quoted && first.text.starts_with('$') {
                self.parse_directive(&entry)?;
                continue;
            }
            records.push(self.parse_record(&entry)?);
        }

        let zone = Zone::build(self.zone.clone(), records)?;
        debug!(
            "Parsed zone {} with {} records",
            zone.origin(),
            zone.record_count()
        );
        Ok(zone)
    }

    fn parse_directive(&mut self, entry: &Entry) -> Result<()> {
        let directive = entry.tokens[0].text.to_ascii_uppercase();
        let argument = entry.tokens.get(1).map(|t| t.text.as_str());

        match (directive.as_str(), argument) {
            ("$ORIGIN", Some(origin)) => {
                self.current_origin = absolute_name(origin, &self.current_origin)?;
                debug!("Set origin to: {}", self.current_origin);
            }
            ("$TTL", Some(ttl)) => {
                let ttl = parse_ttl(ttl).ok_or_else(|| ZoneError::InvalidTTL(ttl.to_string()))?;
                self.default_ttl = Some(ttl);
                debug!("Set default TTL to: {}", ttl);
            }
            ("$ORIGIN" | "$TTL", None) => {
                return Err(ZoneError::ParseError {
                    line: entry.line,
                    message: format!("{} requires a value", directive),
                });
            }
            _ => return Err(ZoneError::UnsupportedDirective(directive)),
        }
        Ok(())
    }

    fn parse_record(&mut self, entry: &Entry) -> Result<ZoneRecord> {
        let parse_error = |message: String| ZoneError::ParseError {
            line: entry.line,
            message,
        };

        let mut fields = entry.tokens.iter().peekable();

        let name = if entry.inherits_owner {
            self.last_owner
                .clone()
                .ok_or_else(|| parse_error("record without owner name".to_string()))?
        } else {
            let owner = fields
                .next()
                .ok_or_else(|| parse_error("empty record".to_string()))?;
            absolute_name(&owner.text, &self.current_origin)?
        };

        // TTL and class may appear in either order, both optional
        let mut ttl = None;
        let mut class = None;
        while let Some(token) = fields.peek() {
            if class.is_none() && !token.quoted && parse_class(&token.text).is_some() {
                class = parse_class(&token.text);
            } else if ttl.is_none() && !token.quoted && token.text.starts_with(|c: char| c.is_ascii_digit()) {
                ttl = Some(parse_ttl(&token.text).ok_or_else(|| ZoneError::InvalidTTL(token.text.clone()))?);
            } else {
                break;
            }
            fields.next();
        }

        let type_token = fields
            .next()
            .ok_or_else(|| parse_error(format!("missing record type for {}", name)))?;
        let rtype = DNSResourceType::from_mnemonic(&type_token.text)
            .ok_or_else(|| ZoneError::InvalidRRType(type_token.text.clone()))?;

        let class = class.unwrap_or(DNSResourceClass::IN);
        if class != DNSResourceClass::IN {
            return Err(ZoneError::UnsupportedClass(format!("{:?}", class)));
        }

        let ttl = match ttl {
            Some(ttl) => {
                self.last_ttl = Some(ttl);
                ttl
            }
            None => self
                .default_ttl
                .or(self.last_ttl)
                .unwrap_or(constants::DEFAULT_TTL),
        };

        self.last_owner = Some(name.clone());

        Ok(ZoneRecord {
            name,
            ttl,
            class,
            rtype,
            rdata: fields.map(|t| t.text.clone()).collect(),
            line: entry.line,
        })
    }
}

fn parse_class(token: &str) -> Option<DNSResourceClass> {
    match token.to_ascii_uppercase().as_str() {
        "IN" => Some(DNSResourceClass::IN),
        "CS" => Some(DNSResourceClass::CS),
        "CH" => Some(DNSResourceClass::CH),
        "HS" => Some(DNSResourceClass::HS),
        _ => None,
    }
}

/// Parse a TTL: plain seconds or BIND-style units (`1h30m`, `2w`)
pub fn parse_ttl(s: &str) -> Option<u32> {
    if let Ok(seconds) = s.parse::<u32>() {
        return Some(seconds);
    }
    if !s.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let mut total: u32 = 0;
    let mut current: Option<u32> = None;
    for c in s.chars() {
        if let Some(digit) = c.to_digit(10) {
            current = Some(current.unwrap_or(0).checked_mul(10)?.checked_add(digit)?);
            continue;
        }
        let multiplier = match c.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            'w' => 604800,
            _ => return None,
        };
        total = total.checked_add(current.take()?.checked_mul(multiplier)?)?;
    }
    // Trailing digits without a unit count as seconds
    if let Some(rest) = current {
        total = total.checked_add(rest)?;
    }
    Some(total)
}

/// Split the document into logical lines of fields
fn tokenize(contents: &str) -> Result<Vec<Entry>> {
    let chars: Vec<char> = contents.chars().collect();
    let mut entries = Vec::new();
    let mut current: Option<Entry> = None;
    let mut line = 1;
    let mut at_line_start = true;
    let mut leading_blank = false;
    let mut depth = 0usize;
    let mut paren_line = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                if depth == 0 {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    at_line_start = true;
                    leading_blank = false;
                }
                i += 1;
            }
            ';' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ' ' | '\t' | '\r' => {
                if at_line_start && depth == 0 {
                    leading_blank = true;
                }
                i += 1;
            }
            '(' => {
                if depth == 0 {
                    paren_line = line;
                }
                depth += 1;
                at_line_start = false;
                i += 1;
            }
            ')' => {
                if depth == 0 {
                    return Err(ZoneError::ParseError {
                        line,
                        message: "unbalanced ')'".to_string(),
                    });
                }
                depth -= 1;
                i += 1;
            }
            _ => {
                let start_line = line;
                let token = if c == '"' {
                    read_quoted(&chars, &mut i, &mut line)?
                } else {
                    read_bare(&chars, &mut i, line)?
                };
                let entry = current.get_or_insert_with(|| Entry {
                    line: start_line,
                    inherits_owner: leading_blank,
                    tokens: Vec::new(),
                });
                entry.tokens.push(token);
                at_line_start = false;
            }
        }
    }

    if depth > 0 {
        return Err(ZoneError::ParseError {
            line: paren_line,
            message: "unclosed parentheses".to_string(),
        });
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    Ok(entries)
}

fn read_quoted(chars: &[char], i: &mut usize, line: &mut usize) -> Result<Token> {
    let start_line = *line;
    let mut text = String::new();
    *i += 1;
    while *i < chars.len() {
        match chars[*i] {
            '"' => {
                *i += 1;
                return Ok(Token { text, quoted: true });
            }
            '\\' => text.push(read_escape(chars, i, *line)?),
            '\n' => {
                *line += 1;
                text.push('\n');
                *i += 1;
            }
            c => {
                text.push(c);
                *i += 1;
            }
        }
    }
    Err(ZoneError::ParseError {
        line: start_line,
        message: "unterminated quoted string".to_string(),
    })
}

fn read_bare(chars: &[char], i: &mut usize, line: usize) -> Result<Token> {
    let mut text = String::new();
    while *i < chars.len() {
        match chars[*i] {
            ' ' | '\t' | '\r' | '\n' | ';' | '(' | ')' | '"' => break,
            '\\' => text.push(read_escape(chars, i, line)?),
            c => {
                text.push(c);
                *i += 1;
            }
        }
    }
    Ok(Token {
        text,
        quoted: false,
    })
}

/// `\X` yields X, `\DDD` yields the byte with that decimal value (ASCII only)
fn read_escape(chars: &[char], i: &mut usize, line: usize) -> Result<char> {
    let escape_error = |message: &str| ZoneError::ParseError {
        line,
        message: message.to_string(),
    };

    let next = *chars
        .get(*i + 1)
        .ok_or_else(|| escape_error("dangling escape"))?;
    if next.is_ascii_digit() {
        let digits: String = chars
            .get(*i + 1..*i + 4)
            .ok_or_else(|| escape_error("short \\DDD escape"))?
            .iter()
            .collect();
        let value: u8 = digits
            .parse()
            .map_err(|_| escape_error("invalid \\DDD escape"))?;
        if !value.is_ascii() {
            return Err(escape_error("non-ASCII \\DDD escape"));
        }
        *i += 4;
        Ok(char::from(value))
    } else {
        *i += 2;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::LookupOutcome;

    fn origin() -> ZoneName {
        ZoneName::new("example.com.").unwrap()
    }

    const BASIC: &str = r#"
$ORIGIN example.com.
$TTL 1h
@   IN  SOA ns1 hostmaster (
            2024010101 ; serial
            7200 3600 1209600 300 )
    IN  NS  ns1
    IN  NS  ns2.example.net.
ns1     300 IN A 192.0.2.53
www     IN 600 A 192.0.2.1
        AAAA 2001:db8::1
txt     TXT "hello world" "with \"quotes\"" semi\;colon
"#;

    #[test]
    fn test_parse_basic_zone() {
        let zone = ZoneParser::new(&origin()).parse(BASIC).unwrap();
        assert_eq!(zone.origin().as_str(), "example.com.");
        assert_eq!(zone.record_count(), 7);

        let result = zone.lookup("www.example.com.", DNSResourceType::AAAA);
        assert_eq!(result.outcome, LookupOutcome::Success);
        // Blank owner continues www; without an explicit TTL $TTL applies
        assert_eq!(result.answer[0].ttl, 3600);

        let result = zone.lookup("txt.example.com.", DNSResourceType::TXT);
        assert_eq!(
            result.answer[0].parsed_rdata.as_deref(),
            Some(r#""hello world" "with \"quotes\"" "semi;colon""#)
        );
    }

    #[test]
    fn test_ttl_units() {
        assert_eq!(parse_ttl("3600"), Some(3600));
        assert_eq!(parse_ttl("1h30m"), Some(5400));
        assert_eq!(parse_ttl("1W"), Some(604800));
        assert_eq!(parse_ttl("2d1"), Some(172801));
        assert_eq!(parse_ttl("h"), None);
        assert_eq!(parse_ttl("10x"), None);
    }

    #[test]
    fn test_include_is_rejected() {
        let doc = format!("$INCLUDE /etc/passwd\n{}", BASIC);
        assert!(matches!(
            ZoneParser::new(&origin()).parse(&doc),
            Err(ZoneError::UnsupportedDirective(_))
        ));
    }

    #[test]
    fn test_out_of_zone_owner_is_rejected() {
        let doc = format!("{}\nwww.example.org. A 192.0.2.9\n", BASIC);
        assert!(matches!(
            ZoneParser::new(&origin()).parse(&doc),
            Err(ZoneError::OutOfZone { .. })
        ));
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let doc = "@ IN SOA ns1 hostmaster ( 1 2 3 4 5\n";
        assert!(matches!(
            ZoneParser::new(&origin()).parse(doc),
            Err(ZoneError::ParseError { line: 1, .. })
        ));
    }

    #[test]
    fn test_non_in_class_is_rejected() {
        let doc = format!("{}\nversion CH TXT \"1\"\n", BASIC);
        assert!(matches!(
            ZoneParser::new(&origin()).parse(&doc),
            Err(ZoneError::UnsupportedClass(_))
        ));
    }

    #[test]
    fn test_missing_soa() {
        let doc = "@ 300 IN NS ns1\nns1 300 IN A 192.0.2.53\n";
        assert!(matches!(
            ZoneParser::new(&origin()).parse(doc),
            Err(ZoneError::MissingSOA)
        ));
    }

    #[test]
    fn test_invalid_utf8_and_size_limit() {
        assert!(matches!(
            ZoneParser::new(&origin()).parse_bytes(&[0xff, 0xfe, b'\n']),
            Err(ZoneError::InvalidEncoding)
        ));
        let huge = vec![b';'; constants::MAX_ZONE_FILE_SIZE + 1];
        assert!(matches!(
            ZoneParser::new(&origin()).parse_bytes(&huge),
            Err(ZoneError::FileTooLarge)
        ));
    }

    #[test]
    fn test_modern_record_types_load() {
        let doc = format!(
            "{}\n\
             _443._tcp.www IN TLSA 3 1 1 ABCDEF\n\
             www2 IN HTTPS 1 . alpn=h2\n\
             svc IN SVCB 0 www\n\
             sip IN NAPTR 100 10 \"S\" \"SIP+D2U\" \"\" _sip._udp\n\
             host IN SSHFP 1 1 0123456789abcdef\n\
             old IN DNAME new.example.net.\n\
             geo IN LOC 52 22 23.000 N 4 53 32.000 E -2.00m 0.00m 10000m 10m\n\
             box IN HINFO PC Linux\n",
            BASIC
        );
        let zone = ZoneParser::new(&origin()).parse(&doc).unwrap();
        // HINFO has no encoder and is skipped
        assert_eq!(zone.record_count(), 7 + 7);

        let result = zone.lookup("_443._tcp.www.example.com.", DNSResourceType::TLSA);
        assert_eq!(result.outcome, LookupOutcome::Success);
        assert_eq!(result.answer[0].rdata, vec![3, 1, 1, 0xAB, 0xCD, 0xEF]);

        let result = zone.lookup("www2.example.com.", DNSResourceType::HTTPS);
        assert_eq!(result.answer[0].parsed_rdata.as_deref(), Some("1 . alpn=h2"));

        let result = zone.lookup("box.example.com.", DNSResourceType::Unknown(13));
        assert_eq!(result.outcome, LookupOutcome::NameError);
    }
}
