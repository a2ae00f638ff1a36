use super::name::{ZoneName, is_subdomain_of, normalize_name, parent_name};
use super::{Result, ZoneError, ZoneRecord};
use crate::dns::enums::DNSResourceType;
use crate::dns::resource::DNSResource;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Longest CNAME chain followed inside one zone
const MAX_CNAME_CHAIN: usize = 8;

/// Outcome of a single-zone lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Success,
    NoData,
    NameError,
    Delegation,
    ServerFailure,
}

/// Sections produced by [`Zone::lookup`]
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    pub answer: Vec<DNSResource>,
    pub authority: Vec<DNSResource>,
    pub additional: Vec<DNSResource>,
    pub outcome: LookupOutcome,
}

impl LookupResult {
    fn new() -> Self {
        Self {
            answer: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            outcome: LookupOutcome::Success,
        }
    }
}

/// RRsets owned by one name, in zone-file order
#[derive(Debug, Default)]
struct Node {
    rrsets: Vec<(DNSResourceType, Vec<DNSResource>)>,
}

impl Node {
    fn get(&self, rtype: DNSResourceType) -> Option<&[DNSResource]> {
        self.rrsets
            .iter()
            .find(|(t, _)| *t == rtype)
            .map(|(_, records)| records.as_slice())
    }

    fn insert(&mut self, record: DNSResource) {
        match self.rrsets.iter_mut().find(|(t, _)| *t == record.rtype) {
            Some((_, records)) => {
                if !records.iter().any(|r| r.rdata == record.rdata) {
                    records.push(record);
                }
            }
            None => self.rrsets.push((record.rtype, vec![record])),
        }
    }

    fn all(&self) -> impl Iterator<Item = &DNSResource> {
        self.rrsets.iter().flat_map(|(_, records)| records.iter())
    }
}

/// A compiled, immutable zone ready for lookups
#[derive(Debug)]
pub struct Zone {
    origin: ZoneName,
    soa: DNSResource,
    serial: u32,
    /// SOA minimum field, caps the negative-answer TTL
    minimum: u32,
    nodes: HashMap<String, Node>,
    /// Owner names plus every empty non-terminal between them and the apex
    names: HashSet<String>,
    /// Names below the apex that own NS records
    cuts: HashSet<String>,
    record_count: usize,
}

impl Zone {
    /// Compile parsed records, enforcing zone-level invariants
    pub fn build(origin: ZoneName, records: Vec<ZoneRecord>) -> Result<Self> {
        let apex = origin.as_str().to_string();
        let mut nodes: HashMap<String, Node> = HashMap::new();
        let mut soa = None;

        for record in records {
            if !origin.contains(&record.name) {
                return Err(ZoneError::OutOfZone {
                    name: record.name,
                    zone: apex,
                });
            }
            if !record.is_encodable() {
                warn!(
                    "Skipping {} record for {} on line {}: type has no zone-file encoding",
                    record.rtype, record.name, record.line
                );
                continue;
            }
            let resource = record.to_dns_resource(&apex)?;
            if record.rtype == DNSResourceType::SOA {
                if record.name != apex {
                    return Err(ZoneError::ValidationError(format!(
                        "SOA record at {} is not at the zone apex",
                        record.name
                    )));
                }
                if soa.is_some() {
                    return Err(ZoneError::DuplicateSOA);
                }
                soa = Some(resource.clone());
            }
            nodes.entry(record.name).or_default().insert(resource);
        }

        let soa = soa.ok_or(ZoneError::MissingSOA)?;
        let has_apex_ns = nodes
            .get(&apex)
            .and_then(|node| node.get(DNSResourceType::NS))
            .is_some();
        if !has_apex_ns {
            return Err(ZoneError::MissingNS);
        }

        for (name, node) in &nodes {
            if node.get(DNSResourceType::CNAME).is_some() && node.rrsets.len() > 1 {
                return Err(ZoneError::ValidationError(format!(
                    "{} has a CNAME alongside other data",
                    name
                )));
            }
        }

        let (serial, minimum) = soa_counters(&soa);

        let mut names = HashSet::new();
        for owner in nodes.keys() {
            let mut current = Some(owner.clone());
            while let Some(name) = current {
                if !is_subdomain_of(&name, &apex) || !names.insert(name.clone()) {
                    break;
                }
                current = parent_name(&name);
            }
        }

        let cuts = nodes
            .iter()
            .filter(|(name, node)| **name != apex && node.get(DNSResourceType::NS).is_some())
            .map(|(name, _)| name.clone())
            .collect();

        let record_count = nodes
            .values()
            .map(|node| node.rrsets.iter().map(|(_, r)| r.len()).sum::<usize>())
            .sum();

        Ok(Self {
            origin,
            soa,
            serial,
            minimum,
            nodes,
            names,
            cuts,
            record_count,
        })
    }

    pub fn origin(&self) -> &ZoneName {
        &self.origin
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Answer `qname`/`qtype` from this zone's data alone
    pub fn lookup(&self, qname: &str, qtype: DNSResourceType) -> LookupResult {
        let qname = normalize_name(qname);
        let mut result = LookupResult::new();
        if !self.origin.contains(&qname) {
            result.outcome = LookupOutcome::ServerFailure;
            return result;
        }

        let mut visited = HashSet::new();
        let mut name = qname;
        loop {
            if !visited.insert(name.clone()) || visited.len() > MAX_CNAME_CHAIN + 1 {
                result.outcome = LookupOutcome::ServerFailure;
                return result;
            }
            match self.lookup_step(&name, qtype, &mut result) {
                Some(target) if self.origin.contains(&target) => name = target,
                // Chain leaves the zone; the client resolves the rest
                Some(_) => {
                    result.outcome = LookupOutcome::Success;
                    break;
                }
                None => break,
            }
        }

        if matches!(result.outcome, LookupOutcome::Success) {
            self.add_apex_authority(&mut result);
        }
        self.add_additional(&mut result);
        result
    }

    /// Resolve one name; returns the CNAME target when the chain continues
    fn lookup_step(
        &self,
        name: &str,
        qtype: DNSResourceType,
        result: &mut LookupResult,
    ) -> Option<String> {
        if let Some(cut) = self.find_cut(name, qtype) {
            if let Some(ns) = self.nodes.get(&cut).and_then(|n| n.get(DNSResourceType::NS)) {
                result.authority.extend_from_slice(ns);
            }
            result.outcome = LookupOutcome::Delegation;
            return None;
        }

        if let Some(node) = self.nodes.get(name) {
            return self.answer_from_node(node, name, qtype, result);
        }

        if self.names.contains(name) {
            self.negative(result, LookupOutcome::NoData);
            return None;
        }

        if let Some(node) = self.find_wildcard(name) {
            return self.answer_from_node(node, name, qtype, result);
        }

        self.negative(result, LookupOutcome::NameError);
        None
    }

    fn answer_from_node(
        &self,
        node: &Node,
        name: &str,
        qtype: DNSResourceType,
        result: &mut LookupResult,
    ) -> Option<String> {
        let owned_by = |record: &DNSResource| synthesize(record, name);

        if qtype == DNSResourceType::ANY {
            result.answer.extend(node.all().map(owned_by));
            result.outcome = LookupOutcome::Success;
            return None;
        }

        if let Some(records) = node.get(qtype) {
            result.answer.extend(records.iter().map(owned_by));
            result.outcome = LookupOutcome::Success;
            return None;
        }

        if let Some(cname) = node.get(DNSResourceType::CNAME) {
            let record = owned_by(&cname[0]);
            let target = record.target_name().map(str::to_string);
            result.answer.push(record);
            result.outcome = LookupOutcome::Success;
            return target;
        }

        self.negative(result, LookupOutcome::NoData);
        None
    }

    /// Closest-to-apex delegation point at or above `name`
    fn find_cut(&self, name: &str, qtype: DNSResourceType) -> Option<String> {
        if self.cuts.is_empty() {
            return None;
        }
        let apex_labels = self.origin.label_count();
        let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();
        let below_apex = labels.len().saturating_sub(apex_labels);

        for depth in 1..=below_apex {
            let candidate = format!("{}.", labels[below_apex - depth..].join("."));
            if self.cuts.contains(&candidate) {
                // DS lives on the parent side of the cut
                if candidate == name && qtype == DNSResourceType::DS {
                    return None;
                }
                return Some(candidate);
            }
        }
        None
    }

    /// Wildcard node covering `name`, found via the closest encloser
    fn find_wildcard(&self, name: &str) -> Option<&Node> {
        let mut encloser = parent_name(name);
        while let Some(candidate) = encloser {
            if !self.origin.contains(&candidate) {
                return None;
            }
            if self.names.contains(&candidate) {
                let wildcard = if candidate == "." {
                    "*.".to_string()
                } else {
                    format!("*.{}", candidate)
                };
                return self.nodes.get(&wildcard);
            }
            encloser = parent_name(&candidate);
        }
        None
    }

    fn negative(&self, result: &mut LookupResult, outcome: LookupOutcome) {
        let mut soa = self.soa.clone();
        soa.ttl = soa.ttl.min(self.minimum);
        result.authority.push(soa);
        result.outcome = outcome;
    }

    fn add_apex_authority(&self, result: &mut LookupResult) {
        let apex = self.origin.as_str();
        let answered_apex_ns = result
            .answer
            .iter()
            .any(|r| r.rtype == DNSResourceType::NS && r.owner() == apex);
        if answered_apex_ns {
            return;
        }
        if let Some(ns) = self.nodes.get(apex).and_then(|n| n.get(DNSResourceType::NS)) {
            result.authority.extend_from_slice(ns);
        }
    }

    /// In-zone addresses for NS/MX/SRV targets (glue for delegations)
    fn add_additional(&self, result: &mut LookupResult) {
        let source: &[DNSResource] = if result.outcome == LookupOutcome::Delegation {
            &result.authority
        } else {
            &result.answer
        };

        let mut targets: Vec<String> = Vec::new();
        for record in source {
            if matches!(
                record.rtype,
                DNSResourceType::NS | DNSResourceType::MX | DNSResourceType::SRV
            ) {
                if let Some(target) = record.target_name() {
                    if !targets.iter().any(|t| t == target) {
                        targets.push(target.to_string());
                    }
                }
            }
        }

        for target in targets {
            let Some(node) = self.nodes.get(&target) else {
                continue;
            };
            for rtype in [DNSResourceType::A, DNSResourceType::AAAA] {
                for record in node.get(rtype).unwrap_or_default() {
                    if !result.answer.contains(record) && !result.additional.contains(record) {
                        result.additional.push(record.clone());
                    }
                }
            }
        }
    }
}

/// Copy of `record` owned by `name` (identity for non-wildcard matches)
fn synthesize(record: &DNSResource, name: &str) -> DNSResource {
    let mut record = record.clone();
    if record.owner() != name {
        record.labels = crate::dns::common::fqdn_to_labels(name);
    }
    record
}

/// (serial, minimum) from SOA RDATA
fn soa_counters(soa: &DNSResource) -> (u32, u32) {
    let fields: Vec<u32> = soa
        .parsed_rdata
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .skip(2)
        .filter_map(|f| f.parse().ok())
        .collect();
    match fields.as_slice() {
        [serial, _, _, _, minimum] => (*serial, *minimum),
        _ => (0, soa.ttl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneParser;

    const ZONE: &str = r#"
$ORIGIN example.com.
$TTL 3600
@           IN SOA  ns1 hostmaster 2024010101 7200 3600 1209600 300
@           IN NS   ns1
@           IN NS   ns2
@           IN MX   10 mail
ns1         IN A    192.0.2.53
ns2         IN A    192.0.2.54
mail        IN A    192.0.2.25
www         IN A    192.0.2.1
www         IN AAAA 2001:db8::1
alias       IN CNAME www
chain1      IN CNAME chain2
chain2      IN CNAME alias
external    IN CNAME www.example.net.
loop1       IN CNAME loop2
loop2       IN CNAME loop1
a.b.c       IN A    192.0.2.99
*.wild      IN A    192.0.2.77
sub         IN NS   ns.sub
sub         IN DS   12345 8 2 ABCDEF01
ns.sub      IN A    192.0.2.200
"#;

    fn zone() -> Zone {
        ZoneParser::new(&ZoneName::new("example.com.").unwrap())
            .parse(ZONE)
            .unwrap()
    }

    #[test]
    fn test_exact_match() {
        let result = zone().lookup("WWW.example.com", DNSResourceType::A);
        assert_eq!(result.outcome, LookupOutcome::Success);
        assert_eq!(result.answer.len(), 1);
        assert_eq!(result.answer[0].rdata, vec![192, 0, 2, 1]);
        assert_eq!(result.authority.len(), 2);
        assert!(result.authority.iter().all(|r| r.rtype == DNSResourceType::NS));
        // ns1/ns2 addresses are not added for a plain A answer
        assert!(result.additional.is_empty());
    }

    #[test]
    fn test_mx_gets_additional_addresses() {
        let result = zone().lookup("example.com.", DNSResourceType::MX);
        assert_eq!(result.outcome, LookupOutcome::Success);
        assert_eq!(result.additional.len(), 1);
        assert_eq!(result.additional[0].owner(), "mail.example.com.");
    }

    #[test]
    fn test_nodata_carries_soa() {
        let result = zone().lookup("mail.example.com.", DNSResourceType::AAAA);
        assert_eq!(result.outcome, LookupOutcome::NoData);
        assert!(result.answer.is_empty());
        assert_eq!(result.authority.len(), 1);
        assert_eq!(result.authority[0].rtype, DNSResourceType::SOA);
        assert_eq!(result.authority[0].ttl, 300);
    }

    #[test]
    fn test_empty_non_terminal_is_nodata() {
        let result = zone().lookup("b.c.example.com.", DNSResourceType::A);
        assert_eq!(result.outcome, LookupOutcome::NoData);
    }

    #[test]
    fn test_name_error() {
        let result = zone().lookup("missing.example.com.", DNSResourceType::A);
        assert_eq!(result.outcome, LookupOutcome::NameError);
        assert!(result.answer.is_empty());
        assert_eq!(result.authority[0].rtype, DNSResourceType::SOA);
    }

    #[test]
    fn test_cname_chain_is_followed() {
        let result = zone().lookup("chain1.example.com.", DNSResourceType::A);
        assert_eq!(result.outcome, LookupOutcome::Success);
        let types: Vec<_> = result.answer.iter().map(|r| r.rtype).collect();
        assert_eq!(
            types,
            vec![
                DNSResourceType::CNAME,
                DNSResourceType::CNAME,
                DNSResourceType::CNAME,
                DNSResourceType::A
            ]
        );
        assert_eq!(result.answer[3].owner(), "www.example.com.");
    }

    #[test]
    fn test_cname_query_is_not_chased() {
        let result = zone().lookup("alias.example.com.", DNSResourceType::CNAME);
        assert_eq!(result.outcome, LookupOutcome::Success);
        assert_eq!(result.answer.len(), 1);
    }

    #[test]
    fn test_cname_leaving_zone() {
        let result = zone().lookup("external.example.com.", DNSResourceType::A);
        assert_eq!(result.outcome, LookupOutcome::Success);
        assert_eq!(result.answer.len(), 1);
        assert_eq!(result.answer[0].target_name(), Some("www.example.net."));
    }

    #[test]
    fn test_cname_loop_is_server_failure() {
        let result = zone().lookup("loop1.example.com.", DNSResourceType::A);
        assert_eq!(result.outcome, LookupOutcome::ServerFailure);
    }

    #[test]
    fn test_wildcard_synthesis() {
        let result = zone().lookup("anything.wild.example.com.", DNSResourceType::A);
        assert_eq!(result.outcome, LookupOutcome::Success);
        assert_eq!(result.answer[0].owner(), "anything.wild.example.com.");
        assert_eq!(result.answer[0].rdata, vec![192, 0, 2, 77]);

        let result = zone().lookup("anything.wild.example.com.", DNSResourceType::MX);
        assert_eq!(result.outcome, LookupOutcome::NoData);
    }

    #[test]
    fn test_delegation_returns_referral_with_glue() {
        let result = zone().lookup("host.sub.example.com.", DNSResourceType::A);
        assert_eq!(result.outcome, LookupOutcome::Delegation);
        assert!(result.answer.is_empty());
        assert_eq!(result.authority.len(), 1);
        assert_eq!(result.authority[0].owner(), "sub.example.com.");
        assert_eq!(result.additional.len(), 1);
        assert_eq!(result.additional[0].owner(), "ns.sub.example.com.");
    }

    #[test]
    fn test_ds_at_cut_is_answered_from_parent() {
        let result = zone().lookup("sub.example.com.", DNSResourceType::DS);
        assert_eq!(result.outcome, LookupOutcome::Success);
        assert_eq!(result.answer[0].rtype, DNSResourceType::DS);
    }

    #[test]
    fn test_soa_counters() {
        let zone = zone();
        assert_eq!(zone.serial(), 2024010101);
        assert_eq!(zone.record_count(), 20);
    }

    #[test]
    fn test_cname_with_other_data_is_rejected() {
        let doc = format!("{}\nalias IN A 192.0.2.3\n", ZONE);
        let err = ZoneParser::new(&ZoneName::new("example.com.").unwrap())
            .parse(&doc)
            .unwrap_err();
        assert!(matches!(err, ZoneError::ValidationError(_)));
    }
}
