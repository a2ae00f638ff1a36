use crate::dns::DNSPacket;
use crate::dns::enums::ResponseCode;
use crate::fallthrough::FallthroughPolicy;
use crate::zone::name::longest_match;
use crate::zone::{LookupOutcome, ZoneName, ZoneSnapshotStore};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What to do with a query after consulting the local zones
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Answer with this response
    Local(DNSPacket),
    /// Not ours to answer; hand the query to the next handler
    Forward,
}

impl Resolution {
    pub fn is_local(&self) -> bool {
        matches!(self, Resolution::Local(_))
    }
}

/// Answers queries from the zone snapshots
pub struct QueryResolver {
    zones: Vec<ZoneName>,
    store: Arc<ZoneSnapshotStore>,
    fallthrough: FallthroughPolicy,
}

impl QueryResolver {
    pub fn new(
        zones: Vec<ZoneName>,
        store: Arc<ZoneSnapshotStore>,
        fallthrough: FallthroughPolicy,
    ) -> Self {
        Self {
            zones,
            store,
            fallthrough,
        }
    }

    /// True when `qname` falls inside one of the configured zones
    pub fn is_in_bailiwick(&self, qname: &str) -> bool {
        longest_match(&self.zones, qname).is_some()
    }

    pub fn resolve(&self, query: &DNSPacket) -> Resolution {
        let Some(question) = query.questions.first() else {
            return Resolution::Local(DNSPacket::error_response(query, ResponseCode::FormatError));
        };
        let qname = question.name();

        let Some(zone) = longest_match(&self.zones, &qname) else {
            trace!("{} is outside the configured zones", qname);
            return Resolution::Forward;
        };

        let Some(result) = self
            .store
            .with_zone(zone, |z| z.lookup(&qname, question.qtype))
        else {
            warn!("Zone {} has not been loaded yet; failing query for {}", zone, qname);
            return Resolution::Local(DNSPacket::error_response(
                query,
                ResponseCode::ServerFailure,
            ));
        };

        debug!(
            "{} {} in zone {}: {:?} ({} answers)",
            qname,
            question.qtype,
            zone,
            result.outcome,
            result.answer.len()
        );

        if result.answer.is_empty()
            && !matches!(
                result.outcome,
                LookupOutcome::NoData | LookupOutcome::ServerFailure
            )
            && self.fallthrough.covers(&qname)
        {
            trace!("Falling through for {}", qname);
            return Resolution::Forward;
        }

        let mut response = DNSPacket::reply_to(query);
        response.header.aa = true;
        let rcode = match result.outcome {
            LookupOutcome::Success | LookupOutcome::NoData => ResponseCode::NoError,
            LookupOutcome::NameError => ResponseCode::NameError,
            LookupOutcome::Delegation => {
                response.header.aa = false;
                ResponseCode::NoError
            }
            LookupOutcome::ServerFailure => {
                return Resolution::Local(DNSPacket::error_response(
                    query,
                    ResponseCode::ServerFailure,
                ));
            }
        };
        response.header.rcode = rcode.to_u8();
        response.answers = result.answer;
        response.authorities = result.authority;
        response.resources = result.additional;

        Resolution::Local(response)
    }
}
