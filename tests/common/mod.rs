//! Common test utilities shared by the integration tests

#![allow(dead_code)] // Each test binary uses a different subset

use async_trait::async_trait;
use parking_lot::Mutex;
use scwdns::dns::{
    DNSPacket,
    enums::{DNSResourceClass, DNSResourceType},
    header::DNSHeader,
    question::DNSQuestion,
};
use scwdns::handler::Handler;
use scwdns::provider::{ProviderError, ZoneProvider};
use scwdns::zone::{Zone, ZoneName, ZoneParser};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Create a basic test DNS query packet
pub fn create_test_query(domain: &str, qtype: DNSResourceType) -> DNSPacket {
    create_test_query_with_id(1234, domain, qtype)
}

/// Create a test DNS query packet with specific ID
pub fn create_test_query_with_id(id: u16, domain: &str, qtype: DNSResourceType) -> DNSPacket {
    let labels: Vec<String> = domain
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    DNSPacket {
        header: DNSHeader {
            id,
            rd: true,
            qdcount: 1,
            ..Default::default()
        },
        questions: vec![DNSQuestion {
            labels,
            qtype,
            qclass: DNSResourceClass::IN,
        }],
        ..Default::default()
    }
}

pub fn zone_name(name: &str) -> ZoneName {
    ZoneName::new(name).unwrap()
}

/// Minimal valid zone with an A record for `www`
pub fn zone_document(origin: &str, serial: u32, www: &str) -> String {
    format!(
        "$ORIGIN {origin}\n\
         $TTL 300\n\
         @       IN SOA  ns1 hostmaster {serial} 7200 3600 1209600 60\n\
         @       IN NS   ns1\n\
         ns1     IN A    192.0.2.53\n\
         www     IN A    {www}\n\
         mail    IN A    192.0.2.25\n\
         @       IN MX   10 mail\n\
         alias   IN CNAME www\n\
         sub     IN NS   ns.sub\n\
         ns.sub  IN A    192.0.2.200\n"
    )
}

pub fn compile(origin: &str, document: &str) -> Zone {
    ZoneParser::new(&zone_name(origin)).parse(document).unwrap()
}

/// Scripted in-memory zone provider
#[derive(Default)]
pub struct StaticProvider {
    documents: Mutex<HashMap<ZoneName, Result<Vec<u8>, ProviderError>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, zone: &str, document: impl Into<Vec<u8>>) {
        self.documents
            .lock()
            .insert(zone_name(zone), Ok(document.into()));
    }

    pub fn fail(&self, zone: &str, error: ProviderError) {
        self.documents.lock().insert(zone_name(zone), Err(error));
    }

    /// Delay every export by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ZoneProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn export_zone(&self, zone: &ZoneName) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.documents
            .lock()
            .get(zone)
            .cloned()
            .unwrap_or_else(|| {
                Err(ProviderError::Status {
                    status: 404,
                    body: format!("zone {} not found", zone),
                })
            })
    }
}

/// Next handler that answers everything with a fixed rcode and counts calls
pub struct RecordingHandler {
    pub rcode: u8,
    pub calls: AtomicUsize,
}

impl RecordingHandler {
    pub fn new(rcode: u8) -> Self {
        Self {
            rcode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn serve(&self, query: &DNSPacket) -> DNSPacket {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut response = DNSPacket::reply_to(query);
        response.header.rcode = self.rcode;
        response.header.ra = true;
        response
    }
}
