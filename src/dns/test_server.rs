//! In-process DNS responder (UDP and TCP on one port) used by unit tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{CNAME, MX, NS, SOA, SRV};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

#[derive(Debug, Clone, Default)]
struct Entry {
    answers: Vec<RData>,
    authentic_data: bool,
    rcode: Option<ResponseCode>,
    truncate_udp: bool,
}

/// Canned answers keyed by (lowercase name without trailing dot, type).
#[derive(Debug, Clone, Default)]
pub(crate) struct Zone {
    entries: HashMap<(String, RecordType), Entry>,
    stray_datagram: bool,
}

fn key(name: &str, record_type: RecordType) -> (String, RecordType) {
    (
        name.trim_end_matches('.').to_ascii_lowercase(),
        record_type,
    )
}

pub(crate) fn name(s: &str) -> Name {
    Name::from_ascii(s).expect("valid test name")
}

impl Zone {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn answer(mut self, owner: &str, rdata: RData) -> Self {
        let record_type = rdata.record_type();
        // CNAMEs are served for A questions, like a recursive resolver does
        let record_type = if record_type == RecordType::CNAME {
            RecordType::A
        } else {
            record_type
        };
        self.entries
            .entry(key(owner, record_type))
            .or_default()
            .answers
            .push(rdata);
        self
    }

    pub(crate) fn srv(self, owner: &str, priority: u16, weight: u16, port: u16, target: &str) -> Self {
        self.answer(owner, RData::SRV(SRV::new(priority, weight, port, name(target))))
    }

    pub(crate) fn soa(self, owner: &str, mname: &str) -> Self {
        self.answer(
            owner,
            RData::SOA(SOA::new(
                name(mname),
                name("hostmaster.example.com."),
                1,
                3600,
                600,
                86400,
                300,
            )),
        )
    }

    pub(crate) fn ns(self, owner: &str, target: &str) -> Self {
        self.answer(owner, RData::NS(NS(name(target))))
    }

    pub(crate) fn cname(self, owner: &str, target: &str) -> Self {
        self.answer(owner, RData::CNAME(CNAME(name(target))))
    }

    pub(crate) fn mx(self, owner: &str, preference: u16, exchange: &str) -> Self {
        self.answer(owner, RData::MX(MX::new(preference, name(exchange))))
    }

    pub(crate) fn authentic(mut self, owner: &str, record_type: RecordType) -> Self {
        self.entries
            .entry(key(owner, record_type))
            .or_default()
            .authentic_data = true;
        self
    }

    pub(crate) fn rcode(mut self, owner: &str, record_type: RecordType, code: ResponseCode) -> Self {
        self.entries.entry(key(owner, record_type)).or_default().rcode = Some(code);
        self
    }

    /// Over UDP, answers this question with TC set and an empty answer section.
    pub(crate) fn truncated(mut self, owner: &str, record_type: RecordType) -> Self {
        self.entries
            .entry(key(owner, record_type))
            .or_default()
            .truncate_udp = true;
        self
    }

    /// Sends an undecodable datagram ahead of every UDP answer.
    pub(crate) fn stray_datagram(mut self) -> Self {
        self.stray_datagram = true;
        self
    }

    fn respond(&self, request: &Message, over_udp: bool) -> Message {
        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(request.recursion_desired())
            .set_recursion_available(true);

        if let Some(query) = request.queries().first() {
            response.add_query(query.clone());
            let owner = query.name().to_ascii();
            if let Some(entry) = self.entries.get(&key(&owner, query.query_type())) {
                response.set_authentic_data(entry.authentic_data);
                response.set_response_code(entry.rcode.unwrap_or(ResponseCode::NoError));
                if over_udp && entry.truncate_udp {
                    response.set_truncated(true);
                    return response;
                }
                for rdata in &entry.answers {
                    response.add_answer(Record::from_rdata(query.name().clone(), 300, rdata.clone()));
                }
            }
        }
        response
    }

    /// Serves the zone on an ephemeral localhost port until the runtime stops.
    pub(crate) async fn spawn(self) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind udp");
        let addr = socket.local_addr().expect("local addr");
        let listener = TcpListener::bind(addr).await.expect("bind tcp");
        let zone = Arc::new(self);

        let udp_zone = Arc::clone(&zone);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(request) = Message::from_vec(&buf[..len]) else {
                    continue;
                };
                if udp_zone.stray_datagram {
                    let _ = socket.send_to(&[0xde, 0xad], peer).await;
                }
                let bytes = udp_zone
                    .respond(&request, true)
                    .to_vec()
                    .expect("encode response");
                let _ = socket.send_to(&bytes, peer).await;
            }
        });

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_tcp(Arc::clone(&zone), stream));
            }
        });
        addr
    }
}

/// Answers length-prefixed queries on one TCP connection until it closes.
async fn serve_tcp(zone: Arc<Zone>, mut stream: TcpStream) {
    loop {
        let Ok(len) = stream.read_u16().await else {
            return;
        };
        let mut buf = vec![0u8; usize::from(len)];
        if stream.read_exact(&mut buf).await.is_err() {
            return;
        }
        let Ok(request) = Message::from_vec(&buf) else {
            return;
        };
        let bytes = zone.respond(&request, false).to_vec().expect("encode response");
        let mut framed = (bytes.len() as u16).to_be_bytes().to_vec();
        framed.extend_from_slice(&bytes);
        if stream.write_all(&framed).await.is_err() {
            return;
        }
    }
}
