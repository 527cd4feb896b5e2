//! DNS message exchange with one recursive resolver.
//!
//! Questions go out over UDP through `hickory-client`; a truncated answer is
//! asked again over TCP.

use std::net::SocketAddr;
use std::pin::pin;
use std::time::Duration;

use futures::StreamExt;
use hickory_client::client::AsyncClient;
use hickory_client::tcp::TcpClientStream;
use hickory_client::udp::UdpClientStream;
use hickory_proto::error::{ProtoError, ProtoErrorKind};
use hickory_proto::iocompat::AsyncIoTokioAsStd;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::xfer::{DnsHandle, DnsRequest, DnsRequestOptions};
use tokio::net::{TcpStream, UdpSocket};

use crate::config::EDNS_PAYLOAD_SIZE;
use crate::error_handling::DnsError;

/// Stub client that sends single questions to one recursive resolver.
///
/// The caller builds each query message itself, so the DO bit goes out as
/// requested and the `AD` flag of every answer stays visible.
#[derive(Debug, Clone, Copy)]
pub struct DnsClient {
    server: SocketAddr,
}

impl DnsClient {
    /// Creates a client for the resolver at `server`.
    pub fn new(server: SocketAddr) -> Self {
        Self { server }
    }

    /// Resolver this client talks to.
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Sends one question and waits up to `timeout_secs` for the complete answer.
    ///
    /// With `dnssec_ok` the query carries an EDNS(0) OPT record advertising a
    /// 4096-byte payload with the DO bit set. An answer with the TC flag is
    /// fetched again over TCP within the same deadline.
    pub async fn query(
        &self,
        name: &str,
        record_type: RecordType,
        dnssec_ok: bool,
        timeout_secs: u64,
    ) -> Result<Message, DnsError> {
        let request = build_query(name, record_type, dnssec_ok)?;
        let timeout = Duration::from_secs(timeout_secs);

        let exchange = async {
            let response = self.exchange_udp(request.clone(), timeout).await?;
            if !response.truncated() {
                return Ok(response);
            }
            log::debug!("Truncated {record_type} answer for {name}, retrying over TCP");
            self.exchange_tcp(request, timeout).await
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| DnsError::Timeout(timeout_secs))?
            .map_err(|e| transport_error(e, timeout_secs))
    }

    async fn exchange_udp(&self, request: Message, timeout: Duration) -> Result<Message, ProtoError> {
        let stream = UdpClientStream::<UdpSocket>::with_timeout(self.server, timeout);
        let (client, background) = AsyncClient::connect(stream).await?;
        let background = tokio::spawn(background);
        let response = first_response(client, request).await;
        background.abort();
        response
    }

    async fn exchange_tcp(&self, request: Message, timeout: Duration) -> Result<Message, ProtoError> {
        let (stream, sender) =
            TcpClientStream::<AsyncIoTokioAsStd<TcpStream>>::with_timeout(self.server, timeout);
        let (client, background) = AsyncClient::new(stream, sender, None).await?;
        let background = tokio::spawn(background);
        let response = first_response(client, request).await;
        background.abort();
        response
    }
}

async fn first_response(mut client: AsyncClient, request: Message) -> Result<Message, ProtoError> {
    let request = DnsRequest::new(request, DnsRequestOptions::default());
    let mut responses = pin!(<AsyncClient as DnsHandle>::send(&mut client, request));
    match responses.next().await {
        Some(response) => Ok(response?.into_message()),
        None => Err(ProtoError::from("resolver closed the exchange without an answer")),
    }
}

fn transport_error(error: ProtoError, timeout_secs: u64) -> DnsError {
    match error.kind() {
        ProtoErrorKind::Timeout => DnsError::Timeout(timeout_secs),
        _ => DnsError::Proto(error),
    }
}

/// Builds a recursive query for `name`, which may omit the trailing dot.
pub(crate) fn build_query(
    name: &str,
    record_type: RecordType,
    dnssec_ok: bool,
) -> Result<Message, DnsError> {
    let fqdn = format!("{}.", name.trim_end_matches('.'));
    let name = Name::from_ascii(&fqdn)?;

    let mut msg = Message::new();
    msg.set_id(rand::random::<u16>())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    msg.add_query(Query::query(name, record_type));

    if dnssec_ok {
        let mut edns = Edns::new();
        edns.set_max_payload(EDNS_PAYLOAD_SIZE);
        edns.set_dnssec_ok(true);
        msg.set_edns(edns);
    }
    Ok(msg)
}

/// Fails unless the answer carries `NOERROR`.
pub(crate) fn ensure_success(response: &Message) -> Result<(), DnsError> {
    let code = response.response_code();
    if code == ResponseCode::NoError {
        Ok(())
    } else {
        Err(DnsError::Rcode(u16::from(code)))
    }
}
