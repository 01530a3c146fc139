//! An authoritative DNS server façade over the wire codec: UDP and
//! TCP listeners, a user-supplied handler, and the authority
//! conveniences (SOA answers, default TTLs) applied when a response
//! is finalised.

pub mod net;

use std::cmp;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Mutex};

use crate::protocol::types::*;
use crate::protocol::{deserialise, serialise};
use crate::server::net::{read_tcp_bytes, send_tcp_bytes};
use crate::zones::{mailbox_to_domain, Serial, Soa, Span, Zone, Zones};

/// The largest response a UDP datagram can carry.
pub const MAX_UDP_RESPONSE: usize = 512;

/// The largest response a length-prefixed TCP frame can carry.
pub const MAX_TCP_RESPONSE: usize = 65535;

/// A query handler: inspects the request and fills in the response.
/// The response is transmitted after the handler returns, if the
/// handler ended it.
pub type Handler = Arc<dyn Fn(&Request, &mut Response) + Send + Sync>;

/// Configuration for a server.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServerOptions {
    /// TTL applied to response records which do not specify one, when
    /// no zone SOA covers the question.
    pub ttl: u32,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { ttl: 3600 }
    }
}

/// Lifecycle events, delivered on the channel `Server::events` hands
/// out.  Queries go to the handler, not here.
#[derive(Debug)]
pub enum Event {
    /// Both sockets are bound and serving.
    Listening { udp: SocketAddr, tcp: SocketAddr },

    /// The server has closed.  Emitted exactly once.
    Close,

    /// A non-fatal error: a query that could not be decoded, a
    /// response that could not be sent.
    Error(ServerError),
}

/// Errors surfaced on the event channel.  None of these terminate the
/// server.
#[derive(Debug)]
pub enum ServerError {
    Decode(deserialise::Error),
    Encode(serialise::Error),
    ResponseTooLarge { length: usize, limit: usize },
    Io(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ServerError::Decode(error) => write!(f, "could not decode query: {error}"),
            ServerError::Encode(error) => write!(f, "could not encode response: {error}"),
            ServerError::ResponseTooLarge { length, limit } => {
                write!(f, "response of {length} octets exceeds the {limit} octet limit")
            }
            ServerError::Io(error) => write!(f, "socket error: {error}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Decode(error) => Some(error),
            ServerError::Encode(error) => Some(error),
            ServerError::ResponseTooLarge { .. } => None,
            ServerError::Io(error) => Some(error),
        }
    }
}

/// Errors from `Server::zone`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ZoneError {
    /// A name with a label outside `[^.\s]{1,63}`.
    InvalidName(String),
}

impl std::fmt::Display for ZoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ZoneError::InvalidName(name) => write!(f, "invalid domain name: {name:?}"),
        }
    }
}

impl std::error::Error for ZoneError {}

/// Which transport a query arrived over.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Tcp => write!(f, "tcp"),
        }
    }
}

/// The transport a request arrived on and a reply can be sent over.
/// Shared by the request and response handed to a handler.
#[derive(Clone)]
pub struct ServerSocket {
    transport: Transport,
    peer: SocketAddr,
    sink: ReplySink,
}

#[derive(Clone)]
enum ReplySink {
    Udp(Arc<UdpSocket>),
    Tcp(Arc<Mutex<OwnedWriteHalf>>),
}

impl ServerSocket {
    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn remote_address(&self) -> IpAddr {
        self.peer.ip()
    }

    pub fn remote_port(&self) -> u16 {
        self.peer.port()
    }

    /// Send a serialised message back to the peer, applying the
    /// transport's framing and size limit.
    ///
    /// # Errors
    ///
    /// If the message is too large for the transport, or the socket
    /// fails.
    pub async fn send(&self, octets: &[u8]) -> Result<(), ServerError> {
        match &self.sink {
            ReplySink::Udp(socket) => {
                if octets.len() > MAX_UDP_RESPONSE {
                    return Err(ServerError::ResponseTooLarge {
                        length: octets.len(),
                        limit: MAX_UDP_RESPONSE,
                    });
                }
                socket
                    .send_to(octets, self.peer)
                    .await
                    .map_err(ServerError::Io)?;
                Ok(())
            }
            ReplySink::Tcp(writer) => {
                if octets.len() > MAX_TCP_RESPONSE {
                    return Err(ServerError::ResponseTooLarge {
                        length: octets.len(),
                        limit: MAX_TCP_RESPONSE,
                    });
                }
                let mut writer = writer.lock().await;
                send_tcp_bytes(&mut writer, octets)
                    .await
                    .map_err(ServerError::Io)
            }
        }
    }
}

impl std::fmt::Debug for ServerSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSocket")
            .field("transport", &self.transport)
            .field("peer", &self.peer)
            .finish()
    }
}

/// A decoded query, as given to the handler.
#[derive(Debug)]
pub struct Request {
    pub message: Message,
    pub socket: ServerSocket,
}

/// A response record under construction.  Class and TTL may be left
/// unset, in which case finalisation fills them in (class `IN`, TTL
/// from the zone SOA or the server options).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResponseRecord {
    pub name: DomainName,
    pub rclass: Option<RecordClass>,
    pub ttl: Option<u32>,
    pub rdata: RecordTypeWithData,
}

impl ResponseRecord {
    /// # Errors
    ///
    /// If the name is not a well-formed domain name.
    pub fn new(name: &str, rdata: RecordTypeWithData) -> Result<Self, ZoneError> {
        let name = DomainName::from_dotted_string(name)
            .ok_or_else(|| ZoneError::InvalidName(name.to_string()))?;
        Ok(Self {
            name,
            rclass: None,
            ttl: None,
            rdata,
        })
    }

    fn materialise(self, min_ttl: u32) -> ResourceRecord {
        ResourceRecord {
            name: self.name,
            rtype_with_data: self.rdata,
            rclass: self.rclass.unwrap_or(RecordClass::IN),
            ttl: self.ttl.unwrap_or(min_ttl),
        }
    }
}

impl From<ResourceRecord> for ResponseRecord {
    fn from(rr: ResourceRecord) -> Self {
        Self {
            name: rr.name,
            rclass: Some(rr.rclass),
            ttl: Some(rr.ttl),
            rdata: rr.rtype_with_data,
        }
    }
}

/// The response under construction for one query.  The handler may
/// push records into the sections directly, or use one of the `end`
/// variants; nothing is transmitted until the response is ended.
#[derive(Debug)]
pub struct Response {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResponseRecord>,
    pub authority: Vec<ResponseRecord>,
    pub additional: Vec<ResponseRecord>,
    /// An OPT record to attach to the additional section, exempt from
    /// the TTL and class defaulting.
    pub edns: Option<Edns>,
    pub socket: ServerSocket,
    ended: bool,
}

impl Response {
    fn new(query: &Message, socket: ServerSocket) -> Self {
        let response = query.make_response();
        Self {
            header: response.header,
            questions: response.questions,
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
            socket,
            ended: false,
        }
    }

    /// Finish the response as it stands.
    pub fn end(&mut self) {
        self.ended = true;
    }

    /// Append records to the answer section, then finish.
    pub fn end_with(&mut self, records: Vec<ResponseRecord>) {
        self.answers.extend(records);
        self.end();
    }

    /// Answer a plain `IN A` question with the given dotted-quad
    /// address, then finish.  The record is only pushed when the sole
    /// question is `IN A` and nothing has been answered yet.
    ///
    /// # Errors
    ///
    /// If the string is not an IPv4 address.
    pub fn end_address(&mut self, address: &str) -> Result<(), std::net::AddrParseError> {
        let address: Ipv4Addr = address.parse()?;

        if let [question] = &self.questions[..] {
            if question.qtype == QueryType::Record(RecordType::A)
                && question.qclass == QueryClass::Record(RecordClass::IN)
                && self.answers.is_empty()
            {
                self.answers.push(ResponseRecord {
                    name: question.name.clone(),
                    rclass: Some(RecordClass::IN),
                    ttl: None,
                    rdata: RecordTypeWithData::A { address },
                });
            }
        }

        self.end();
        Ok(())
    }

    /// Adopt a whole message as the response over the same
    /// connection, then finish.  The usual finalisation still
    /// applies.
    pub fn end_message(&mut self, message: Message) {
        self.header = message.header;
        self.questions = message.questions;
        self.answers = section_to_records(message.answers, &mut self.edns);
        self.authority = section_to_records(message.authority, &mut self.edns);
        self.additional = section_to_records(message.additional, &mut self.edns);
        self.end();
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Apply the authority conveniences and produce the message to
    /// transmit, or `None` when there is nothing worth saying: a
    /// response with no answers and no authority records is
    /// suppressed entirely.
    fn finalise(mut self, zones: &Zones, options: &ServerOptions) -> Option<Message> {
        self.header.is_response = true;
        self.header.is_authoritative = true;
        self.header.recursion_available = false;

        let mut zone_minimum = None;
        for question in &self.questions {
            if let Some(zone) = zones.get(&question.name) {
                if zone_minimum.is_none() {
                    zone_minimum = Some(zone.soa().minimum);
                }

                // a SOA question for the apex itself is answered from
                // the registry
                if question.qtype == QueryType::Record(RecordType::SOA)
                    && question.qclass == QueryClass::Record(RecordClass::IN)
                    && question.name == *zone.apex()
                    && self.answers.is_empty()
                {
                    self.answers.push(zone.soa_record().into());
                }

                // an empty answer for a name we are authoritative for
                // gets the SOA in the authority section
                if self.answers.is_empty() && self.authority.is_empty() {
                    self.authority.push(zone.soa_record().into());
                }
            }
        }

        if self.answers.is_empty() && self.authority.is_empty() {
            return None;
        }

        let min_ttl = cmp::max(1, zone_minimum.unwrap_or(options.ttl));

        let mut additional: Vec<Record> = self
            .additional
            .into_iter()
            .map(|record| Record::Standard(record.materialise(min_ttl)))
            .collect();
        if let Some(edns) = self.edns {
            additional.push(Record::Pseudo(edns));
        }

        Some(Message {
            header: self.header,
            questions: self.questions,
            answers: self
                .answers
                .into_iter()
                .map(|record| Record::Standard(record.materialise(min_ttl)))
                .collect(),
            authority: self
                .authority
                .into_iter()
                .map(|record| Record::Standard(record.materialise(min_ttl)))
                .collect(),
            additional,
        })
    }
}

fn section_to_records(section: Vec<Record>, edns: &mut Option<Edns>) -> Vec<ResponseRecord> {
    let mut records = Vec::with_capacity(section.len());
    for record in section {
        match record {
            Record::Standard(rr) => records.push(rr.into()),
            Record::Pseudo(e) => *edns = Some(e),
        }
    }
    records
}

/// An authoritative DNS server serving one handler over UDP and TCP.
///
/// Construction, `zone`, and `listen` are the configuration phase;
/// once listening, the zone registry and options are frozen into the
/// listener tasks.
pub struct Server {
    handler: Handler,
    options: ServerOptions,
    zones: Zones,
    events_tx: UnboundedSender<Event>,
    events_rx: Option<UnboundedReceiver<Event>>,
    shared: Option<Arc<Shared>>,
    udp_addr: Option<SocketAddr>,
    tcp_addr: Option<SocketAddr>,
}

impl Server {
    /// Create a server which dispatches every query to the given
    /// handler.
    pub fn create<H>(handler: H, options: ServerOptions) -> Self
    where
        H: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            handler: Arc::new(handler),
            options,
            zones: Zones::new(),
            events_tx,
            events_rx: Some(events_rx),
            shared: None,
            udp_addr: None,
            tcp_addr: None,
        }
    }

    /// Register a zone: its apex, primary name server, responsible
    /// mailbox (`user@domain` form accepted), serial, and timers.
    ///
    /// # Errors
    ///
    /// If any of the names cannot be parsed.
    #[allow(clippy::too_many_arguments)]
    pub fn zone(
        &mut self,
        name: &str,
        mname: &str,
        rname: &str,
        serial: Serial,
        refresh: Span,
        retry: Span,
        expire: Span,
        minimum: Span,
    ) -> Result<&mut Self, ZoneError> {
        let apex = DomainName::from_dotted_string(name)
            .ok_or_else(|| ZoneError::InvalidName(name.to_string()))?;
        let mname = DomainName::from_dotted_string(mname)
            .ok_or_else(|| ZoneError::InvalidName(mname.to_string()))?;
        let rname =
            mailbox_to_domain(rname).ok_or_else(|| ZoneError::InvalidName(rname.to_string()))?;

        self.zones.insert(Zone::new(
            apex,
            Soa {
                mname,
                rname,
                serial: serial.resolve(),
                refresh: refresh.0,
                retry: retry.0,
                expire: expire.0,
                minimum: minimum.0,
            },
        ));

        Ok(self)
    }

    /// Bind the UDP socket and the TCP listener (same port) and start
    /// serving.  Emits `Event::Listening` once both are ready.  Pass
    /// port 0 to bind an ephemeral port.
    ///
    /// # Errors
    ///
    /// If either socket cannot be bound.
    pub async fn listen(&mut self, port: u16, address: IpAddr) -> io::Result<&mut Self> {
        let udp = UdpSocket::bind((address, port)).await?;
        let udp_addr = udp.local_addr()?;
        let tcp = TcpListener::bind((address, udp_addr.port())).await?;
        let tcp_addr = tcp.local_addr()?;

        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            handler: self.handler.clone(),
            options: self.options.clone(),
            zones: self.zones.clone(),
            events: self.events_tx.clone(),
            shutdown,
            closing: AtomicBool::new(false),
        });

        tokio::spawn(listen_udp_task(shared.clone(), udp));
        tokio::spawn(listen_tcp_task(shared.clone(), tcp));

        self.shared = Some(shared.clone());
        self.udp_addr = Some(udp_addr);
        self.tcp_addr = Some(tcp_addr);

        tracing::info!(%udp_addr, %tcp_addr, "listening");
        shared.emit(Event::Listening {
            udp: udp_addr,
            tcp: tcp_addr,
        });

        Ok(self)
    }

    /// Stop serving and release both sockets.  Idempotent: only the
    /// first call emits `Event::Close`.
    pub fn close(&self) {
        if let Some(shared) = &self.shared {
            shared.close();
        }
    }

    /// Take the event channel.  Yields `None` after the first call.
    pub fn events(&mut self) -> Option<UnboundedReceiver<Event>> {
        self.events_rx.take()
    }

    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }
}

/// State shared between the listener tasks and `Server::close`.
struct Shared {
    handler: Handler,
    options: ServerOptions,
    zones: Zones,
    events: UnboundedSender<Event>,
    shutdown: watch::Sender<bool>,
    closing: AtomicBool,
}

impl Shared {
    fn emit(&self, event: Event) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    fn close(&self) {
        if !self.closing.swap(true, Ordering::SeqCst) {
            self.emit(Event::Close);
            // send_replace updates the value even when no task has
            // subscribed yet
            self.shutdown.send_replace(true);
        }
    }
}

async fn listen_udp_task(shared: Arc<Shared>, socket: UdpSocket) {
    let socket = Arc::new(socket);
    let mut shutdown = shared.shutdown.subscribe();
    let mut buf = vec![0u8; MAX_UDP_RESPONSE];

    loop {
        // close() may have fired before this task subscribed
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((size, peer)) => {
                    tracing::debug!(?peer, "UDP request");
                    let server_socket = ServerSocket {
                        transport: Transport::Udp,
                        peer,
                        sink: ReplySink::Udp(socket.clone()),
                    };
                    // datagrams are dispatched in arrival order
                    dispatch(&shared, &buf[..size], server_socket).await;
                }
                Err(error) => {
                    tracing::debug!(?error, "UDP receive error");
                    shared.emit(Event::Error(ServerError::Io(error)));
                }
            }
        }
    }
}

async fn listen_tcp_task(shared: Arc<Shared>, listener: TcpListener) {
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(?peer, "TCP connection");
                    tokio::spawn(handle_tcp_connection(shared.clone(), stream, peer));
                }
                Err(error) => {
                    tracing::debug!(?error, "TCP accept error");
                    shared.emit(Event::Error(ServerError::Io(error)));
                }
            }
        }
    }
}

/// Serve one TCP connection: length-prefixed messages are dispatched
/// in stream order until the peer closes, an error occurs, or a
/// response is suppressed.
async fn handle_tcp_connection(shared: Arc<Shared>, stream: TcpStream, peer: SocketAddr) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let read = tokio::select! {
            _ = shutdown.changed() => break,
            read = read_tcp_bytes(&mut reader) => read,
        };

        match read {
            Ok(Some(bytes)) => {
                let server_socket = ServerSocket {
                    transport: Transport::Tcp,
                    peer,
                    sink: ReplySink::Tcp(writer.clone()),
                };
                if !dispatch(&shared, bytes.as_ref(), server_socket).await {
                    // nothing was (or will be) transmitted: close the
                    // connection without a payload
                    break;
                }
            }
            Ok(None) => break,
            Err(error) => {
                tracing::debug!(?peer, ?error, "TCP read error");
                break;
            }
        }
    }
}

/// Decode, gate, dispatch, and answer one query.  Returns whether a
/// response was transmitted.
async fn dispatch(shared: &Arc<Shared>, octets: &[u8], socket: ServerSocket) -> bool {
    let message = match Message::from_octets(octets) {
        Ok(message) => message,
        Err(error) => {
            tracing::debug!(%error, "could not decode query");
            shared.emit(Event::Error(ServerError::Decode(error)));
            if let Some(id) = error.id() {
                return send_message(shared, &Message::make_format_error_response(id), &socket)
                    .await;
            }
            return false;
        }
    };

    tracing::debug!(message = ?message, "got message");

    if message.header.is_response {
        return send_message(
            shared,
            &Message::make_format_error_response(message.header.id),
            &socket,
        )
        .await;
    }

    if message.header.opcode != Opcode::Standard {
        let mut response = message.make_response();
        if response.header.opcode.is_reserved() {
            response.header.opcode = Opcode::Standard;
        }
        response.header.rcode = Rcode::NotImplemented;
        return send_message(shared, &response, &socket).await;
    }

    // the EDNS gate runs before the handler sees the query
    match message.validate_edns() {
        Err(violation) => {
            tracing::debug!(%violation, "malformed EDNS query");
            let response = edns_error_response(&message, Rcode::FormatError);
            return send_message(shared, &response, &socket).await;
        }
        Ok(Some(edns)) if edns.version > 0 => {
            tracing::debug!(version = %edns.version, "unsupported EDNS version");
            let response = edns_error_response(&message, Rcode::BadVersion);
            return send_message(shared, &response, &socket).await;
        }
        Ok(_) => (),
    }

    let request = Request {
        message,
        socket: socket.clone(),
    };
    let mut response = Response::new(&request.message, socket);
    (shared.handler)(&request, &mut response);

    if !response.is_ended() {
        return false;
    }

    match response.finalise(&shared.zones, &shared.options) {
        Some(message) => send_message(shared, &message, &request.socket).await,
        None => false,
    }
}

/// Build the response to an EDNS violation: the given rcode, plus an
/// OPT record echoing the requester's UDP size, clamped to at least
/// 512.
fn edns_error_response(message: &Message, rcode: Rcode) -> Message {
    let udp_size = message
        .answers
        .iter()
        .chain(message.authority.iter())
        .chain(message.additional.iter())
        .find_map(Record::edns)
        .map_or(512, |edns| edns.udp_payload_size);

    let mut response = message.make_response();
    response.header.rcode = rcode;
    response
        .additional
        .push(Record::Pseudo(Edns::basic(cmp::max(udp_size, 512))));
    response
}

async fn send_message(shared: &Arc<Shared>, message: &Message, socket: &ServerSocket) -> bool {
    match message.to_octets() {
        Ok(octets) => match socket.send(&octets).await {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(%error, "could not send response");
                shared.emit(Event::Error(error));
                false
            }
        },
        Err(error) => {
            tracing::warn!(?message, %error, "could not serialise message");
            shared.emit(Event::Error(ServerError::Encode(error)));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    async fn test_response(query: Message) -> Response {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = socket.local_addr().unwrap();
        let server_socket = ServerSocket {
            transport: Transport::Udp,
            peer,
            sink: ReplySink::Udp(Arc::new(socket)),
        };
        Response::new(&query, server_socket)
    }

    fn example_zones() -> Zones {
        let mut zones = Zones::new();
        zones.insert(Zone::new(
            domain("example.com"),
            Soa {
                mname: domain("ns1.example.com"),
                rname: domain("hostmaster.example.com"),
                serial: 20240101,
                refresh: 7200,
                retry: 1800,
                expire: 1209600,
                minimum: 600,
            },
        ));
        zones
    }

    #[tokio::test]
    async fn finalise_answers_apex_soa_question() {
        let query = Message::from_question(1, question("example.com", RecordType::SOA));
        let mut response = test_response(query).await;
        response.end();

        let message = response
            .finalise(&example_zones(), &ServerOptions::default())
            .unwrap();

        assert_eq!(1, message.answers.len());
        assert_eq!(
            RecordType::SOA,
            message.answers[0].rr().unwrap().rtype_with_data.rtype()
        );
        assert!(message.header.is_authoritative);
        assert!(!message.header.recursion_available);
    }

    #[tokio::test]
    async fn finalise_fills_authority_for_empty_answers() {
        let query = Message::from_question(1, question("example.com", RecordType::MX));
        let mut response = test_response(query).await;
        response.end();

        let message = response
            .finalise(&example_zones(), &ServerOptions::default())
            .unwrap();

        assert!(message.answers.is_empty());
        assert_eq!(1, message.authority.len());
        assert_eq!(
            RecordType::SOA,
            message.authority[0].rr().unwrap().rtype_with_data.rtype()
        );
    }

    #[tokio::test]
    async fn finalise_suppresses_out_of_zone_responses() {
        let query = Message::from_question(1, question("other.org", RecordType::A));
        let mut response = test_response(query).await;
        response.end();

        assert!(response
            .finalise(&example_zones(), &ServerOptions::default())
            .is_none());
    }

    #[tokio::test]
    async fn finalise_defaults_ttl_from_options() {
        let query = Message::from_question(1, question("other.org", RecordType::A));
        let mut response = test_response(query).await;
        response
            .answers
            .push(ResponseRecord::new("other.org", RecordTypeWithData::A { address: "1.2.3.4".parse().unwrap() }).unwrap());
        response.end();

        let message = response
            .finalise(&Zones::new(), &ServerOptions::default())
            .unwrap();

        assert_eq!(3600, message.answers[0].rr().unwrap().ttl);
        assert_eq!(RecordClass::IN, message.answers[0].rr().unwrap().rclass);
    }

    #[tokio::test]
    async fn finalise_defaults_ttl_from_zone_soa() {
        let query = Message::from_question(1, question("foo.example.com", RecordType::A));
        let mut response = test_response(query).await;
        response
            .answers
            .push(ResponseRecord::new("foo.example.com", RecordTypeWithData::A { address: "1.2.3.4".parse().unwrap() }).unwrap());
        response.end();

        let message = response
            .finalise(&example_zones(), &ServerOptions::default())
            .unwrap();

        assert_eq!(600, message.answers[0].rr().unwrap().ttl);
    }

    #[tokio::test]
    async fn finalise_keeps_explicit_ttl() {
        let query = Message::from_question(1, question("foo.example.com", RecordType::A));
        let mut response = test_response(query).await;
        let mut record = ResponseRecord::new(
            "foo.example.com",
            RecordTypeWithData::A { address: "1.2.3.4".parse().unwrap() },
        )
        .unwrap();
        record.ttl = Some(30);
        response.answers.push(record);
        response.end();

        let message = response
            .finalise(&example_zones(), &ServerOptions::default())
            .unwrap();

        assert_eq!(30, message.answers[0].rr().unwrap().ttl);
    }

    #[tokio::test]
    async fn end_address_answers_sole_a_question() {
        let query = Message::from_question(1, question("foo.example.com", RecordType::A));
        let mut response = test_response(query).await;
        response.end_address("1.2.3.4").unwrap();

        assert!(response.is_ended());
        assert_eq!(1, response.answers.len());
        assert_eq!(
            RecordTypeWithData::A {
                address: "1.2.3.4".parse().unwrap()
            },
            response.answers[0].rdata
        );
    }

    #[tokio::test]
    async fn end_address_ignores_non_a_questions() {
        let query = Message::from_question(1, question("foo.example.com", RecordType::TXT));
        let mut response = test_response(query).await;
        response.end_address("1.2.3.4").unwrap();

        assert!(response.is_ended());
        assert!(response.answers.is_empty());
    }
}
