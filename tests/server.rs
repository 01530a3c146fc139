use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};

use zoned::protocol::types::*;
use zoned::server::{Event, Request, Response, Server, ServerOptions};
use zoned::zones::{Serial, Span};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[tokio::test]
async fn answers_a_query_over_udp() {
    let (_server, udp, _tcp) = serve_example_zone(answer_a_handler).await;

    let query = a_question(42, "foo.example.com");
    let response = udp_exchange(udp, &query).await;

    assert_eq!(42, response.header.id);
    assert!(response.header.is_response);
    assert!(response.header.is_authoritative);
    assert!(!response.header.recursion_available);
    assert!(response.header.recursion_desired);
    assert_eq!(Rcode::NoError, response.header.rcode);

    assert_eq!(1, response.answers.len());
    let rr = response.answers[0].rr().unwrap();
    assert_eq!(domain("foo.example.com"), rr.name);
    assert_eq!(RecordClass::IN, rr.rclass);
    assert_eq!(3600, rr.ttl);
    assert_eq!(
        RecordTypeWithData::A {
            address: Ipv4Addr::new(1, 2, 3, 4)
        },
        rr.rtype_with_data
    );
}

#[tokio::test]
async fn answers_apex_soa_query_from_the_registry() {
    let (_server, udp, _tcp) = serve_example_zone(answer_a_handler).await;

    let query = question_message(7, "example.com", RecordType::SOA);
    let response = udp_exchange(udp, &query).await;

    assert_eq!(1, response.answers.len());
    let rr = response.answers[0].rr().unwrap();
    assert_eq!(domain("example.com"), rr.name);
    assert_eq!(RecordType::SOA, rr.rtype_with_data.rtype());
}

#[tokio::test]
async fn fills_authority_when_the_answer_is_empty() {
    let (_server, udp, _tcp) = serve_example_zone(answer_a_handler).await;

    let query = question_message(7, "example.com", RecordType::MX);
    let response = udp_exchange(udp, &query).await;

    assert!(response.answers.is_empty());
    assert_eq!(1, response.authority.len());
    assert_eq!(
        RecordType::SOA,
        response.authority[0].rr().unwrap().rtype_with_data.rtype()
    );
}

#[tokio::test]
async fn out_of_zone_udp_queries_get_no_response() {
    let (_server, udp, _tcp) = serve_example_zone(end_only_handler).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let query = a_question(9, "other.org");
    socket
        .send_to(&query.to_octets().unwrap(), udp)
        .await
        .unwrap();

    let mut buf = [0u8; 512];
    let received = timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
    assert!(received.is_err(), "expected silence, got a datagram");
}

#[tokio::test]
async fn out_of_zone_tcp_queries_close_the_connection() {
    let (_server, _udp, tcp) = serve_example_zone(end_only_handler).await;

    let mut stream = TcpStream::connect(tcp).await.unwrap();
    write_framed(&mut stream, &a_question(9, "other.org")).await;

    let mut buf = [0u8; 512];
    let read = timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(0, read, "expected the connection to close without a payload");
}

#[tokio::test]
async fn opt_outside_additional_gets_formerr_without_the_handler() {
    let invoked = Arc::new(AtomicBool::new(false));
    let flag = invoked.clone();
    let (_server, udp, _tcp) = serve_example_zone(move |request: &Request, response: &mut Response| {
        flag.store(true, Ordering::SeqCst);
        answer_a_handler(request, response);
    })
    .await;

    let mut query = a_question(11, "foo.example.com");
    query.answers.push(Record::Pseudo(Edns::basic(4096)));

    let response = udp_exchange(udp, &query).await;

    assert_eq!(Rcode::FormatError, response.header.rcode);
    let edns = response.edns().expect("FORMERR response must carry an OPT");
    assert!(edns.udp_payload_size >= 512);
    assert!(!invoked.load(Ordering::SeqCst), "handler must not run");
}

#[tokio::test]
async fn unsupported_edns_version_gets_badvers_without_the_handler() {
    let invoked = Arc::new(AtomicBool::new(false));
    let flag = invoked.clone();
    let (_server, udp, _tcp) = serve_example_zone(move |request: &Request, response: &mut Response| {
        flag.store(true, Ordering::SeqCst);
        answer_a_handler(request, response);
    })
    .await;

    let mut query = a_question(12, "foo.example.com");
    let mut edns = Edns::basic(4096);
    edns.version = 1;
    query.additional.push(Record::Pseudo(edns));

    let octets = udp_exchange_raw(udp, &query).await;

    // extended rcode 16: low nibble clear, OPT extended-rcode octet 1
    assert_eq!(0, octets[3] & 0x0f);
    let response = Message::from_octets(&octets).unwrap();
    assert_eq!(Rcode::BadVersion, response.header.rcode);
    assert!(response.edns().is_some());
    assert!(!invoked.load(Ordering::SeqCst), "handler must not run");
}

#[tokio::test]
async fn tcp_queries_in_one_write_are_dispatched_in_order() {
    let (_server, _udp, tcp) = serve_example_zone(answer_a_handler).await;

    let first = a_question(1, "foo.example.com").to_octets().unwrap();
    let second = a_question(2, "bar.example.com").to_octets().unwrap();

    let mut combined = Vec::new();
    combined.extend_from_slice(&(first.len() as u16).to_be_bytes());
    combined.extend_from_slice(&first);
    combined.extend_from_slice(&(second.len() as u16).to_be_bytes());
    combined.extend_from_slice(&second);

    let mut stream = TcpStream::connect(tcp).await.unwrap();
    stream.write_all(&combined).await.unwrap();

    let responses = [
        read_framed(&mut stream).await,
        read_framed(&mut stream).await,
    ];

    assert_eq!(1, responses[0].header.id);
    assert_eq!(2, responses[1].header.id);
    assert_eq!(1, responses[0].answers.len());
    assert_eq!(1, responses[1].answers.len());
}

#[tokio::test]
async fn tcp_length_prefix_split_across_writes_still_parses() {
    let (_server, _udp, tcp) = serve_example_zone(answer_a_handler).await;

    let query = a_question(3, "foo.example.com").to_octets().unwrap();
    let length = (query.len() as u16).to_be_bytes();

    let mut stream = TcpStream::connect(tcp).await.unwrap();
    stream.write_all(&length[..1]).await.unwrap();
    stream.flush().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    stream.write_all(&length[1..]).await.unwrap();
    stream.write_all(&query).await.unwrap();

    let response = read_framed(&mut stream).await;
    assert_eq!(3, response.header.id);
    assert_eq!(1, response.answers.len());
}

#[tokio::test]
async fn emits_listening_and_a_single_close() {
    let mut server = Server::create(answer_a_handler, ServerOptions::default());
    let mut events = server.events().unwrap();
    server.listen(0, LOCALHOST).await.unwrap();

    match events.recv().await.unwrap() {
        Event::Listening { udp, tcp } => {
            assert_eq!(server.udp_addr().unwrap(), udp);
            assert_eq!(server.tcp_addr().unwrap(), tcp);
        }
        other => panic!("expected Listening, got {other:?}"),
    }

    server.close();
    server.close();

    assert!(matches!(events.recv().await, Some(Event::Close)));
    sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err(), "Close must be emitted once");
}

fn domain(name: &str) -> DomainName {
    DomainName::from_dotted_string(name).unwrap()
}

fn question_message(id: u16, name: &str, rtype: RecordType) -> Message {
    Message::from_question(
        id,
        Question {
            name: domain(name),
            qtype: QueryType::Record(rtype),
            qclass: QueryClass::Record(RecordClass::IN),
        },
    )
}

fn a_question(id: u16, name: &str) -> Message {
    let mut message = question_message(id, name, RecordType::A);
    message.header.recursion_desired = true;
    message
}

fn answer_a_handler(request: &Request, response: &mut Response) {
    let _ = request;
    response.end_address("1.2.3.4").unwrap();
}

fn end_only_handler(request: &Request, response: &mut Response) {
    let _ = request;
    response.end();
}

async fn serve_example_zone<H>(handler: H) -> (Server, SocketAddr, SocketAddr)
where
    H: Fn(&Request, &mut Response) + Send + Sync + 'static,
{
    let mut server = Server::create(handler, ServerOptions::default());
    server
        .zone(
            "example.com",
            "ns1.example.com",
            "hostmaster@example.com",
            Serial::Fixed(2024010101),
            Span(7200),
            Span(1800),
            Span(1209600),
            "1h".parse().unwrap(),
        )
        .unwrap();
    server.listen(0, LOCALHOST).await.unwrap();

    let udp = server.udp_addr().unwrap();
    let tcp = server.tcp_addr().unwrap();
    (server, udp, tcp)
}

async fn udp_exchange(server: SocketAddr, query: &Message) -> Message {
    Message::from_octets(&udp_exchange_raw(server, query).await).unwrap()
}

async fn udp_exchange_raw(server: SocketAddr, query: &Message) -> Vec<u8> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(&query.to_octets().unwrap(), server)
        .await
        .unwrap();

    let mut buf = [0u8; 512];
    let (size, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a response")
        .unwrap();
    buf[..size].to_vec()
}

async fn write_framed(stream: &mut TcpStream, message: &Message) {
    let octets = message.to_octets().unwrap();
    stream
        .write_all(&(octets.len() as u16).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&octets).await.unwrap();
}

async fn read_framed(stream: &mut TcpStream) -> Message {
    let length = timeout(Duration::from_secs(2), stream.read_u16())
        .await
        .expect("timed out waiting for a response")
        .unwrap();

    let mut buf = vec![0u8; length as usize];
    timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("timed out reading the response body")
        .unwrap();

    Message::from_octets(&buf).unwrap()
}
