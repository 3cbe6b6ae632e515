//! End-to-end tests against a server bound on an ephemeral port.

use hazelfast::config::{BufferAllocation, ClientConfig, Config, Protocol, WaitStrategy};
use hazelfast::{Client, Error, Server};
use rstest::rstest;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

fn server_config(protocol: Protocol, workers: usize) -> Config {
    Config {
        listen: "127.0.0.1:0".to_string(),
        workers,
        protocol,
        ..Config::default()
    }
}

fn connect(server: &Server) -> Client {
    Client::connect(&ClientConfig::new(server.local_addr().to_string())).unwrap()
}

/// Raw socket with a read timeout, for sending malformed input.
fn raw(server: &Server) -> TcpStream {
    let stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// Read until EOF, returning how many bytes arrived first.
fn read_to_close(stream: &mut TcpStream) -> usize {
    let mut buf = Vec::new();
    match stream.read_to_end(&mut buf) {
        Ok(_) => buf.len(),
        // A reset also counts as closed.
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => buf.len(),
        Err(e) => panic!("connection was not closed: {e}"),
    }
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(4095)]
#[case(4096)]
#[case(1024 * 1024)]
fn test_echo_round_trip(#[case] len: usize) {
    let server = Server::start(&server_config(Protocol::Echo, 2)).unwrap();
    let mut client = connect(&server);

    let payload: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
    client.send(&payload).unwrap();
    assert_eq!(client.receive().unwrap(), &payload[..]);

    server.shutdown();
}

#[rstest]
#[case(BufferAllocation::Direct, true)]
#[case(BufferAllocation::Heap, true)]
#[case(BufferAllocation::Heap, false)]
fn test_echo_buffer_modes(#[case] allocation: BufferAllocation, #[case] pooling: bool) {
    let mut config = server_config(Protocol::Echo, 1);
    config.buffers.allocation = allocation;
    config.buffers.pooling = pooling;
    let server = Server::start(&config).unwrap();

    let mut client_config = ClientConfig::new(server.local_addr().to_string());
    client_config.buffers.allocation = allocation;
    client_config.buffers.pooling = pooling;
    let mut client = Client::connect(&client_config).unwrap();

    for i in 0..50u8 {
        let payload = vec![i; 100 + i as usize * 10];
        client.send(&payload).unwrap();
        assert_eq!(client.receive().unwrap(), &payload[..]);
    }
}

#[test]
fn test_pipelined_echo_keeps_order() {
    let server = Server::start(&server_config(Protocol::Echo, 2)).unwrap();
    let mut client = connect(&server);

    for i in 0..200u32 {
        client.write(&i.to_be_bytes()).unwrap();
    }
    client.flush().unwrap();
    for i in 0..200u32 {
        assert_eq!(client.receive().unwrap(), i.to_be_bytes());
    }
}

#[test]
fn test_client_reuses_reply_buffer() {
    let server = Server::start(&server_config(Protocol::Echo, 1)).unwrap();
    let mut client = connect(&server);

    client.send(&[1u8; 500]).unwrap();
    client.receive().unwrap();
    client.send(&[2u8; 500]).unwrap();
    client.receive().unwrap();
    let warm = client.allocations();

    for _ in 0..100 {
        client.send(&[3u8; 500]).unwrap();
        assert_eq!(client.receive().unwrap(), &[3u8; 500][..]);
    }
    assert_eq!(client.allocations(), warm);
}

#[test]
fn test_counter_sequence() {
    let server = Server::start(&server_config(Protocol::Structures, 1)).unwrap();
    let mut client = connect(&server);
    let mut counters = client.counters();

    counters.set(1, 10).unwrap();
    assert_eq!(counters.increment(1, 5).unwrap(), 15);
    assert_eq!(counters.get(1).unwrap(), 15);
    assert!(counters.cas(1, 15, 20).unwrap());
    assert!(!counters.cas(1, 15, 30).unwrap());
    assert_eq!(counters.get(1).unwrap(), 20);
    assert_eq!(counters.get(99).unwrap(), 0);
}

#[test]
fn test_stores_are_shared_within_a_worker() {
    let server = Server::start(&server_config(Protocol::Structures, 1)).unwrap();
    let mut first = connect(&server);
    let mut second = connect(&server);

    first.counters().set(7, 70).unwrap();
    assert_eq!(second.counters().get(7).unwrap(), 70);

    first.strings().set("greeting", "hello").unwrap();
    assert_eq!(second.strings().get("greeting").unwrap().as_deref(), Some("hello"));
}

#[test]
fn test_string_store() {
    let server = Server::start(&server_config(Protocol::Structures, 2)).unwrap();
    let mut client = connect(&server);
    let mut strings = client.strings();

    assert_eq!(strings.get("missing").unwrap(), None);
    strings.set("key", "value").unwrap();
    strings.set("key", "überwritten").unwrap();
    assert_eq!(strings.get("key").unwrap().as_deref(), Some("überwritten"));
    strings.set("", "").unwrap();
    assert_eq!(strings.get("").unwrap().as_deref(), Some(""));
}

#[test]
fn test_ping() {
    let server = Server::start(&server_config(Protocol::Structures, 2)).unwrap();
    let mut client = connect(&server);
    for _ in 0..10 {
        client.ping().unwrap();
    }
}

#[rstest]
#[case((-1i32).to_be_bytes())]
#[case((16 * 1024 * 1024 + 1u32).to_be_bytes())]
fn test_bad_length_closes_without_reply(#[case] prefix: [u8; 4]) {
    let server = Server::start(&server_config(Protocol::Echo, 1)).unwrap();
    let mut stream = raw(&server);
    let mut wire = prefix.to_vec();
    wire.extend_from_slice(b"trailing");
    stream.write_all(&wire).unwrap();
    assert_eq!(read_to_close(&mut stream), 0);
}

#[test]
fn test_unknown_structure_closes_without_reply() {
    let server = Server::start(&server_config(Protocol::Structures, 1)).unwrap();
    let mut stream = raw(&server);
    stream.write_all(&[0, 0, 0, 2, 9, 1]).unwrap();
    assert_eq!(read_to_close(&mut stream), 0);

    // The worker keeps serving other connections.
    let mut client = connect(&server);
    client.ping().unwrap();
}

#[test]
fn test_protocol_error_surfaces_as_closed() {
    let server = Server::start(&server_config(Protocol::Structures, 1)).unwrap();
    let mut client = connect(&server);
    client.send(&[1, 99]).unwrap();
    assert!(matches!(client.receive(), Err(Error::Closed) | Err(Error::Io(_))));
}

#[test]
fn test_split_frame_over_many_writes() {
    let server = Server::start(&server_config(Protocol::Echo, 1)).unwrap();
    let mut stream = raw(&server);
    stream.set_nodelay(true).unwrap();

    let payload = b"assembled from pieces";
    let mut wire = (payload.len() as u32).to_be_bytes().to_vec();
    wire.extend_from_slice(payload);
    for byte in &wire {
        stream.write_all(&[*byte]).unwrap();
        thread::sleep(Duration::from_millis(1));
    }

    let mut reply = vec![0u8; wire.len()];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(reply, wire);
}

#[rstest]
#[case(WaitStrategy::Block)]
#[case(WaitStrategy::BusyPoll)]
fn test_concurrent_clients_get_their_own_replies(#[case] wait: WaitStrategy) {
    const CONNECTIONS: usize = 8;
    const ROUND_TRIPS: usize = 200;

    let mut config = server_config(Protocol::Echo, 3);
    config.wait = wait;
    let server = Server::start(&config).unwrap();
    let address = server.local_addr().to_string();

    thread::scope(|scope| {
        for conn in 0..CONNECTIONS {
            let address = address.clone();
            scope.spawn(move || {
                let mut client = Client::connect(&ClientConfig::new(address)).unwrap();
                for round in 0..ROUND_TRIPS {
                    let payload = format!("conn-{conn}-round-{round}");
                    client.send(payload.as_bytes()).unwrap();
                    assert_eq!(client.receive().unwrap(), payload.as_bytes());
                }
                let stats = client.stats();
                assert_eq!(stats.frames_in, ROUND_TRIPS as u64);
                assert_eq!(stats.frames_out, ROUND_TRIPS as u64);
            });
        }
    });

    server.shutdown();
}

#[test]
fn test_shutdown_closes_connections() {
    let server = Server::start(&server_config(Protocol::Echo, 2)).unwrap();
    let mut client = connect(&server);
    client.send(b"before").unwrap();
    assert_eq!(client.receive().unwrap(), b"before");

    server.shutdown();
    assert!(client.receive().is_err());
}
