//! Session integration tests
//!
//! These tests run client and server sessions against each other over
//! loopback TCP, and against a raw peer speaking frames directly:
//! - Request/response exchange and stream lifecycle
//! - Many concurrent streams with priorities and flow control toggled
//! - Flow-control splitting of large bodies
//! - Server push, ping, reset and shutdown
//! - Connection errors seen from the wire

use bytes::Bytes;
use crossbeam_channel::Receiver;
use h2mux::h2::frames::{ContinuationFrame, Frame, SettingsFrame};
use h2mux::h2::stream::StreamId;
use h2mux::h2::{
    Error, ErrorCode, FrameCodec, HeaderField, Session, SessionBuilder, SessionEvent,
    SessionOptions, Settings, CONNECTION_PREFACE, MAX_FRAME_PAYLOAD,
};
use h2mux::transport::TcpTransport;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connected client and server sessions
fn pair(client_options: SessionOptions, server_options: SessionOptions) -> (Session, Session) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let accept = thread::spawn(move || {
        let transport = TcpTransport::accept(&listener).unwrap();
        Session::server(transport, server_options).unwrap()
    });
    let transport = TcpTransport::connect(addr, TIMEOUT).unwrap();
    let client = Session::client(transport, client_options).unwrap();
    let server = accept.join().unwrap();
    (client, server)
}

fn next_event(events: &Receiver<SessionEvent>) -> SessionEvent {
    events
        .recv_timeout(TIMEOUT)
        .expect("timed out waiting for a session event")
}

/// Skip events until one matches
fn wait_for<F>(events: &Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    loop {
        let event = next_event(events);
        if pred(&event) {
            return event;
        }
    }
}

fn get(path: &str) -> Vec<HeaderField> {
    vec![
        HeaderField::new(":method", "GET"),
        HeaderField::new(":scheme", "http"),
        HeaderField::new(":path", path),
        HeaderField::new(":host", "localhost"),
    ]
}

/// Answer every complete request with a 200 and `body`
fn serve(server: Session, body: Vec<u8>) -> thread::JoinHandle<Session> {
    thread::spawn(move || {
        let events = server.events();
        for event in events.iter() {
            let finished = match event {
                SessionEvent::Headers {
                    stream_id,
                    end_stream: true,
                    ..
                }
                | SessionEvent::Data {
                    stream_id,
                    end_stream: true,
                    ..
                } => Some(stream_id),
                SessionEvent::Disposed { .. } => break,
                _ => None,
            };
            if let Some(stream_id) = finished {
                server
                    .send_headers(stream_id, vec![HeaderField::new(":status", "200")], false)
                    .unwrap();
                server.send_data(stream_id, body.clone(), true).unwrap();
            }
        }
        server
    })
}

#[test]
fn test_get_request_over_loopback() {
    let (client, server) = pair(SessionOptions::default(), SessionOptions::default());
    let client_events = client.events();
    let server_events = server.events();

    let id = client.send_request(get("/index.html"), false).unwrap();
    assert_eq!(id, 1);
    client.send_data(id, Bytes::from_static(b"request body"), true).unwrap();

    // server side: Idle -> Open on headers, HalfClosedRemote on END_STREAM
    match wait_for(&server_events, |e| matches!(e, SessionEvent::Headers { .. })) {
        SessionEvent::Headers {
            stream_id,
            headers,
            end_stream,
            ..
        } => {
            assert_eq!(stream_id, 1);
            assert!(!end_stream);
            assert_eq!(headers, get("/index.html"));
        }
        other => panic!("unexpected {:?}", other),
    }
    match wait_for(&server_events, |e| matches!(e, SessionEvent::Data { .. })) {
        SessionEvent::Data {
            data, end_stream, ..
        } => {
            assert_eq!(&data[..], b"request body");
            assert!(end_stream);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(server.active_stream_count(), 1);

    server
        .send_headers(
            1,
            vec![
                HeaderField::new(":status", "200"),
                HeaderField::new("content-type", "text/html"),
            ],
            false,
        )
        .unwrap();
    server.send_data(1, Bytes::from_static(b"<html></html>"), true).unwrap();
    // HalfClosedRemote -> Closed once the final DATA is queued
    assert_eq!(
        wait_for(&server_events, |e| matches!(e, SessionEvent::StreamClosed { .. })),
        SessionEvent::StreamClosed { stream_id: 1 }
    );
    assert_eq!(server.active_stream_count(), 0);

    let mut body = Vec::new();
    loop {
        match next_event(&client_events) {
            SessionEvent::Headers { headers, .. } => {
                assert_eq!(headers[0], HeaderField::new(":status", "200"));
            }
            SessionEvent::Data { data, .. } => body.extend_from_slice(&data),
            SessionEvent::StreamClosed { stream_id } => {
                assert_eq!(stream_id, 1);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(body, b"<html></html>");
    assert_eq!(client.active_stream_count(), 0);

    client.close(ErrorCode::NoError);
    client.wait_closed();
    assert!(client.is_closed());
    assert!(matches!(
        wait_for(&server_events, |e| matches!(e, SessionEvent::Disposed { .. })),
        SessionEvent::Disposed {
            status: ErrorCode::NoError
        }
    ));
}

fn run_concurrent_streams(use_priorities: bool, use_flow_control: bool) {
    const STREAMS: usize = 100;
    const BODY: usize = 20_000;

    let options = SessionBuilder::new()
        .use_priorities(use_priorities)
        .use_flow_control(use_flow_control)
        .build()
        .unwrap();
    let (client, server) = pair(options.clone(), options);
    let responder = serve(server, vec![0x5a; BODY]);
    let events = client.events();

    let mut open = HashSet::new();
    for i in 0..STREAMS {
        let path = format!("/item/{}", i);
        let id = client.open_stream(get(&path), (i % 8) as u8, true).unwrap();
        open.insert(id);
    }

    let mut received: HashMap<StreamId, usize> = HashMap::new();
    let mut closed = 0;
    while closed < STREAMS {
        match next_event(&events) {
            SessionEvent::Data {
                stream_id, data, ..
            } => *received.entry(stream_id).or_default() += data.len(),
            SessionEvent::StreamClosed { stream_id } => {
                assert!(open.remove(&stream_id), "stream {} closed twice", stream_id);
                closed += 1;
            }
            SessionEvent::StreamReset { stream_id, .. } => panic!("stream {} reset", stream_id),
            SessionEvent::Disposed { status } => panic!("session disposed: {}", status),
            _ => {}
        }
    }

    assert!(open.is_empty());
    assert_eq!(received.len(), STREAMS);
    assert!(received.values().all(|&n| n == BODY));
    assert_eq!(client.active_stream_count(), 0);

    client.close(ErrorCode::NoError);
    let server = responder.join().unwrap();
    assert_eq!(server.active_stream_count(), 0);
}

#[test]
fn test_concurrent_streams_priorities_and_flow_control() {
    run_concurrent_streams(true, true);
}

#[test]
fn test_concurrent_streams_priorities_only() {
    run_concurrent_streams(true, false);
}

#[test]
fn test_concurrent_streams_flow_control_only() {
    run_concurrent_streams(false, true);
}

#[test]
fn test_concurrent_streams_plain() {
    run_concurrent_streams(false, false);
}

#[test]
fn test_large_body_split_into_frames() {
    const BODY: usize = 300_000;
    let (client, server) = pair(SessionOptions::default(), SessionOptions::default());
    let responder = serve(server, (0..BODY).map(|i| (i % 251) as u8).collect());
    let events = client.events();

    let id = client.send_request(get("/large"), true).unwrap();
    let mut body = Vec::new();
    loop {
        match next_event(&events) {
            SessionEvent::Data { data, .. } => {
                assert!(data.len() <= MAX_FRAME_PAYLOAD);
                body.extend_from_slice(&data);
            }
            SessionEvent::StreamClosed { stream_id } if stream_id == id => break,
            _ => {}
        }
    }
    assert_eq!(body.len(), BODY);
    assert!(body.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8));

    drop(client);
    responder.join().unwrap();
}

#[test]
fn test_server_push() {
    let (client, server) = pair(SessionOptions::default(), SessionOptions::default());
    let client_events = client.events();
    let server_events = server.events();

    let id = client.send_request(get("/"), true).unwrap();
    wait_for(&server_events, |e| matches!(e, SessionEvent::Headers { .. }));

    let promised = server.push_promise(id, get("/style.css")).unwrap();
    assert_eq!(promised, 2);
    server
        .send_headers(promised, vec![HeaderField::new(":status", "200")], false)
        .unwrap();
    server.send_data(promised, Bytes::from_static(b"body {}"), true).unwrap();
    server
        .send_headers(id, vec![HeaderField::new(":status", "200")], true)
        .unwrap();

    match wait_for(&client_events, |e| matches!(e, SessionEvent::PushPromise { .. })) {
        SessionEvent::PushPromise {
            stream_id,
            promised_stream_id,
            headers,
        } => {
            assert_eq!(stream_id, id);
            assert_eq!(promised_stream_id, promised);
            assert_eq!(headers, get("/style.css"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let mut pushed = Vec::new();
    let mut closed = HashSet::new();
    while closed.len() < 2 {
        match next_event(&client_events) {
            SessionEvent::Data {
                stream_id, data, ..
            } if stream_id == promised => pushed.extend_from_slice(&data),
            SessionEvent::StreamClosed { stream_id } => {
                closed.insert(stream_id);
            }
            _ => {}
        }
    }
    assert_eq!(pushed, b"body {}");
    assert!(closed.contains(&id) && closed.contains(&promised));

    // clients cannot push
    assert!(matches!(
        client.push_promise(id, get("/x")),
        Err(Error::WrongRole(_))
    ));
}

#[test]
fn test_ping_round_trip() {
    let (client, server) = pair(SessionOptions::default(), SessionOptions::default());
    let rtt = client.ping().unwrap();
    assert!(rtt < TIMEOUT);
    assert!(server.ping().is_ok());
}

#[test]
fn test_reset_stream_reaches_peer() {
    let (client, server) = pair(SessionOptions::default(), SessionOptions::default());
    let server_events = server.events();

    let id = client.send_request(get("/slow"), false).unwrap();
    wait_for(&server_events, |e| matches!(e, SessionEvent::Headers { .. }));
    client.reset_stream(id, ErrorCode::Cancel).unwrap();
    assert_eq!(client.active_stream_count(), 0);

    assert_eq!(
        wait_for(&server_events, |e| matches!(e, SessionEvent::StreamReset { .. })),
        SessionEvent::StreamReset {
            stream_id: id,
            error_code: ErrorCode::Cancel,
            remote: true
        }
    );
    assert!(matches!(
        client.send_data(id, Bytes::from_static(b"late"), true),
        Err(Error::StreamNotFound(_))
    ));
}

#[test]
fn test_close_resets_streams_and_sends_goaway() {
    let (client, server) = pair(SessionOptions::default(), SessionOptions::default());
    let client_events = client.events();
    let server_events = server.events();

    let id = client.send_request(get("/pending"), false).unwrap();
    wait_for(&server_events, |e| matches!(e, SessionEvent::Headers { .. }));

    client.close(ErrorCode::NoError);
    // a second close is a no-op
    client.close(ErrorCode::InternalError);

    assert_eq!(
        wait_for(&client_events, |e| matches!(e, SessionEvent::StreamReset { .. })),
        SessionEvent::StreamReset {
            stream_id: id,
            error_code: ErrorCode::Cancel,
            remote: false
        }
    );
    assert_eq!(
        wait_for(&client_events, |e| matches!(e, SessionEvent::Disposed { .. })),
        SessionEvent::Disposed {
            status: ErrorCode::NoError
        }
    );
    assert!(matches!(
        wait_for(&server_events, |e| matches!(e, SessionEvent::GoAway { .. })),
        SessionEvent::GoAway {
            error_code: ErrorCode::NoError,
            ..
        }
    ));
    server.wait_closed();
    assert!(matches!(
        client.send_request(get("/"), true),
        Err(Error::ConnectionClosed)
    ));
}

#[test]
fn test_sessions_without_handshake() {
    let options = SessionBuilder::new().use_handshake(false).build().unwrap();
    let (client, server) = pair(options.clone(), options);
    let responder = serve(server, b"ok".to_vec());
    let events = client.events();

    let id = client.send_request(get("/"), true).unwrap();
    let data = wait_for(&events, |e| matches!(e, SessionEvent::Data { .. }));
    assert_eq!(
        data,
        SessionEvent::Data {
            stream_id: id,
            data: Bytes::from_static(b"ok"),
            end_stream: true
        }
    );

    drop(client);
    responder.join().unwrap();
}

#[test]
fn test_peer_concurrency_bound() {
    let server_options = SessionBuilder::new()
        .max_concurrent_streams(Some(2))
        .build()
        .unwrap();
    let (client, _server) = pair(SessionOptions::default(), server_options);

    let deadline = Instant::now() + TIMEOUT;
    while client.remote_settings().max_concurrent_streams != Some(2) {
        assert!(Instant::now() < deadline, "server SETTINGS never arrived");
        thread::sleep(Duration::from_millis(10));
    }

    client.send_request(get("/a"), false).unwrap();
    client.send_request(get("/b"), false).unwrap();
    assert!(matches!(
        client.send_request(get("/c"), false),
        Err(Error::TooManyStreams)
    ));
}

#[test]
fn test_invalid_header_rejected() {
    let (client, _server) = pair(SessionOptions::default(), SessionOptions::default());
    let mut headers = get("/");
    headers.push(HeaderField::new("", "nameless"));
    assert!(matches!(
        client.send_request(headers, true),
        Err(Error::InvalidHeader(_))
    ));
    // the failed request did not consume a stream id
    assert_eq!(client.send_request(get("/"), true).unwrap(), 1);
}

/// Raw peer: writes the preface and SETTINGS, then whatever frames follow
fn raw_client(addr: std::net::SocketAddr, frames: &[Frame]) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream.write_all(CONNECTION_PREFACE).unwrap();
    let settings = FrameCodec::encode(&Frame::Settings(SettingsFrame::new(Settings::new()))).unwrap();
    stream.write_all(&settings).unwrap();
    for frame in frames {
        stream.write_all(&FrameCodec::encode(frame).unwrap()).unwrap();
    }
    stream
}

fn read_until_goaway(stream: &mut TcpStream) -> ErrorCode {
    loop {
        match FrameCodec::read_frame(stream).unwrap() {
            Some(Frame::GoAway(goaway)) => return goaway.error_code,
            Some(_) => continue,
            None => panic!("connection closed without GOAWAY"),
        }
    }
}

#[test]
fn test_continuation_without_headers_is_protocol_error() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let accept = thread::spawn(move || {
        let transport = TcpTransport::accept(&listener).unwrap();
        Session::server(transport, SessionOptions::default()).unwrap()
    });

    let mut peer = raw_client(
        addr,
        &[Frame::Continuation(ContinuationFrame {
            stream_id: 1,
            header_block: Bytes::from_static(b"\x80"),
            end_headers: true,
        })],
    );
    let server = accept.join().unwrap();

    assert_eq!(read_until_goaway(&mut peer), ErrorCode::ProtocolError);
    assert_eq!(
        wait_for(&server.events(), |e| matches!(e, SessionEvent::Disposed { .. })),
        SessionEvent::Disposed {
            status: ErrorCode::ProtocolError
        }
    );
}

#[test]
fn test_missing_preface_is_protocol_error() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let accept = thread::spawn(move || {
        let transport = TcpTransport::accept(&listener).unwrap();
        Session::server(transport, SessionOptions::default()).unwrap()
    });

    let mut peer = TcpStream::connect(addr).unwrap();
    peer.set_read_timeout(Some(TIMEOUT)).unwrap();
    // exactly as long as the preface, so the server reads all of it
    peer.write_all(b"GET / HTTP/1.1\r\nHost: \r\n").unwrap();
    let _server = accept.join().unwrap();

    assert_eq!(read_until_goaway(&mut peer), ErrorCode::ProtocolError);
}

#[test]
fn test_unanswered_settings_time_out() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    // peer that reads everything and never answers
    let silent = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        let _ = stream.read_to_end(&mut received);
        received
    });

    let options = SessionBuilder::new()
        .settings_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let client = Session::client(TcpTransport::connect(addr, TIMEOUT).unwrap(), options).unwrap();
    assert_eq!(
        wait_for(&client.events(), |e| matches!(e, SessionEvent::Disposed { .. })),
        SessionEvent::Disposed {
            status: ErrorCode::SettingsTimeout
        }
    );

    let received = silent.join().unwrap();
    assert!(received.starts_with(CONNECTION_PREFACE));
}
