#![cfg(feature = "transport-tcp")]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use etherip::{
    Command, ConnectionSettings, Encapsulation, Error, HEADER_SIZE, RawPayload, TcpConnection,
    TransportError,
};

const SESSION: u32 = 0x0000_0007;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut frame = vec![0u8; HEADER_SIZE];
    stream.read_exact(&mut frame).ok()?;
    let length = usize::from(u16::from_le_bytes([frame[2], frame[3]]));
    frame.resize(HEADER_SIZE + length, 0);
    stream.read_exact(&mut frame[HEADER_SIZE..]).ok()?;
    Some(frame)
}

fn reply(request: &[u8], session: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = request[..HEADER_SIZE].to_vec();
    frame[2..4].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    frame[4..8].copy_from_slice(&session.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn command_of(frame: &[u8]) -> u16 {
    u16::from_le_bytes([frame[0], frame[1]])
}

/// Simulated device: registers `SESSION`, answers `SendRRData` with the reversed payload
/// written one byte at a time, and returns every frame it received once the client leaves.
fn spawn_device(listener: TcpListener) -> JoinHandle<Vec<Vec<u8>>> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        while let Some(frame) = read_frame(&mut stream) {
            let command = command_of(&frame);
            if command == Command::RegisterSession.as_u16() {
                stream.write_all(&reply(&frame, SESSION, &frame[HEADER_SIZE..])).unwrap();
            } else if command == Command::SendRRData.as_u16() {
                let payload: Vec<u8> = frame[HEADER_SIZE..].iter().rev().copied().collect();
                for byte in reply(&frame, SESSION, &payload) {
                    stream.write_all(&[byte]).unwrap();
                    stream.flush().unwrap();
                }
            }
            let done = command == Command::UnRegisterSession.as_u16();
            received.push(frame);
            if done {
                break;
            }
        }
        received
    })
}

fn local_device() -> (ConnectionSettings, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let settings = ConnectionSettings::new("127.0.0.1", 0)
        .with_port(listener.local_addr().unwrap().port())
        .with_timeout(Duration::from_secs(2))
        .with_retry_delay(Duration::from_millis(10));
    (settings, listener)
}

#[test]
fn test_session_lifecycle_against_device() {
    init_tracing();
    let (settings, listener) = local_device();
    let device = spawn_device(listener);

    let connection = TcpConnection::new(settings);
    assert_eq!(connection.session(), 0);
    connection.connect().unwrap();
    assert!(connection.is_open());
    assert_eq!(connection.session(), SESSION);

    let mut request = Encapsulation::new(
        Command::SendRRData,
        connection.session(),
        RawPayload(vec![0x01, 0x02, 0x03, 0x04, 0x05]),
    );
    let response = connection.execute(&mut request).unwrap();
    assert_eq!(response, vec![0x05, 0x04, 0x03, 0x02, 0x01]);

    connection.close();
    assert!(!connection.is_open());
    assert_eq!(connection.session(), 0);

    let frames = device.join().unwrap();
    let commands: Vec<u16> = frames.iter().map(|frame| command_of(frame)).collect();
    assert_eq!(
        commands,
        vec![
            Command::RegisterSession.as_u16(),
            Command::SendRRData.as_u16(),
            Command::UnRegisterSession.as_u16(),
        ]
    );
    // Version 1, no options.
    assert_eq!(&frames[0][HEADER_SIZE..], &[0x01, 0x00, 0x00, 0x00]);
    assert_eq!(&frames[2][4..8], &SESSION.to_le_bytes());
    assert_eq!(frames[2].len(), HEADER_SIZE);
}

#[test]
fn test_execute_connects_on_demand() {
    init_tracing();
    let (settings, listener) = local_device();
    let device = spawn_device(listener);

    let connection = TcpConnection::new(settings);
    let mut request = Encapsulation::new(Command::SendRRData, 0, RawPayload(vec![0xAA, 0xBB]));
    assert_eq!(connection.execute(&mut request).unwrap(), vec![0xBB, 0xAA]);
    assert_eq!(request.session(), SESSION);
    drop(connection);

    let frames = device.join().unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(command_of(&frames[2]), Command::UnRegisterSession.as_u16());
}

#[test]
fn test_unreachable_device_exhausts_retries() {
    init_tracing();
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let settings = ConnectionSettings::new("127.0.0.1", 0)
        .with_port(port)
        .with_timeout(Duration::from_millis(200))
        .with_retries(2)
        .with_retry_delay(Duration::from_millis(1));

    let connection = TcpConnection::new(settings);
    let err = connection.execute(&mut Encapsulation::new(Command::Nop, 0, ())).unwrap_err();
    assert!(
        matches!(err, Error::RetryExhausted { attempts: 2, last: TransportError::Connect { .. } }),
        "{err:?}"
    );
    assert_eq!(err.to_string(), "failed to execute 2 times");
    assert!(!connection.is_open());
}
