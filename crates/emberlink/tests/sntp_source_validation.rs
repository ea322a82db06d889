// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! SNTP source-validation scenario: a packet from an unexpected IP is
//! discarded silently; the first legitimate responder wins.
//!
//! The rogue sender binds 127.0.0.2, the legitimate server 127.0.0.1, so
//! the client's source check can tell them apart on loopback.

use emberlink::net::UdpSocket;
use emberlink::sntp::{self, NtpPacket, NtpTimestamp, SntpError};
use std::time::Duration;

/// A legitimate server: echo the request's transmit timestamp as origin.
fn serve_once(listen: [u8; 4], delay: Duration, stratum: u8) -> ([u8; 4], u16, std::thread::JoinHandle<()>) {
    let mut socket = UdpSocket::bind(listen, 0).unwrap();
    let port = socket.local_port().unwrap();
    let handle = std::thread::spawn(move || {
        use emberlink::net::Datagram;
        let mut buf = [0u8; 128];
        let (n, client_ip, client_port) = socket.recv_from_addr(&mut buf).unwrap();
        std::thread::sleep(delay);
        let request = NtpPacket::decode(&buf[..n]).unwrap();
        let response = NtpPacket {
            version: 4,
            mode: 4,
            stratum,
            origin_ts: request.transmit_ts,
            receive_ts: NtpTimestamp::from_bits(0x1111_0000_0000_0000),
            transmit_ts: NtpTimestamp::from_bits(0x2222_0000_0000_0000),
            ..NtpPacket::default()
        };
        socket
            .send_to(client_ip, client_port, &response.encode())
            .unwrap();
    });
    (listen, port, handle)
}

#[test]
fn legitimate_responder_wins_over_rogue_packets() {
    let mut client = UdpSocket::bind([127, 0, 0, 1], 0).unwrap();
    let client_port = client.local_port().unwrap();

    // The legitimate server answers after a short delay.
    let (server_ip, server_port, server) =
        serve_once([127, 0, 0, 1], Duration::from_millis(50), 2);

    // The rogue floods first from an address outside the server set.
    let rogue = std::thread::spawn(move || {
        use emberlink::net::Datagram;
        let mut socket = UdpSocket::bind([127, 0, 0, 2], 0).unwrap();
        let junk = NtpPacket {
            version: 4,
            mode: 4,
            stratum: 1,
            ..NtpPacket::default()
        };
        for _ in 0..3 {
            socket
                .send_to([127, 0, 0, 1], client_port, &junk.encode())
                .unwrap();
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    // Give the rogue a head start so its packets are queued first.
    std::thread::sleep(Duration::from_millis(20));
    let response = sntp::query_race(
        &mut client,
        &[server_ip],
        server_port,
        Duration::from_secs(2),
    )
    .unwrap();

    assert_eq!(response.server, server_ip);
    assert!(response.stratum > 0);
    assert_eq!(response.stratum, 2);

    rogue.join().unwrap();
    server.join().unwrap();
}

#[test]
fn kiss_of_death_is_surfaced() {
    let mut client = UdpSocket::bind([127, 0, 0, 1], 0).unwrap();
    let (server_ip, server_port, server) =
        serve_once([127, 0, 0, 1], Duration::from_millis(1), 0);

    let result = sntp::query(&mut client, server_ip, server_port, Duration::from_secs(2));
    assert!(matches!(result, Err(SntpError::KissOfDeath)));
    server.join().unwrap();
}

#[test]
fn timeout_when_nobody_answers() {
    let mut client = UdpSocket::bind([127, 0, 0, 1], 0).unwrap();
    // A bound but silent "server".
    let silent = UdpSocket::bind([127, 0, 0, 1], 0).unwrap();
    let port = silent.local_port().unwrap();

    let result = sntp::query(
        &mut client,
        [127, 0, 0, 1],
        port,
        Duration::from_millis(100),
    );
    assert!(matches!(result, Err(SntpError::Timeout)));
}
