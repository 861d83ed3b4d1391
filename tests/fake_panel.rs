// End-to-end tests against a scripted fake panel on a loopback socket.
//
// The fake panel speaks just enough of the wire protocol for each scenario:
// it answers the serial-number probe, then reads framed commands and replies
// from a per-test script.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, timeout};

use texecom2mqtt::comm::TexecomComm;
use texecom2mqtt::config::TexecomConfig;
use texecom2mqtt::devices::{AreaState, ArmType, ZoneFlags, ZoneState};
use texecom2mqtt::error::TexecomError;
use texecom2mqtt::event::PanelEvent;
use texecom2mqtt::frame::crc8;
use texecom2mqtt::panel::{BridgeEvent, Panel};

const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Serial bytes the fake panel reports; hex-encodes to "01020304050607".
const SERIAL: [u8; 7] = [1, 2, 3, 4, 5, 6, 7];

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Accept one connection and answer the un-framed serial probe.
async fn accept_with_handshake(listener: &TcpListener) -> TcpStream {
    let (mut sock, _) = listener.accept().await.unwrap();

    let mut probe = [0u8; 3];
    sock.read_exact(&mut probe).await.unwrap();
    assert_eq!(probe, [0x03, 0x5A, 0xA2]);

    let mut reply = vec![0x0B, 0x5A, 0x00, 0x00];
    reply.extend_from_slice(&SERIAL);
    sock.write_all(&reply).await.unwrap();
    sock
}

/// Read one framed command; returns (seq, cmd, body).
async fn read_command(sock: &mut TcpStream) -> std::io::Result<(u8, u8, Vec<u8>)> {
    let mut header = [0u8; 4];
    sock.read_exact(&mut header).await?;
    assert_eq!(header[0], b't');
    assert_eq!(header[1], b'C');
    let len = header[2] as usize;
    let mut rest = vec![0u8; len - 4];
    sock.read_exact(&mut rest).await?;
    let crc = rest[rest.len() - 1];
    let mut full = header.to_vec();
    full.extend_from_slice(&rest[..rest.len() - 1]);
    assert_eq!(crc8(&full), crc, "command frame CRC");
    Ok((header[3], rest[0], rest[1..rest.len() - 1].to_vec()))
}

fn response_frame(seq: u8, payload: &[u8]) -> Vec<u8> {
    let len = 5 + payload.len();
    let mut frame = vec![b't', b'R', len as u8, seq];
    frame.extend_from_slice(payload);
    frame.push(crc8(&frame));
    frame
}

fn message_frame(msg_seq: u8, payload: &[u8]) -> Vec<u8> {
    let len = 5 + payload.len();
    let mut frame = vec![b't', b'M', len as u8, msg_seq];
    frame.extend_from_slice(payload);
    frame.push(crc8(&frame));
    frame
}

fn padded(text: &str, width: usize) -> Vec<u8> {
    let mut field = text.as_bytes().to_vec();
    field.resize(width, b' ');
    field
}

// -------------------------------------------------------------------------
// Login
// -------------------------------------------------------------------------

#[tokio::test]
async fn login_success() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let mut sock = accept_with_handshake(&listener).await;
        let (seq, cmd, body) = read_command(&mut sock).await.unwrap();
        assert_eq!(cmd, 0x01);
        assert_eq!(body, b"1234");
        sock.write_all(&response_frame(seq, &[0x06])).await.unwrap();
        sock
    });

    timeout(TEST_TIMEOUT, async {
        let mut comm = TexecomComm::new();
        comm.connect("127.0.0.1", port).await.unwrap();
        assert_eq!(comm.probe_serial(), Some("01020304050607"));

        comm.login("1234").await.unwrap();
        assert!(comm.is_logged_in());
        comm.disconnect().await;
    })
    .await
    .unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn login_rejected() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let mut sock = accept_with_handshake(&listener).await;
        let (seq, cmd, _) = read_command(&mut sock).await.unwrap();
        assert_eq!(cmd, 0x01);
        sock.write_all(&response_frame(seq, &[0x15])).await.unwrap();
        sock
    });

    timeout(TEST_TIMEOUT, async {
        let mut comm = TexecomComm::new();
        comm.connect("127.0.0.1", port).await.unwrap();
        let err = comm.login("0000").await.unwrap_err();
        assert!(matches!(err, TexecomError::AuthFailed));
        assert!(!comm.is_logged_in());
        comm.disconnect().await;
    })
    .await
    .unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn over_long_udl_password_rejected_before_wire() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move { accept_with_handshake(&listener).await });

    timeout(TEST_TIMEOUT, async {
        let mut comm = TexecomComm::new();
        comm.connect("127.0.0.1", port).await.unwrap();
        let long = "9".repeat(33);
        let err = comm.login(&long).await.unwrap_err();
        assert!(matches!(err, TexecomError::Config(_)));
        comm.disconnect().await;
    })
    .await
    .unwrap();

    server.await.unwrap();
}

// -------------------------------------------------------------------------
// Dispatcher ordering and staleness
// -------------------------------------------------------------------------

#[tokio::test]
async fn responses_not_swapped_across_interleaved_message() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let mut sock = accept_with_handshake(&listener).await;

        // First command: interleave an event before the response.
        let (seq_a, cmd_a, _) = read_command(&mut sock).await.unwrap();
        assert_eq!(cmd_a, 0x02);
        let event = message_frame(0, &[1, 0x05, 0x00, 0x01]);
        sock.write_all(&event).await.unwrap();
        sock.write_all(&response_frame(seq_a, &[0xAA])).await.unwrap();

        let (seq_b, cmd_b, _) = read_command(&mut sock).await.unwrap();
        assert_eq!(cmd_b, 0x0B);
        assert_eq!(seq_b, seq_a.wrapping_add(1));
        sock.write_all(&response_frame(seq_b, &[0xBB])).await.unwrap();
        sock
    });

    timeout(TEST_TIMEOUT, async {
        let mut comm = TexecomComm::new();
        comm.connect("127.0.0.1", port).await.unwrap();
        let mut events = comm.take_events().unwrap();

        // Issued concurrently; the dispatcher serializes them in issue order.
        let (states, flags) = tokio::join!(comm.get_zone_states(), comm.get_area_flags());
        let (states, flags) = (states.unwrap(), flags.unwrap());

        // Payloads belong to their own commands.
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].state, ZoneState::Tampered); // 0xAA & 3 == 2
        assert!(flags.is_empty()); // single byte 0xBB is no full 8-byte record

        // The interleaved event was delivered independently.
        match events.recv().await {
            Some(PanelEvent::Zone(z)) => {
                assert_eq!(z.zone_number, 5);
                assert_eq!(z.state, ZoneState::Active);
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        comm.disconnect().await;
    })
    .await
    .unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn stale_response_is_dropped() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        let mut sock = accept_with_handshake(&listener).await;
        let (seq, _, _) = read_command(&mut sock).await.unwrap();
        // Response for a sequence nobody is waiting on, then the real one.
        sock.write_all(&response_frame(seq.wrapping_add(100), &[0xEE]))
            .await
            .unwrap();
        sock.write_all(&response_frame(seq, &[0x01])).await.unwrap();
        sock
    });

    timeout(TEST_TIMEOUT, async {
        let mut comm = TexecomComm::new();
        comm.connect("127.0.0.1", port).await.unwrap();
        let states = comm.get_zone_states().await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].state, ZoneState::Active);
        comm.disconnect().await;
    })
    .await
    .unwrap();

    server.await.unwrap();
}

// -------------------------------------------------------------------------
// Reconnect
// -------------------------------------------------------------------------

#[tokio::test]
async fn dropped_connection_fails_in_flight_call_and_reconnects_fresh() {
    let (listener, port) = listener().await;

    let server = tokio::spawn(async move {
        // First connection: read a command and hang up without responding.
        let mut sock = accept_with_handshake(&listener).await;
        let (_, cmd, _) = read_command(&mut sock).await.unwrap();
        assert_eq!(cmd, 0x19);
        drop(sock);

        // Second connection: serve the retry normally.
        let mut sock = accept_with_handshake(&listener).await;
        let (seq, cmd, _) = read_command(&mut sock).await.unwrap();
        assert_eq!(cmd, 0x19);
        // Fresh dispatcher: the sequence counter restarted.
        assert_eq!(seq, 0);
        sock.write_all(&response_frame(seq, &[0x00])).await.unwrap();
        sock
    });

    timeout(TEST_TIMEOUT, async {
        let mut comm = TexecomComm::new();
        comm.connect("127.0.0.1", port).await.unwrap();

        let err = comm.get_system_power().await.unwrap_err();
        assert!(matches!(err, TexecomError::NotConnected));
        assert!(!comm.is_connected());

        comm.connect("127.0.0.1", port).await.unwrap();
        comm.get_system_power().await.unwrap();
        comm.disconnect().await;
    })
    .await
    .unwrap();

    server.await.unwrap();
}

// -------------------------------------------------------------------------
// Full panel lifecycle
// -------------------------------------------------------------------------

fn identification_payload() -> Vec<u8> {
    let mut payload = padded("Premier Elite 48", 20);
    payload.extend(padded("SN-12345", 20));
    payload.extend(padded("V4.02.01", 20));
    payload.extend_from_slice(&6u16.to_le_bytes());
    payload
}

fn area_text_payload() -> Vec<u8> {
    let mut payload = padded("Downstairs", 16);
    payload.extend(padded("Upstairs", 16));
    payload.extend(padded("Garage", 16));
    payload
}

fn zone_details_payload() -> Vec<u8> {
    let names = ["Front Door", "Back Door", "Lounge PIR", "Kitchen PIR", "Landing PIR", "Loft"];
    let mut payload = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let mut record = padded(name, 16);
        record.push(if i == 0 { 1 } else { 3 }); // Entry/Exit 1, then Guard
        record.resize(32, 0);
        payload.extend(record);
    }
    payload
}

/// Serve the whole initial load, then push one area event and one zone event.
async fn serve_full_panel(listener: TcpListener) {
    let mut sock = accept_with_handshake(&listener).await;
    loop {
        let Ok((seq, cmd, body)) = read_command(&mut sock).await else {
            return;
        };
        let payload: Vec<u8> = match cmd {
            0x01 => vec![0x06],
            0x16 => identification_payload(),
            0x22 => area_text_payload(),
            0x03 => zone_details_payload(),
            0x02 => vec![0x00; 6],
            0x0B => {
                // Area 2 armed (bit 22), others disarmed.
                let mut flags = vec![0u8; 24];
                flags[10] = 0x40;
                flags
            }
            0x06 => {
                // Arm full on area 3: bitmap then arm type.
                assert_eq!(body, vec![0x04, 0x00]);
                vec![0x06]
            }
            0x19 => vec![0x00, 0x00],
            other => panic!("Unexpected command {:#04x}", other),
        };
        sock.write_all(&response_frame(seq, &payload)).await.unwrap();

        if cmd == 0x06 {
            // The panel confirms the arm with an area event, and later
            // reports activity: part-arm 2 on area 1, zone 5 active+alarmed.
            sock.write_all(&message_frame(1, &[2, 3, 3])).await.unwrap();
            sock.write_all(&message_frame(2, &[2, 1, 4, 2])).await.unwrap();
            sock.write_all(&message_frame(3, &[1, 5, 0, 0x11])).await.unwrap();
        }
    }
}

#[tokio::test]
async fn panel_lifecycle_and_events() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(serve_full_panel(listener));

    timeout(TEST_TIMEOUT, async {
        let panel = Panel::new(TexecomConfig {
            host: "127.0.0.1".to_string(),
            port,
            udl_password: "1234".to_string(),
        });

        let mut bridge_rx = panel.subscribe();
        panel.connect().await.unwrap();
        panel.login().await.unwrap();
        panel.start().await.unwrap();

        let device = panel.device();
        assert_eq!(device.model, "Premier Elite 48");
        assert_eq!(device.serial_number, "SN-12345");
        assert_eq!(device.zone_count, 6);

        let areas = panel.areas();
        assert_eq!(areas.len(), 3);
        assert_eq!(areas[0].name, "Downstairs");
        assert_eq!(areas[0].id, "A1");
        assert_eq!(areas[1].name, "Upstairs");
        assert_eq!(areas[1].state, AreaState::Armed);
        assert_eq!(areas[2].name, "Garage");

        let zones = panel.zones();
        assert_eq!(zones.len(), 6);
        assert_eq!(zones[4].name, "Landing PIR");
        assert_eq!(zones[4].id, "Z5");

        match bridge_rx.recv().await.unwrap() {
            BridgeEvent::Online => {}
            other => panic!("Expected Online, got {:?}", other),
        }

        // Command goes to the wire; the fake panel answers with events.
        panel.arm(3, ArmType::Full).await.unwrap();

        match bridge_rx.recv().await.unwrap() {
            BridgeEvent::AreaChanged(area) => {
                assert_eq!(area.number, 3);
                assert_eq!(area.state, AreaState::Armed);
                assert_eq!(area.part_arm, 0);
            }
            other => panic!("Expected AreaChanged, got {:?}", other),
        }

        match bridge_rx.recv().await.unwrap() {
            BridgeEvent::AreaChanged(area) => {
                assert_eq!(area.number, 1);
                assert_eq!(area.state, AreaState::PartArmed);
                assert_eq!(area.part_arm, 2);
            }
            other => panic!("Expected AreaChanged, got {:?}", other),
        }

        match bridge_rx.recv().await.unwrap() {
            BridgeEvent::ZoneChanged(zone) => {
                assert_eq!(zone.number, 5);
                assert_eq!(zone.state, ZoneState::Active);
                assert!(zone.flags.contains(ZoneFlags::ALARMED));
            }
            other => panic!("Expected ZoneChanged, got {:?}", other),
        }

        // The model reflects the events too.
        let areas = panel.areas();
        assert_eq!(areas[0].state, AreaState::PartArmed);
        assert_eq!(areas[0].part_arm, 2);
        assert_eq!(areas[2].state, AreaState::Armed);

        panel.disconnect().await;
    })
    .await
    .unwrap();

    server.abort();
}
