//! State-machine tests driven by a scripted transport.
//!
//! Every test scripts the peer's side of the conversation up front, runs one
//! transfer, then inspects what the client wrote and what it put on the wire.

mod common;

use std::time::Duration;

use common::{data_packets, pattern, peer_addr, server_addr, ScriptedTransport};
use tftp_client::{
    Direction, ErrorCode, Mode, Packet, Transfer, TransferConfig, TransferError, TransferState,
    BLOCK_SIZE,
};

fn config() -> TransferConfig {
    TransferConfig::default()
        .with_timeout(Duration::from_millis(100))
        .with_mode(Mode::Octet)
}

fn script_download(data: &[u8]) -> ScriptedTransport {
    data_packets(data)
        .into_iter()
        .fold(ScriptedTransport::new(), |t, p| t.reply(p))
}

/// Data payloads the client sent, one entry per transmission.
fn sent_data(transport: &ScriptedTransport) -> Vec<(u16, Vec<u8>)> {
    transport
        .sent_packets()
        .into_iter()
        .filter_map(|(p, _)| match p {
            Packet::Data { block, payload } => Some((block, payload)),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_three_blocks_writes_file_and_acks_each() {
    let data = pattern(1025);
    let mut transfer = Transfer::new(script_download(&data), server_addr(), config());

    let mut out = Vec::new();
    let stats = transfer.download_to("remote.bin", &mut out).await.unwrap();

    assert_eq!(out, data);
    assert_eq!(stats.blocks, 3);
    assert_eq!(stats.bytes, 1025);
    assert_eq!(transfer.state(), TransferState::Completed);
    assert_eq!(transfer.direction(), Some(Direction::Download));

    let transport = transfer.into_transport();
    assert_eq!(transport.acks(), vec![1, 2, 3]);

    let sent = transport.sent_packets();
    assert_eq!(
        sent[0],
        (
            Packet::ReadRequest {
                filename: "remote.bin".into(),
                mode: Mode::Octet,
            },
            server_addr()
        )
    );
    // Every ACK goes to the port the peer answered from.
    assert!(sent[1..].iter().all(|(_, dest)| *dest == peer_addr()));
}

#[tokio::test]
async fn download_many_blocks_reassembles_in_order() {
    let data = pattern(BLOCK_SIZE * 7 + 300);
    let mut transfer = Transfer::new(script_download(&data), server_addr(), config());

    let mut out = Vec::new();
    transfer.download_to("big", &mut out).await.unwrap();

    assert_eq!(out, data);
    assert_eq!(transfer.into_transport().acks(), (1..=8).collect::<Vec<u16>>());
}

#[tokio::test]
async fn download_exact_multiple_ends_on_empty_block() {
    let data = pattern(BLOCK_SIZE * 2);
    let mut transfer = Transfer::new(script_download(&data), server_addr(), config());

    let mut out = Vec::new();
    let stats = transfer.download_to("even", &mut out).await.unwrap();

    assert_eq!(out, data);
    assert_eq!(stats.blocks, 3);
    assert_eq!(transfer.into_transport().acks(), vec![1, 2, 3]);
}

#[tokio::test]
async fn download_duplicate_block_is_reacked_not_rewritten() {
    let data = pattern(BLOCK_SIZE * 2 + 10);
    let packets = data_packets(&data);
    let transport = ScriptedTransport::new()
        .reply(packets[0].clone())
        .reply(packets[1].clone())
        // Peer missed our ACK 1 and resent block 1.
        .reply(packets[0].clone())
        .reply(packets[2].clone());
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let mut out = Vec::new();
    let stats = transfer.download_to("dup", &mut out).await.unwrap();

    assert_eq!(out, data);
    assert_eq!(stats.blocks, 3);
    assert_eq!(stats.retransmits, 1);
    assert_eq!(transfer.into_transport().acks(), vec![1, 2, 1, 3]);
}

#[tokio::test]
async fn download_ignores_future_blocks_and_stray_packets() {
    let data = pattern(BLOCK_SIZE + 5);
    let packets = data_packets(&data);
    let transport = ScriptedTransport::new()
        .reply(packets[0].clone())
        .reply(Packet::Data {
            block: 9,
            payload: vec![0xFF; 4],
        })
        .reply(Packet::Ack { block: 1 })
        .reply(packets[1].clone());
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let mut out = Vec::new();
    transfer.download_to("noise", &mut out).await.unwrap();

    assert_eq!(out, data);
    assert_eq!(transfer.into_transport().acks(), vec![1, 2]);
}

#[tokio::test]
async fn download_timeout_is_fatal() {
    let data = pattern(BLOCK_SIZE * 3);
    let packets = data_packets(&data);
    let transport = ScriptedTransport::new().reply(packets[0].clone()).timeout();
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let mut out = Vec::new();
    let err = transfer.download_to("slow", &mut out).await.unwrap_err();

    assert!(
        matches!(err, TransferError::TransferTimeout { block: 2, .. }),
        "unexpected error: {err:?}"
    );
    assert_eq!(transfer.state(), TransferState::Failed);
    // The block accepted before the timeout stays written.
    assert_eq!(out, &data[..BLOCK_SIZE]);
}

#[tokio::test]
async fn download_timeout_leaves_partial_file_closed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.bin");
    let data = pattern(BLOCK_SIZE * 3);
    let packets = data_packets(&data);
    let transport = ScriptedTransport::new().reply(packets[0].clone());
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let err = transfer.download("slow", &path).await.unwrap_err();
    assert!(matches!(err, TransferError::TransferTimeout { .. }));

    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(on_disk, &data[..BLOCK_SIZE]);
}

#[tokio::test]
async fn download_writes_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fetched.bin");
    let data = pattern(3000);
    let mut transfer = Transfer::new(script_download(&data), server_addr(), config());

    transfer.download("fetched.bin", &path).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[tokio::test]
async fn download_peer_error_aborts() {
    let transport = ScriptedTransport::new().reply(Packet::Error {
        code: ErrorCode::FileNotFound,
        message: "nope".into(),
    });
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let mut out = Vec::new();
    let err = transfer.download_to("missing", &mut out).await.unwrap_err();

    match err {
        TransferError::PeerProtocolError { code, message } => {
            assert_eq!(code, ErrorCode::FileNotFound);
            assert_eq!(message, "nope");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(out.is_empty());
    assert_eq!(transfer.state(), TransferState::Failed);
}

#[tokio::test]
async fn download_malformed_datagram_aborts() {
    let transport = ScriptedTransport::new().raw(&[0x00, 0x09, 0x00, 0x01]);
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let mut out = Vec::new();
    let err = transfer.download_to("junk", &mut out).await.unwrap_err();
    assert!(matches!(err, TransferError::MalformedMessage(_)));
}

#[tokio::test]
async fn download_rejects_foreign_transfer_id() {
    let data = pattern(BLOCK_SIZE + 1);
    let packets = data_packets(&data);
    let intruder = "127.0.0.1:50000".parse().unwrap();
    let transport = ScriptedTransport::new()
        .reply(packets[0].clone())
        .reply_from(packets[1].clone(), intruder)
        .reply(packets[1].clone());
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let mut out = Vec::new();
    transfer.download_to("tid", &mut out).await.unwrap();
    assert_eq!(out, data);

    let transport = transfer.into_transport();
    assert_eq!(transport.acks(), vec![1, 2]);
    let rejected: Vec<_> = transport
        .sent_packets()
        .into_iter()
        .filter(|(_, dest)| *dest == intruder)
        .collect();
    assert_eq!(rejected.len(), 1);
    assert!(matches!(
        rejected[0].0,
        Packet::Error {
            code: ErrorCode::UnknownTransferId,
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_three_blocks_completes() {
    let data = pattern(1025);
    let transport = ScriptedTransport::new()
        .reply(Packet::Ack { block: 0 })
        .reply(Packet::Ack { block: 1 })
        .reply(Packet::Ack { block: 2 })
        .reply(Packet::Ack { block: 3 });
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let stats = transfer.upload_from(&mut &data[..], "up.bin").await.unwrap();
    assert_eq!(stats.blocks, 3);
    assert_eq!(stats.bytes, 1025);
    assert_eq!(transfer.state(), TransferState::Completed);
    assert_eq!(transfer.direction(), Some(Direction::Upload));

    let transport = transfer.into_transport();
    let sent = transport.sent_packets();
    assert_eq!(
        sent[0],
        (
            Packet::WriteRequest {
                filename: "up.bin".into(),
                mode: Mode::Octet,
            },
            server_addr()
        )
    );

    // Block 1 went out before the peer's port was known and is resent to it
    // once ACK 0 arrives from there.
    let data_sent = sent_data(&transport);
    let blocks: Vec<u16> = data_sent.iter().map(|(b, _)| *b).collect();
    assert_eq!(blocks, vec![1, 1, 2, 3]);
    assert_eq!(sent[1].1, server_addr());
    assert!(sent[2..].iter().all(|(_, dest)| *dest == peer_addr()));

    let mut rebuilt = Vec::new();
    for (_, payload) in data_sent.iter().skip(1) {
        rebuilt.extend_from_slice(payload);
    }
    assert_eq!(rebuilt, data);
    assert_eq!(data_sent[2].1.len(), BLOCK_SIZE);
    assert_eq!(data_sent[3].1.len(), 1);
}

#[tokio::test]
async fn upload_exact_multiple_sends_empty_final_block() {
    let data = pattern(BLOCK_SIZE * 2);
    let transport = ScriptedTransport::new()
        .reply(Packet::Ack { block: 1 })
        .reply(Packet::Ack { block: 2 })
        .reply(Packet::Ack { block: 3 });
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let stats = transfer.upload_from(&mut &data[..], "even").await.unwrap();
    assert_eq!(stats.blocks, 3);
    assert_eq!(stats.bytes, (BLOCK_SIZE * 2) as u64);

    let data_sent = sent_data(&transfer.into_transport());
    assert_eq!(data_sent.len(), 3);
    assert_eq!(data_sent[2], (3, Vec::new()));
}

#[tokio::test]
async fn upload_empty_file_sends_single_empty_block() {
    let transport = ScriptedTransport::new().reply(Packet::Ack { block: 1 });
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let stats = transfer.upload_from(&mut &b""[..], "empty").await.unwrap();
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.bytes, 0);
    assert_eq!(sent_data(&transfer.into_transport()), vec![(1, Vec::new())]);
}

#[tokio::test]
async fn upload_retransmits_identical_datagram_on_timeout() {
    let data = pattern(100);
    let transport = ScriptedTransport::new()
        .timeout()
        .timeout()
        .timeout()
        .reply(Packet::Ack { block: 1 });
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let stats = transfer.upload_from(&mut &data[..], "lossy").await.unwrap();
    assert_eq!(stats.retransmits, 3);
    assert_eq!(transfer.state(), TransferState::Completed);

    let transport = transfer.into_transport();
    let datagrams: Vec<&Vec<u8>> = transport.sent.iter().skip(1).map(|(b, _)| b).collect();
    assert_eq!(datagrams.len(), 4);
    assert!(datagrams.iter().all(|d| *d == datagrams[0]));
}

#[tokio::test]
async fn upload_gives_up_after_max_retries() {
    let data = pattern(100);
    let mut transfer = Transfer::new(
        ScriptedTransport::new(),
        server_addr(),
        config().with_max_retries(2),
    );

    let err = transfer.upload_from(&mut &data[..], "void").await.unwrap_err();
    assert!(
        matches!(err, TransferError::TransferTimeout { block: 1, attempts: 3 }),
        "unexpected error: {err:?}"
    );
    assert_eq!(transfer.state(), TransferState::Failed);
    // First transmission plus two retransmissions.
    assert_eq!(sent_data(&transfer.into_transport()).len(), 3);
}

#[tokio::test]
async fn upload_retransmits_while_foreign_datagrams_keep_arriving() {
    let data = pattern(100);
    let intruder: std::net::SocketAddr = "127.0.0.1:50000".parse().unwrap();
    // A stranger sends well inside every 100 ms window.
    let transport = (0..10).fold(
        ScriptedTransport::new().reply(Packet::Ack { block: 0 }),
        |t, _| t.reply_after(Duration::from_millis(60), Packet::Ack { block: 1 }, intruder),
    );
    let mut transfer = Transfer::new(transport, server_addr(), config().with_max_retries(1));

    let err = transfer.upload_from(&mut &data[..], "busy").await.unwrap_err();
    assert!(
        matches!(err, TransferError::TransferTimeout { block: 1, attempts: 2 }),
        "unexpected error: {err:?}"
    );

    // WRQ, block 1 to the server, block 1 resent to the peer, then the
    // retransmit must follow after at most one rejection.
    let sent = transfer.into_transport().sent_packets();
    let retransmit = sent
        .iter()
        .enumerate()
        .filter(|(_, (p, _))| matches!(p, Packet::Data { .. }))
        .nth(2)
        .map(|(i, _)| i)
        .expect("block 1 was never retransmitted");
    let rejections = sent[..retransmit]
        .iter()
        .filter(|(p, dest)| matches!(p, Packet::Error { .. }) && *dest == intruder)
        .count();
    assert!(rejections <= 1, "{rejections} rejections before the retransmit");
    assert_eq!(sent[retransmit].1, peer_addr());
}

#[tokio::test]
async fn upload_ignores_mismatched_acks() {
    let data = pattern(BLOCK_SIZE + 1);
    let transport = ScriptedTransport::new()
        .reply_from(Packet::Ack { block: 0 }, server_addr())
        .reply_from(Packet::Ack { block: 7 }, server_addr())
        .reply_from(Packet::Ack { block: 1 }, server_addr())
        .reply_from(Packet::Ack { block: 1 }, server_addr())
        .reply_from(Packet::Ack { block: 2 }, server_addr());
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let stats = transfer.upload_from(&mut &data[..], "acks").await.unwrap();
    assert_eq!(stats.retransmits, 0);

    let blocks: Vec<u16> = sent_data(&transfer.into_transport())
        .into_iter()
        .map(|(b, _)| b)
        .collect();
    assert_eq!(blocks, vec![1, 2]);
}

#[tokio::test]
async fn upload_peer_error_aborts() {
    let data = pattern(BLOCK_SIZE * 4);
    let transport = ScriptedTransport::new()
        .reply(Packet::Ack { block: 1 })
        .reply(Packet::Error {
            code: ErrorCode::DiskFull,
            message: "quota".into(),
        });
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let err = transfer.upload_from(&mut &data[..], "big").await.unwrap_err();
    assert!(matches!(
        err,
        TransferError::PeerProtocolError {
            code: ErrorCode::DiskFull,
            ..
        }
    ));
}

#[tokio::test]
async fn upload_missing_source_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut transfer = Transfer::new(ScriptedTransport::new(), server_addr(), config());

    let err = transfer
        .upload(dir.path().join("absent.bin"), "absent.bin")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::SourceFileNotFound { .. }));
    assert!(transfer.into_transport().sent.is_empty());
}

#[tokio::test]
async fn upload_reads_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("src.bin");
    let data = pattern(700);
    std::fs::write(&path, &data).unwrap();

    let transport = ScriptedTransport::new()
        .reply(Packet::Ack { block: 1 })
        .reply(Packet::Ack { block: 2 });
    let mut transfer = Transfer::new(transport, server_addr(), config());

    let stats = transfer.upload(&path, "src.bin").await.unwrap();
    assert_eq!(stats.bytes, 700);
}
