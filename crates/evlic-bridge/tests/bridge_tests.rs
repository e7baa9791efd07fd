//! End-to-end requests against a simulated reader.

use std::time::Duration;

use evlic_bridge::{NfcConfig, NfcService, invoke};
use evlic_codec::WireFormat;
use evlic_hardware::discovery::Discovery;
use evlic_hardware::events::NfcEvent;
use evlic_hardware::mock::{MockCard, MockReader, MockReaderHandle};
use rstest::rstest;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::time::timeout;

const UID: [u8; 4] = [0x04, 0xA1, 0xB2, 0xC3];

fn config(format: WireFormat, auto_start: bool) -> NfcConfig {
    let mut config = NfcConfig::default();
    config.codec.format = format;
    config.poller.auto_start = auto_start;
    config.poller.interval_ms = 100;
    config
}

async fn connected(config: NfcConfig) -> (NfcService, MockReaderHandle) {
    let (reader, handle) = MockReader::new();
    let service = NfcService::new(config, Discovery::new().with_mock(reader));
    let refreshed = invoke(&service, "nfc.refreshDevices", Value::Null).await;
    assert_eq!(refreshed, json!({ "success": true }));
    (service, handle)
}

async fn next_event(rx: &mut broadcast::Receiver<NfcEvent>) -> NfcEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Event timeout")
        .unwrap()
}

fn error_code(response: &Value) -> &str {
    assert_eq!(response["success"], false, "expected an error: {response}");
    response["error"]["code"].as_str().unwrap()
}

#[tokio::test]
async fn test_plain_record_round_trip() {
    let (service, handle) = connected(config(WireFormat::Plain, false)).await;
    handle.present_card(MockCard::classic_1k(&UID)).await;

    let written = invoke(
        &service,
        "nfc.writeCard",
        json!({
            "holderName": "Ana Souza",
            "mobile": "+55 11 98765-4321",
            "licenseNumber": "EV-2024-0042",
        }),
    )
    .await;
    assert_eq!(written["success"], true);
    assert_eq!(written["uid"], "04A1B2C3");
    assert!(written["bytesWritten"].as_u64().unwrap() > 0);

    let read = invoke(&service, "nfc.readCard", Value::Null).await;
    assert_eq!(read["uid"], "04A1B2C3");
    assert_eq!(read["info"]["family"], "MIFARE_CLASSIC_1K");
    assert_eq!(read["payload"]["format"], "plain");

    let payload = &read["payload"]["payload"];
    assert_eq!(payload["kind"], "license");
    assert_eq!(payload["record"]["holderName"], "Ana Souza");
    assert_eq!(payload["record"]["mobile"], "+55 11 98765-4321");
    assert_eq!(payload["record"]["licenseNumber"], "EV-2024-0042");
    assert_eq!(payload["record"]["city"], "N/A");
}

#[tokio::test]
async fn test_ndef_text_round_trip() {
    let (service, handle) = connected(config(WireFormat::Ndef, false)).await;
    handle.present_card(MockCard::classic_1k(&UID)).await;

    let written = invoke(&service, "nfc.writeCard", json!("charging bay 7")).await;
    assert_eq!(written["success"], true);

    let read = invoke(&service, "nfc.readCard", Value::Null).await;
    assert_eq!(read["payload"]["format"], "ndef");
    assert_eq!(read["payload"]["payload"]["kind"], "plain-text");
    assert_eq!(read["payload"]["payload"]["text"], "charging bay 7");
}

#[rstest]
#[case::ndef_long_form(WireFormat::Ndef, " ".to_string() + &"x".repeat(498) + " ")]
#[case::plain(WireFormat::Plain, "y".repeat(450))]
#[tokio::test]
async fn test_long_text_reads_back_whole(#[case] format: WireFormat, #[case] text: String) {
    let (service, handle) = connected(config(format, false)).await;
    handle.present_card(MockCard::classic_1k(&UID)).await;

    let written = invoke(&service, "nfc.writeCard", json!(text)).await;
    assert_eq!(written["success"], true, "{written}");
    let blocks = written["blocks"].as_array().unwrap();
    assert_eq!(blocks[..4], [json!(4), json!(5), json!(6), json!(8)]);

    let read = invoke(&service, "nfc.readCard", Value::Null).await;
    assert_eq!(read["payload"]["format"], json!(format));
    assert_eq!(read["payload"]["payload"]["kind"], "plain-text");
    assert_eq!(read["payload"]["payload"]["text"], text);
}

#[tokio::test]
async fn test_ndef_record_on_ultralight() {
    let (service, handle) = connected(config(WireFormat::Ndef, false)).await;
    handle
        .present_card(MockCard::ultralight(&[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]))
        .await;

    let written = invoke(&service, "nfc.writeCard", json!({ "data": { "city": "Recife" } })).await;
    assert_eq!(written["success"], true, "{written}");

    let read = invoke(&service, "nfc.readCard", Value::Null).await;
    assert_eq!(read["info"]["family"], "MIFARE_ULTRALIGHT");
    assert_eq!(read["payload"]["payload"]["record"]["city"], "Recife");
}

#[tokio::test]
async fn test_shorter_write_leaves_no_stale_fields() {
    let (service, handle) = connected(config(WireFormat::Plain, false)).await;
    let stale = "NAME:Someone Else\nMOBILE:000\nCITY:Old Town\nLICENSE:OLD-0001\n".repeat(2);
    handle
        .present_card(MockCard::classic_1k(&UID).with_data(stale.as_bytes()))
        .await;

    let written = invoke(&service, "nfc.writeCard", json!("hi")).await;
    assert_eq!(written["blocks"], json!([4]));

    let read = invoke(&service, "nfc.readCard", Value::Null).await;
    assert_eq!(read["payload"]["payload"]["kind"], "plain-text");
    assert_eq!(read["payload"]["payload"]["text"], "hi");
}

#[tokio::test]
async fn test_card_errors_map_to_codes() {
    let (service, handle) = connected(config(WireFormat::Plain, false)).await;

    let response = invoke(&service, "nfc.readCard", Value::Null).await;
    assert_eq!(error_code(&response), "NO_CARD_PRESENT");

    handle
        .present_card(MockCard::classic_1k(&UID).fail_writes([5]))
        .await;
    let response = invoke(&service, "nfc.writeCard", json!("x".repeat(40))).await;
    assert_eq!(error_code(&response), "BLOCK_WRITE");
    assert!(response["error"]["message"].as_str().unwrap().contains("Block 5"));

    handle
        .present_card(MockCard::ultralight(&[0x04, 1, 2, 3, 4, 5, 6]))
        .await;
    let response = invoke(&service, "nfc.writeCard", json!("x".repeat(64))).await;
    assert_eq!(error_code(&response), "CODEC");

    let response = invoke(&service, "nfc.writeCard", json!(7)).await;
    assert_eq!(error_code(&response), "INVALID_REQUEST");

    let response = invoke(&service, "nfc.eraseCard", Value::Null).await;
    assert_eq!(error_code(&response), "UNKNOWN_OPERATION");

    // The session survives card-level failures.
    let status = invoke(&service, "nfc.getStatus", Value::Null).await;
    assert_eq!(status["connected"], true);
}

#[tokio::test]
async fn test_unplug_during_request_ends_session() {
    let (service, handle) = connected(config(WireFormat::Plain, false)).await;
    let mut rx = service.subscribe();
    handle.set_connected(false).await;

    let response = invoke(&service, "nfc.readCard", Value::Null).await;
    assert_eq!(error_code(&response), "DEVICE_IO");
    assert!(matches!(
        next_event(&mut rx).await,
        NfcEvent::DeviceDisconnected { .. }
    ));

    let status = invoke(&service, "nfc.getStatus", Value::Null).await;
    assert_eq!(status["connected"], false);
    let response = invoke(&service, "nfc.readCard", Value::Null).await;
    assert_eq!(error_code(&response), "NO_DEVICE");

    handle.set_connected(true).await;
    let refreshed = invoke(&service, "nfc.refreshDevices", Value::Null).await;
    assert_eq!(refreshed["success"], true);
    assert!(matches!(
        next_event(&mut rx).await,
        NfcEvent::DeviceConnected { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_poller_events_and_status() {
    let (reader, handle) = MockReader::new();
    let service = NfcService::new(
        config(WireFormat::Plain, true),
        Discovery::new().with_mock(reader),
    );
    let mut rx = service.subscribe();
    assert!(service.refresh_devices().await.unwrap());

    match next_event(&mut rx).await {
        NfcEvent::DeviceConnected { firmware, .. } => assert_eq!(firmware, "ACR122U207"),
        other => panic!("Expected DeviceConnected, got {other:?}"),
    }

    handle
        .present_card(MockCard::classic_1k(&UID).with_data(b"NAME:Bruno\nCITY:Natal"))
        .await;
    match next_event(&mut rx).await {
        NfcEvent::CardDetected { uid, payload, .. } => {
            assert_eq!(uid.to_hex(), "04A1B2C3");
            let payload = payload.expect("payload read on detect");
            assert_eq!(
                payload.payload.record().unwrap().city.as_deref(),
                Some("Natal")
            );
        }
        other => panic!("Expected CardDetected, got {other:?}"),
    }

    // Explicit requests interleave safely with polling.
    let written = invoke(&service, "nfc.writeCard", json!({ "holderName": "Bruno" })).await;
    assert_eq!(written["success"], true);

    let status = invoke(&service, "nfc.getStatus", Value::Null).await;
    assert_eq!(status["connected"], true);
    assert_eq!(status["polling"], true);
    assert_eq!(status["lastCardUid"], "04A1B2C3");
    assert_eq!(status["device"]["name"], "Mock ACR122U");

    handle.remove_card().await;
    assert!(matches!(
        next_event(&mut rx).await,
        NfcEvent::CardRemoved { .. }
    ));
    assert!(!handle.interleaved().await);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_poller_fault_disconnects_service() {
    let (service, handle) = connected(config(WireFormat::Plain, true)).await;
    let mut rx = service.subscribe();

    handle.set_connected(false).await;
    loop {
        if let NfcEvent::DeviceDisconnected { .. } = next_event(&mut rx).await {
            break;
        }
    }

    let status = service.get_status().await;
    assert!(!status.connected);
    assert!(!status.polling);

    let response = invoke(&service, "nfc.writeCard", json!("late")).await;
    assert_eq!(error_code(&response), "NO_DEVICE");
}
