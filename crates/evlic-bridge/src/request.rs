//! String-named requests for the IPC layer.
//!
//! | Operation            | Payload            | Result                                      |
//! |----------------------|--------------------|---------------------------------------------|
//! | `nfc.getStatus`      | ignored            | `{ connected, device, polling, lastCardUid }` |
//! | `nfc.readCard`       | ignored            | card info and decoded payload               |
//! | `nfc.writeCard`      | record or string   | `{ success, uid, bytesWritten, blocks }`    |
//! | `nfc.refreshDevices` | ignored            | `{ success }`                               |
//!
//! [`invoke`] never fails: errors come back as
//! `{ "success": false, "error": { "code", "message" } }`.

use std::fmt;
use std::str::FromStr;

use evlic_codec::WritePayload;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::service::NfcService;
use crate::{BridgeError, BridgeResult};

/// Requests the UI can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetStatus,
    ReadCard,
    WriteCard,
    RefreshDevices,
}

impl Operation {
    /// Wire name of the operation.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::GetStatus => "nfc.getStatus",
            Self::ReadCard => "nfc.readCard",
            Self::WriteCard => "nfc.writeCard",
            Self::RefreshDevices => "nfc.refreshDevices",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nfc.getStatus" => Ok(Self::GetStatus),
            "nfc.readCard" => Ok(Self::ReadCard),
            "nfc.writeCard" => Ok(Self::WriteCard),
            "nfc.refreshDevices" => Ok(Self::RefreshDevices),
            other => Err(BridgeError::UnknownOperation(other.to_string())),
        }
    }
}

/// Run `operation` and return its JSON result, or a JSON error body.
pub async fn invoke(service: &NfcService, operation: &str, payload: Value) -> Value {
    let result = match operation.parse::<Operation>() {
        Ok(operation) => dispatch(service, operation, payload).await,
        Err(e) => Err(e),
    };
    result.unwrap_or_else(|e| {
        warn!(operation, code = e.code(), error = %e, "Request failed");
        json!({
            "success": false,
            "error": { "code": e.code(), "message": e.to_string() },
        })
    })
}

/// Run `operation` and return its JSON result.
///
/// # Errors
/// Returns the operation's error, or `InvalidRequest` for a write payload
/// that is neither a record nor a string.
pub async fn dispatch(
    service: &NfcService,
    operation: Operation,
    payload: Value,
) -> BridgeResult<Value> {
    debug!(%operation, "Request");
    match operation {
        Operation::GetStatus => Ok(serde_json::to_value(service.get_status().await)?),
        Operation::ReadCard => Ok(serde_json::to_value(service.read_card().await?)?),
        Operation::WriteCard => {
            let payload = write_payload(payload)?;
            let outcome = service.write_card(&payload).await?;
            Ok(json!({
                "success": true,
                "uid": outcome.uid,
                "bytesWritten": outcome.bytes_written,
                "blocks": outcome.blocks,
            }))
        }
        Operation::RefreshDevices => {
            let success = service.refresh_devices().await?;
            Ok(json!({ "success": success }))
        }
    }
}

/// Accepts a record object, a string, or either wrapped as `{ "data": ... }`.
fn write_payload(payload: Value) -> BridgeResult<WritePayload> {
    let payload = match payload {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    match payload {
        Value::String(text) => Ok(WritePayload::Text(text)),
        Value::Object(_) => Ok(WritePayload::Record(serde_json::from_value(payload)?)),
        other => Err(BridgeError::InvalidRequest(format!(
            "write payload must be a record or a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("nfc.getStatus", Operation::GetStatus)]
    #[case("nfc.readCard", Operation::ReadCard)]
    #[case("nfc.writeCard", Operation::WriteCard)]
    #[case("nfc.refreshDevices", Operation::RefreshDevices)]
    fn test_operation_names(#[case] name: &str, #[case] operation: Operation) {
        assert_eq!(name.parse::<Operation>().unwrap(), operation);
        assert_eq!(operation.to_string(), name);
    }

    #[test]
    fn test_unknown_operation() {
        let err = "nfc.formatCard".parse::<Operation>().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_OPERATION");
    }

    #[test]
    fn test_write_payload_shapes() {
        assert_eq!(
            write_payload(json!("hello")).unwrap(),
            WritePayload::Text("hello".into())
        );
        assert_eq!(
            write_payload(json!({ "data": "hello" })).unwrap(),
            WritePayload::Text("hello".into())
        );

        let WritePayload::Record(record) =
            write_payload(json!({ "holderName": "Ana", "city": "N/A" })).unwrap()
        else {
            panic!("expected a record");
        };
        assert_eq!(record.holder_name.as_deref(), Some("Ana"));
        assert_eq!(record.city, None);
    }

    #[rstest]
    #[case(json!(null))]
    #[case(json!(42))]
    #[case(json!(["a"]))]
    fn test_write_payload_rejects(#[case] payload: Value) {
        let err = write_payload(payload).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }
}
