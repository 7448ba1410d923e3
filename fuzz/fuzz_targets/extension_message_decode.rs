#![no_main]

use libfuzzer_sys::fuzz_target;
use minicline_protobus::{response_request_id, ExtensionMessage, ResponseOutcome};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = serde_json::from_slice::<Value>(data) else {
        return;
    };
    let correlated = response_request_id(&raw);
    let Ok(ExtensionMessage::GrpcResponse { grpc_response }) =
        serde_json::from_value::<ExtensionMessage>(raw.clone())
    else {
        return;
    };

    assert_eq!(correlated, Some(grpc_response.request_id.as_str()));
    match grpc_response.outcome() {
        ResponseOutcome::Message(_) => assert!(grpc_response.message.is_some()),
        ResponseOutcome::Error(_) => {
            assert!(grpc_response.message.is_none());
            assert!(grpc_response.is_error());
        }
        ResponseOutcome::Malformed => {
            assert!(grpc_response.message.is_none());
            assert!(grpc_response.error.is_none());
        }
    }
});
