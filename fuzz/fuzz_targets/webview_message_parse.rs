#![no_main]

use libfuzzer_sys::fuzz_target;
use minicline_protobus::{
    best_effort_request_id, parse_webview_message, EnvelopeError, WebviewMessage,
};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = serde_json::from_slice::<Value>(data) else {
        return;
    };
    let sent_id = raw
        .get("grpc_request")
        .and_then(|payload| payload.get("request_id"))
        .and_then(Value::as_str);
    let recovered = best_effort_request_id(&raw);
    if let Some(request_id) = recovered.as_deref() {
        assert_eq!(Some(request_id), sent_id);
        assert!(!request_id.trim().is_empty());
    }

    match parse_webview_message(&raw) {
        Ok(WebviewMessage::GrpcRequest { grpc_request }) => {
            assert!(!grpc_request.request_id.trim().is_empty());
            assert_eq!(Some(grpc_request.request_id.as_str()), sent_id);
            assert!(!grpc_request.service.trim().is_empty());
            assert!(!grpc_request.method.trim().is_empty());
        }
        Err(EnvelopeError::Malformed {
            request_id: Some(request_id),
            ..
        }) => {
            assert!(!request_id.trim().is_empty());
            assert_eq!(Some(request_id.as_str()), sent_id);
        }
        Err(_) => {}
    }
});
