// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    not_found    = { CoreError::NotFound, ErrorCode::NotFound },
    no_agent     = { CoreError::NoAgentAvailable, ErrorCode::NoAgentAvailable },
    issuer_down  = { CoreError::IssuerUnavailable("timeout".into()), ErrorCode::TryAgain },
    store_down   = { CoreError::StoreUnavailable("closed".into()), ErrorCode::Internal },
    failed_store = { CoreError::assignment_failed("r1", CoreError::StoreUnavailable("x".into())),
                     ErrorCode::Internal },
    failed_issue = { CoreError::assignment_failed("r1", CoreError::IssuerUnavailable("x".into())),
                     ErrorCode::TryAgain },
    failed_pool  = { CoreError::assignment_failed("r1", CoreError::NoAgentAvailable),
                     ErrorCode::NoAgentAvailable },
)]
fn core_error_code(err: CoreError, expected: ErrorCode) {
    assert_eq!(err.code(), expected);
}

#[yare::parameterized(
    unauthorized = { ErrorCode::Unauthorized, 401 },
    bad_request  = { ErrorCode::BadRequest, 400 },
    not_found    = { ErrorCode::NotFound, 404 },
    no_agent     = { ErrorCode::NoAgentAvailable, 503 },
    try_again    = { ErrorCode::TryAgain, 503 },
    internal     = { ErrorCode::Internal, 500 },
)]
fn http_status(code: ErrorCode, expected: u16) {
    assert_eq!(code.http_status(), expected);
}

#[test]
fn assignment_failed_keeps_reason_and_detail() {
    let err = CoreError::assignment_failed("room-7", CoreError::IssuerUnavailable("502".into()));
    assert_eq!(err.reason(), FailureReason::IssuerUnavailable);

    let msg = err.to_string();
    assert!(msg.contains("room-7"), "{msg}");
    assert!(msg.contains("issuer_unavailable"), "{msg}");
    assert!(msg.contains("502"), "{msg}");
}

#[test]
fn public_messages_do_not_leak_internals() {
    for code in [ErrorCode::TryAgain, ErrorCode::Internal, ErrorCode::NoAgentAvailable] {
        let msg = code.public_message();
        assert!(!msg.contains("store"), "{msg}");
        assert!(!msg.contains("issuer"), "{msg}");
    }
}
