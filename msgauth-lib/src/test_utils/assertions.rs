//! Assertion helpers shared by tests across both crates.

use crate::errors::{AuthError, AuthErrorCode};

/// Assert that a result failed with the given error code.
///
/// # Panics
/// Panics if the result succeeded or failed with a different code.
pub fn assert_fails_with<T: std::fmt::Debug>(
    result: &Result<T, AuthError>,
    expected: AuthErrorCode,
) {
    match result {
        Ok(value) => panic!("expected failure with {expected:?}, got Ok({value:?})"),
        Err(err) => assert_eq!(
            err.code(),
            expected,
            "expected error code {expected:?}, got {:?} ({err})",
            err.code()
        ),
    }
}

/// Assert that a result succeeded, returning the value for further
/// inspection.
///
/// # Panics
/// Panics if the result failed.
pub fn assert_ok<T>(result: Result<T, AuthError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("expected success, got error: {err}"),
    }
}
