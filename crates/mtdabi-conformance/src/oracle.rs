//! Assertion oracle
//!
//! Every check compares an observation against a pinned expectation and
//! fails with an [`OracleError`] that names what was being checked. Error
//! codes are compared by identity: `EOPNOTSUPP` and `ENOTSUPP` are different
//! outcomes even though both read as "not supported".

use core::fmt;

use mtdabi_ioctl::{Errno, MtdError};

use crate::error::{OracleError, ScenarioError};

/// Result of a device call as far as the oracle is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeded
    Ok,
    /// The call failed with this errno
    Err(Errno),
}

impl From<Errno> for Outcome {
    fn from(errno: Errno) -> Self {
        Outcome::Err(errno)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => write!(f, "no error"),
            Outcome::Err(errno) => write!(f, "'{}'", errno),
        }
    }
}

/// Require `result` to end with exactly `want`
///
/// Returns the value on success. A failure that carries no errno (such as a
/// failed open) is passed through as a device error.
pub fn expect_outcome<T>(
    what: &str,
    want: Outcome,
    result: Result<T, MtdError>,
) -> Result<Option<T>, ScenarioError> {
    let (got, value) = match result {
        Ok(value) => (Outcome::Ok, Some(value)),
        Err(e) => match e.errno() {
            Some(errno) => (Outcome::Err(errno), None),
            None => return Err(e.into()),
        },
    };
    if got != want {
        return Err(OracleError::OutcomeMismatch {
            what: what.to_string(),
            want,
            got,
        }
        .into());
    }
    Ok(value)
}

/// Require `result` to succeed and hand back its value
pub fn expect_ok<T>(what: &str, result: Result<T, MtdError>) -> Result<T, ScenarioError> {
    let errno = match result {
        Ok(value) => return Ok(value),
        Err(e) => e.errno().ok_or(e)?,
    };
    Err(OracleError::OutcomeMismatch {
        what: what.to_string(),
        want: Outcome::Ok,
        got: Outcome::Err(errno),
    }
    .into())
}

/// Require `result` to fail with exactly `want`
pub fn expect_errno<T>(
    what: &str,
    want: Errno,
    result: Result<T, MtdError>,
) -> Result<(), ScenarioError> {
    expect_outcome(what, Outcome::Err(want), result).map(drop)
}

/// Deep structural equality
pub fn expect_eq<T: PartialEq + fmt::Debug>(
    what: &str,
    want: &T,
    got: &T,
) -> Result<(), OracleError> {
    if want != got {
        return Err(OracleError::ValueMismatch {
            what: what.to_string(),
            want: format!("{:x?}", want),
            got: format!("{:x?}", got),
        });
    }
    Ok(())
}

/// Exactly `want` bytes came back
pub fn expect_len(what: &str, want: usize, got: &[u8]) -> Result<(), OracleError> {
    if got.len() != want {
        return Err(OracleError::LengthMismatch {
            what: what.to_string(),
            want,
            got: got.len(),
        });
    }
    Ok(())
}

/// Exact byte equality, reporting the first differing offset
pub fn expect_bytes(what: &str, want: &[u8], got: &[u8]) -> Result<(), OracleError> {
    if want.len() != got.len() {
        return Err(OracleError::LengthMismatch {
            what: what.to_string(),
            want: want.len(),
            got: got.len(),
        });
    }
    match want.iter().zip(got).position(|(a, b)| a != b) {
        Some(offset) => Err(OracleError::BytesDiffer {
            what: what.to_string(),
            offset,
            want: want[offset],
            got: got[offset],
        }),
        None => Ok(()),
    }
}

/// Every byte reads as erased flash (0xFF)
pub fn expect_erased(what: &str, got: &[u8]) -> Result<(), OracleError> {
    match got.iter().position(|&b| b != 0xFF) {
        Some(offset) => Err(OracleError::NotErased {
            what: what.to_string(),
            offset,
            found: got[offset],
        }),
        None => Ok(()),
    }
}
