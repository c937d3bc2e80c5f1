//! Exit code constants for the doclock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid state, misuse of a scope)
//! - 2: Store failure (read/write/encoding)
//! - 4: Lock held (active lease or exception attached)
//! - 5: Lease expired before release
//! - 6: Wait timed out

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid config, or a programming error on a scope.
pub const USER_ERROR: i32 = 1;

/// Store failure: the document store could not be read or written.
pub const STORE_FAILURE: i32 = 2;

/// Lock failure: the document is held by another lease or has an exception attached.
pub const LOCK_FAILURE: i32 = 4;

/// Lease expired: the holder's lease window elapsed before release.
pub const LEASE_EXPIRED: i32 = 5;

/// Wait timeout: no lease was released before the deadline.
pub const TIMEOUT: i32 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            STORE_FAILURE,
            LOCK_FAILURE,
            LEASE_EXPIRED,
            TIMEOUT,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn success_is_zero() {
        assert_eq!(SUCCESS, 0);
    }
}
