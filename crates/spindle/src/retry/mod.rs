//! Retry machinery: backoff policy, result checksums and operation records.
//!
//! - [`RetryPolicy`] decides how long to wait before each retry and when to give up
//! - [`ChecksumState`] fingerprints the rows a cursor has returned
//! - `RecordedOperation` keeps what each statement returned, so it can be replayed and
//!   compared on a new attempt

mod checksum;
mod policy;
pub(crate) mod recorded;

pub use checksum::{ChecksumState, DIGEST_LEN};
pub use policy::{Jitter, RetryPolicy, DEFAULT_MAX_INTERNAL_RETRY_COUNT};
