//! Utility macros shared by the codec and body implementations.

/// Returns early with an error if a condition is not met.
///
/// Like `assert!`, but returns `Err($error)` instead of panicking. Used for framing and body
/// contract checks where the caller must see the violation as a regular error.
///
/// # Example
///
/// ```ignore
/// ensure!(size <= max_size, CodecError::frame_too_large(size, max_size));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
