use core::fmt::Display;

use tracing::error;

fn log_and_panic<Err: Display>(error: Err, message: &str) -> ! {
    error!("{message}: {error}");

    panic!("{message}: {error}");
}

/// Extension trait for results.
pub trait Failure<T> {
    /// Log an error and panic.
    ///
    /// Reserved for unrecoverable startup failures in binaries.
    fn or_log_and_panic(self, message: &str) -> T;
}

impl<T, E: Display> Failure<T> for Result<T, E> {
    fn or_log_and_panic(self, message: &str) -> T {
        match self {
            Ok(value) => value,
            Err(error) => log_and_panic(error, message),
        }
    }
}
