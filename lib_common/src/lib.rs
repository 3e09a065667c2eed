// Declare the modules to re-export. Each folder is gated by the feature of the same name.
#[cfg(feature = "configs")]
pub mod configs; // Static settings and runtime display options
#[cfg(feature = "core")]
pub mod core; // Scheduling, aggregate state, sunrise/sunset and update fan-out
#[cfg(feature = "feeds")]
pub mod feeds; // Burble, METAR and winds aloft normalizers
#[cfg(feature = "jumprun")]
pub mod jumprun; // The persisted jump run path
#[cfg(feature = "retrieve")]
pub mod retrieve; // HTTP client with retries and cookies
#[cfg(feature = "utils")]
pub mod utils; // Tolerant decoding helpers
