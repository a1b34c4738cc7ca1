pub mod file;
pub mod status;
pub mod traits;

// Re-export
pub use file::FileLedgerRepository;
pub use status::ScheduleStatusFile;
pub use traits::LedgerRepository;
