/// Contract violations detected by the range algebra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// The input list must be ordered by start address.
    #[error("invalid argument: range {index} starts before its predecessor")]
    Unsorted { index: usize },
}
