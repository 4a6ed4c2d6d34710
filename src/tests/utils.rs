//! Test utilities and helpers for unit tests

#[cfg(test)]
pub mod test_helpers {
    use tempfile::TempDir;

    /// 1x1 pixel placeholder payload, base64 encoded.
    pub const TINY_IMAGE_B64: &str = "aGVsbG8taW1hZ2U=";

    /// Create a temporary directory for testing
    pub fn create_temp_dir() -> TempDir {
        tempfile::tempdir().expect("Failed to create temp dir")
    }
}
