//! Source device identity as reported by an external enumerator.

/// Identity of a raw source to be imaged.
///
/// Produced by device enumeration (or by probing a plain file) and treated
/// as immutable by the engine. The engine never rediscovers size or block
/// size mid-copy; both must be resolved before a job starts.
#[derive(Debug, Clone)]
pub struct Device {
    pub identity: String,
    pub label: String,
    pub size_bytes: u64,
    pub native_block_size: u64,
}

impl Device {
    pub fn new(
        identity: impl Into<String>,
        label: impl Into<String>,
        size_bytes: u64,
        native_block_size: u64,
    ) -> Self {
        Self {
            identity: identity.into(),
            label: label.into(),
            size_bytes,
            native_block_size: native_block_size.max(1),
        }
    }

    pub fn human_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;
        const TB: u64 = GB * 1024;

        if self.size_bytes >= TB {
            format!("{:.2} TB", self.size_bytes as f64 / TB as f64)
        } else if self.size_bytes >= GB {
            format!("{:.2} GB", self.size_bytes as f64 / GB as f64)
        } else if self.size_bytes >= MB {
            format!("{:.2} MB", self.size_bytes as f64 / MB as f64)
        } else if self.size_bytes >= KB {
            format!("{:.2} KB", self.size_bytes as f64 / KB as f64)
        } else {
            format!("{} B", self.size_bytes)
        }
    }

    pub fn display(&self) -> String {
        format!("{} ({}) - {}", self.identity, self.label, self.human_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        let device = Device::new("/dev/test", "test", 1024 * 1024 * 1024, 512);
        assert_eq!(device.human_size(), "1.00 GB");

        let small = Device::new("/dev/test", "test", 100, 512);
        assert_eq!(small.human_size(), "100 B");
    }

    #[test]
    fn test_native_block_size_never_zero() {
        let device = Device::new("/dev/test", "test", 4096, 0);
        assert_eq!(device.native_block_size, 1);
    }
}
