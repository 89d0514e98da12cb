use std::fmt;

/// Opaque locator for a remotely hosted photo. The remote serves pre-scaled
/// variants when a size suffix is appended to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUrl(pub String);

impl PhotoUrl {
    /// Retrieval URL for a server-side pre-scaled variant bounded by
    /// `width` x `height`.
    pub fn sized(&self, width: u32, height: u32) -> String {
        format!("{}=w{width}-h{height}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhotoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
