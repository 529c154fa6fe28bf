//! The resource-provider boundary.
//!
//! The core never opens files itself: callers hand in something that can
//! resolve a logical resource name (a dictionary name, an alias) to a
//! readable byte stream. Implementations may consult filesystem paths,
//! environment-configured directories, or embedded blobs, and may
//! transparently decompress; none of that is visible here.

use std::io::Read;

/// Resolve a logical resource name to a byte stream.
pub trait ResourceProvider: Send + Sync {
    fn load_resource(&self, name: &str) -> Option<Box<dyn Read + Send>>;
}

/// Any `Fn(&str) -> Option<Box<dyn Read + Send>>` closure is a provider.
impl<F> ResourceProvider for F
where
    F: Fn(&str) -> Option<Box<dyn Read + Send>> + Send + Sync,
{
    fn load_resource(&self, name: &str) -> Option<Box<dyn Read + Send>> {
        self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_provider() {
        let provider = |name: &str| {
            if name == "hello" {
                Some(Box::new("world".as_bytes()) as Box<dyn Read + Send>)
            } else {
                None
            }
        };
        let mut out = String::new();
        provider
            .load_resource("hello")
            .expect("stream")
            .read_to_string(&mut out)
            .expect("read");
        assert_eq!(out, "world");
        assert!(provider.load_resource("other").is_none());
    }
}
