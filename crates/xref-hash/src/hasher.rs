use digest::Digest;
use sha1::Sha1;

use crate::ObjectId;

/// Streaming SHA-1 computation.
///
/// Data can be fed incrementally with [`update`](Hasher::update) or through
/// the [`std::io::Write`] implementation, then finalised into an
/// [`ObjectId`].
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Start an object hash: feeds the `"{type} {size}\0"` header so the
    /// payload bytes can be streamed in afterwards.
    pub fn for_object(obj_type: &str, size: u64) -> Self {
        let mut h = Self::new();
        h.update(format!("{obj_type} {size}\0").as_bytes());
        h
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the ObjectId.
    pub fn finalize(self) -> ObjectId {
        let digest = self.inner.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        ObjectId::from(bytes)
    }

    /// Convenience: hash a byte slice in one call.
    pub fn digest(data: &[u8]) -> ObjectId {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }

    /// Hash a complete git blob: `"blob {len}\0{content}"`.
    pub fn blob_oid(content: &[u8]) -> ObjectId {
        let mut h = Self::for_object("blob", content.len() as u64);
        h.update(content);
        h.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
