//! Multipart/form-data body builder for daemon uploads.
//!
//! The daemon's parser is sensitive to the exact framing, so the builder
//! emits the same layout for every part: boundary line, disposition,
//! content type, blank line, raw bytes, CRLF.

use bytes::{BufMut, Bytes, BytesMut};

/// Boundary marker used for every upload
pub const DEFAULT_BOUNDARY: &str = "----WebKitFormBoundary7MA4YWxkTrZu0gW";

/// Content type attached to file parts
pub const OCTET_STREAM: &str = "application/octet-stream";

struct Part {
    name: String,
    filename: String,
    content_type: String,
    data: Bytes,
}

/// Owns buffered parts until [`MultipartBuilder::finish`] joins them
pub struct MultipartBuilder {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartBuilder {
    /// Create a builder using the default boundary
    pub fn new() -> Self {
        Self::with_boundary(DEFAULT_BOUNDARY)
    }

    /// Create a builder with a custom boundary
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// Append a binary file part
    pub fn file(self, name: &str, filename: &str, data: Bytes) -> Self {
        self.part(name, filename, OCTET_STREAM, data)
    }

    /// Append a part with an explicit content type
    pub fn part(mut self, name: &str, filename: &str, content_type: &str, data: Bytes) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            data,
        });
        self
    }

    /// Value for the request's Content-Type header
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Serialize all parts and the closing delimiter into one buffer
    pub fn finish(self) -> Bytes {
        let payload_len: usize = self.parts.iter().map(|p| p.data.len()).sum();
        let mut buf = BytesMut::with_capacity(payload_len + 256 * (self.parts.len() + 1));

        for part in &self.parts {
            buf.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
            buf.put_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    part.name, part.filename
                )
                .as_bytes(),
            );
            buf.put_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
            buf.put_slice(&part.data);
            buf.put_slice(b"\r\n");
        }

        buf.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        buf.freeze()
    }
}

impl Default for MultipartBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_wire_format() {
        let body = MultipartBuilder::new()
            .file("file", "payload.bin", Bytes::from_static(b"hello"))
            .finish();

        let expected = concat!(
            "------WebKitFormBoundary7MA4YWxkTrZu0gW\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"payload.bin\"\r\n",
            "Content-Type: application/octet-stream\r\n\r\n",
            "hello\r\n",
            "------WebKitFormBoundary7MA4YWxkTrZu0gW--\r\n"
        );
        assert_eq!(body, Bytes::from(expected));
    }

    #[test]
    fn test_content_type_header() {
        let builder = MultipartBuilder::with_boundary("xyz");
        assert_eq!(builder.content_type(), "multipart/form-data; boundary=xyz");
    }

    #[test]
    fn test_binary_data_is_untouched() {
        let data: Vec<u8> = (0..=255u8).collect();
        let body = MultipartBuilder::with_boundary("b")
            .file("file", "f", Bytes::from(data.clone()))
            .finish();

        let header = b"--b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"f\"\r\nContent-Type: application/octet-stream\r\n\r\n";
        assert_eq!(&body[..header.len()], header);
        assert_eq!(&body[header.len()..header.len() + 256], data.as_slice());
        assert!(body.ends_with(b"\r\n--b--\r\n"));
    }

    #[test]
    fn test_empty_builder_only_closes() {
        let body = MultipartBuilder::with_boundary("b").finish();
        assert_eq!(body, Bytes::from_static(b"--b--\r\n"));
    }
}
