use std::{fmt::Write as _, time::SystemTime};

use bytes::Bytes;

/// Response status code.
///
/// The constants cover the full status table of the server. `NO_CONTENT` and `UNAUTHORIZED`
/// are formatted like any other status, but no route answers with them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const HEADER_TOO_LARGE: StatusCode = StatusCode(431);

    /// Reason phrase sent on the status line.
    pub fn reason(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            431 => "Request Header Fields Too Large",
            _ => "Unknown",
        }
    }
}

/// Everything needed to format a response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub content_length: usize,
    pub content_type: Option<&'static str>,
}

impl ResponseHead {
    /// A response without body.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_length: 0,
            content_type: None,
        }
    }

    pub fn ok(content_length: usize) -> Self {
        Self {
            status: StatusCode::OK,
            content_length,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Format the header, stamped with the current time.
    pub fn build(&self) -> Bytes {
        self.build_at(SystemTime::now())
    }

    pub fn build_at(&self, time: SystemTime) -> Bytes {
        let mut header = String::new();

        // Writing to a String can't fail
        let _ = write!(header, "HTTP/1.1 {} {}\r\n", self.status.0, self.status.reason());
        let _ = write!(header, "Date: {}\r\n", httpdate::fmt_http_date(time));
        header.push_str("Connection: close\r\n");
        let _ = write!(header, "Content-Length: {}\r\n", self.content_length);
        if let Some(content_type) = self.content_type {
            let _ = write!(header, "Content-Type: {}\r\n", content_type);
        }
        header.push_str("\r\n");

        Bytes::from(header)
    }
}
