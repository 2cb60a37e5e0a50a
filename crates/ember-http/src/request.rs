use thiserror::Error;

use crate::StatusCode;

/// Request method, recognized by the token the request line starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Unknown,
}

const METHODS: [(&[u8], Method); 8] = [
    (b"GET ", Method::Get),
    (b"HEAD ", Method::Head),
    (b"POST ", Method::Post),
    (b"PUT ", Method::Put),
    (b"DELETE ", Method::Delete),
    (b"CONNECT ", Method::Connect),
    (b"OPTIONS ", Method::Options),
    (b"TRACE ", Method::Trace),
];

impl Method {
    /// Match the method token at the start of a request line.
    ///
    /// The token has to be followed by a space, so `GETX /` and `GE` are both unknown.
    pub fn from_request_line(line: &[u8]) -> Self {
        METHODS
            .iter()
            .find(|(token, _)| line.starts_with(token))
            .map(|(_, method)| *method)
            .unwrap_or(Method::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Unknown => "UNKNOWN",
        }
    }
}

/// The parts of a request header the router needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Request target without query string.
    pub path: String,
    pub content_length: Option<usize>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("unknown request method")]
    UnknownMethod,
    #[error("request header exceeds {0} bytes")]
    HeaderTooLarge(usize),
    #[error("invalid content length")]
    InvalidContentLength,
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::HeaderTooLarge(_) => StatusCode::HEADER_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Parse a complete request header, terminator included.
pub fn parse(header: &[u8]) -> Result<Request, RequestError> {
    let mut lines = header
        .split(|byte| *byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

    let request_line = lines.next().ok_or(RequestError::MalformedRequestLine)?;

    let method = Method::from_request_line(request_line);
    if method == Method::Unknown {
        return Err(RequestError::UnknownMethod);
    }

    let path = parse_target(request_line)?;

    let mut content_length = None;
    for line in lines {
        // Empty line ends the header
        if line.is_empty() {
            break;
        }

        let Some((name, value)) = split_field(line) else {
            return Err(RequestError::MalformedRequestLine);
        };

        if name.eq_ignore_ascii_case(b"content-length") {
            content_length = Some(parse_content_length(value)?);
        }
    }

    Ok(Request {
        method,
        path,
        content_length,
    })
}

fn parse_target(request_line: &[u8]) -> Result<String, RequestError> {
    let target = request_line
        .split(|byte| *byte == b' ')
        .filter(|token| !token.is_empty())
        .nth(1)
        .ok_or(RequestError::MalformedRequestLine)?;

    let target = std::str::from_utf8(target).map_err(|_| RequestError::MalformedRequestLine)?;
    if !target.starts_with('/') {
        return Err(RequestError::MalformedRequestLine);
    }

    let path = match target.split_once('?') {
        Some((path, _query)) => path,
        None => target,
    };

    Ok(path.to_string())
}

fn split_field(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let split = line.iter().position(|byte| *byte == b':')?;
    let (name, value) = line.split_at(split);

    Some((name.trim_ascii(), value[1..].trim_ascii()))
}

fn parse_content_length(value: &[u8]) -> Result<usize, RequestError> {
    std::str::from_utf8(value)
        .ok()
        .filter(|value| !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|value| value.parse().ok())
        .ok_or(RequestError::InvalidContentLength)
}
