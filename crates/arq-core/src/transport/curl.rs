//! Default transport on libcurl (the `curl` crate).
//!
//! Each request runs one blocking `Easy` transfer on the blocking thread
//! pool via `spawn_blocking`, so the async pipeline never stalls on I/O.

use std::collections::HashMap;
use std::str;
use std::time::Duration;

use futures::future::BoxFuture;
use url::Url;

use crate::error::ApiError;
use crate::retry::parse_retry_after;

use super::{Method, RequestDescriptor, Response, Transport};

/// Libcurl-backed [`Transport`].
#[derive(Debug, Default, Clone)]
pub struct CurlTransport;

impl CurlTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for CurlTransport {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<Response, ApiError>> {
        let request = request.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || perform(&request))
                .await
                .map_err(|e| ApiError::Network {
                    message: format!("transport task failed: {e}"),
                    connect: false,
                })?
        })
    }
}

/// Runs the blocking transfer. Call from `spawn_blocking` only.
fn perform(request: &RequestDescriptor) -> Result<Response, ApiError> {
    let url = build_url(request)?;
    let (status, header_lines, body) =
        transfer(request, &url).map_err(|e| transport_error(&e, request.timeout))?;

    let (reason, headers) = parse_header_lines(&header_lines);
    if (200..300).contains(&status) {
        return Ok(Response {
            status,
            headers,
            body,
        });
    }

    let retry_after = headers
        .get("retry-after")
        .and_then(|v| parse_retry_after(v));
    let message = if reason.is_empty() {
        format!("HTTP {status}")
    } else {
        reason
    };
    Err(ApiError::Http {
        status,
        message,
        retry_after,
    })
}

/// One blocking Easy transfer: returns status code, raw header lines of the
/// final response, and the body.
fn transfer(
    request: &RequestDescriptor,
    url: &Url,
) -> Result<(u16, Vec<String>, Vec<u8>), curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url.as_str())?;
    match request.method {
        Method::Get => {}
        Method::Head => easy.nobody(true)?,
        other => easy.custom_request(other.as_str())?,
    }
    if let Some(body) = &request.body {
        easy.post_fields_copy(body)?;
    }
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.timeout(request.timeout)?;
    easy.connect_timeout(request.timeout.min(Duration::from_secs(15)))?;

    if !request.headers.is_empty() {
        let mut list = curl::easy::List::new();
        for (name, value) in &request.headers {
            list.append(&format!("{}: {}", name.trim(), value.trim()))?;
        }
        easy.http_headers(list)?;
    }

    let mut header_lines: Vec<String> = Vec::new();
    let mut body: Vec<u8> = Vec::new();
    {
        let mut t = easy.transfer();
        t.header_function(|data| {
            if let Ok(line) = str::from_utf8(data) {
                // A new status line means a redirect was followed; only the
                // final response's headers matter.
                if line.starts_with("HTTP/") {
                    header_lines.clear();
                }
                header_lines.push(line.trim_end().to_string());
            }
            true
        })?;
        t.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        t.perform()?;
    }

    let status = easy.response_code()? as u16;
    Ok((status, header_lines, body))
}

fn build_url(request: &RequestDescriptor) -> Result<Url, ApiError> {
    let mut url = Url::parse(&request.url)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid URL {}: {e}", request.url)))?;
    if !request.params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &request.params {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// Map a curl error onto the taxonomy. Connect-level failures mean the
/// request never reached the server; send/recv failures are ambiguous.
fn transport_error(e: &curl::Error, timeout: Duration) -> ApiError {
    if e.is_operation_timedout() {
        return ApiError::Timeout { timeout };
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_ssl_connect_error()
    {
        return ApiError::Network {
            message: e.to_string(),
            connect: true,
        };
    }
    ApiError::Network {
        message: e.to_string(),
        connect: false,
    }
}

/// Split collected header lines into the status-line reason phrase and a
/// lower-cased name → value map.
fn parse_header_lines(lines: &[String]) -> (String, HashMap<String, String>) {
    let mut reason = String::new();
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            // "HTTP/1.1 429 Too Many Requests" -> "Too Many Requests"
            reason = line.splitn(3, ' ').nth(2).unwrap_or_default().to_string();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    (reason, headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_appends_query_params() {
        let req = RequestDescriptor::get("https://api.example.com/items?fixed=1")
            .with_param("page", "2")
            .with_param("q", "a b");
        let url = build_url(&req).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/items?fixed=1&page=2&q=a+b"
        );
    }

    #[test]
    fn build_url_rejects_garbage() {
        let req = RequestDescriptor::get("not a url");
        assert!(matches!(build_url(&req), Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn parse_header_lines_keeps_reason_and_lowercases_names() {
        let lines = vec![
            "HTTP/1.1 429 Too Many Requests".to_string(),
            "Retry-After: 5".to_string(),
            "Content-Type: application/json".to_string(),
            "".to_string(),
        ];
        let (reason, headers) = parse_header_lines(&lines);
        assert_eq!(reason, "Too Many Requests");
        assert_eq!(headers.get("retry-after").map(String::as_str), Some("5"));
        assert_eq!(
            headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn redirect_headers_are_discarded() {
        // Simulates the header_function reset: only lines after the last
        // status line are parsed.
        let lines = vec![
            "HTTP/1.1 200 OK".to_string(),
            "X-Final: yes".to_string(),
        ];
        let (reason, headers) = parse_header_lines(&lines);
        assert_eq!(reason, "OK");
        assert_eq!(headers.get("x-final").map(String::as_str), Some("yes"));
    }
}
