//! `may_minihttp` adapter for the jaspel API router.

use jaspel::api::{ApiRequest, ApiResponse, Method, Router};
use may_minihttp::{HttpService, Request, Response};
use std::io::{self, Read};

/// Largest request body accepted, in bytes.
const MAX_BODY: u64 = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct JaspelService {
    router: Router,
}

impl JaspelService {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

// may_minihttp only takes 'static header lines
fn content_type_header(content_type: &str) -> &'static str {
    match content_type {
        "text/csv; charset=utf-8" => "Content-Type: text/csv; charset=utf-8",
        "text/html; charset=utf-8" => "Content-Type: text/html; charset=utf-8",
        "text/plain; charset=utf-8" => "Content-Type: text/plain; charset=utf-8",
        _ => "Content-Type: application/json",
    }
}

fn disposition_header(content_type: &str) -> Option<&'static str> {
    match content_type {
        "text/csv; charset=utf-8" => {
            Some("Content-Disposition: attachment; filename=\"jaspel-tervalidasi.csv\"")
        }
        "text/html; charset=utf-8" => {
            Some("Content-Disposition: inline; filename=\"jaspel-tervalidasi.html\"")
        }
        _ => None,
    }
}

fn to_api_request(req: Request) -> io::Result<ApiRequest> {
    let mut api = ApiRequest::new(Method::parse(req.method()), req.path());
    for header in req.headers() {
        api = api.with_header(header.name, String::from_utf8_lossy(header.value).into_owned());
    }

    let mut body = Vec::new();
    req.body().take(MAX_BODY).read_to_end(&mut body)?;
    Ok(api.with_body(body))
}

fn write_response(api: ApiResponse, res: &mut Response) {
    res.status_code(usize::from(api.status), api.reason());
    res.header(content_type_header(api.content_type));
    if let Some(disposition) = disposition_header(api.content_type) {
        res.header(disposition);
    }
    for (name, value) in &api.headers {
        log::trace!(target: "jaspel::http", "dropping dynamic header {}: {}", name, value);
    }
    res.body_vec(api.body);
}

#[cfg(feature = "metrics")]
fn metrics_response(res: &mut Response) {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => {
            res.status_code(200, "OK");
            res.header("Content-Type: text/plain; version=0.0.4; charset=utf-8");
            res.body_vec(buffer);
        }
        Err(e) => {
            log::error!(target: "jaspel::http", "failed to encode metrics: {}", e);
            res.status_code(500, "Internal Server Error");
        }
    }
}

impl HttpService for JaspelService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        #[cfg(feature = "metrics")]
        if req.path() == "/metrics" {
            metrics_response(res);
            return Ok(());
        }

        let api_request = match to_api_request(req) {
            Ok(api_request) => api_request,
            Err(e) => {
                log::warn!(target: "jaspel::http", "failed to read request: {}", e);
                res.status_code(400, "Bad Request");
                return Ok(());
            }
        };
        write_response(self.router.handle(api_request), res);
        Ok(())
    }
}
