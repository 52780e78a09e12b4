use super::envelope;
use super::handlers;
use super::{ApiRequest, ApiResponse, Method};
use crate::error::Result;
use crate::service::AppState;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

type Handler = fn(&AppState, &ApiRequest, &[&str]) -> Result<ApiResponse>;

struct Route {
    method: Method,
    pattern: Regex,
    handler: Handler,
}

fn route(method: Method, pattern: &str, handler: Handler) -> Route {
    Route {
        method,
        pattern: Regex::new(pattern).expect("route patterns are valid regexes"),
        handler,
    }
}

static ROUTES: Lazy<Vec<Route>> = Lazy::new(|| {
    use Method::{Get, Post};
    vec![
        route(Get, r"^/health$", handlers::health),
        route(Get, r"^/api/v2/validated-jaspel-data$", handlers::validated_jaspel_data),
        route(Get, r"^/api/v2/jaspel-reports/([a-z_-]+)$", handlers::jaspel_report),
        route(Get, r"^/api/v2/jaspel-summary/(\d+)$", handlers::jaspel_summary),
        route(Post, r"^/api/v2/jaspel-export$", handlers::jaspel_export),
        route(Get, r"^/api/v2/validation-counts$", handlers::validation_counts),
        route(Post, r"^/api/v2/validation-cache/clear$", handlers::clear_cache),
        route(Post, r"^/api/v2/jaspel$", handlers::create_jaspel),
        route(Post, r"^/api/v2/validations/bulk$", handlers::bulk_validate),
        route(Post, r"^/api/v2/validations/([a-z_-]+)/(\d+)$", handlers::validate),
        route(Get, r"^/api/v2/audit/([a-z_-]+)/(\d+)$", handlers::audit_history),
        route(Post, r"^/api/v2/calculate/patient-count$", handlers::preview_patient_count),
        route(Post, r"^/api/v2/calculate/procedure$", handlers::preview_procedure),
        route(Get, r"^/api/v2/dashboard/summary$", handlers::dashboard_summary),
        route(Post, r"^/api/v2/users$", handlers::create_user),
        route(Post, r"^/api/v2/fee-formulas$", handlers::create_formula),
        route(Post, r"^/api/v2/procedure-types$", handlers::create_procedure_type),
        route(Post, r"^/api/v2/schedules$", handlers::create_schedule),
        route(Post, r"^/api/v2/procedures$", handlers::submit_procedure),
        route(Post, r"^/api/v2/patient-counts$", handlers::submit_patient_count),
    ]
});

/// Dispatches requests to the handlers.
#[derive(Debug, Clone)]
pub struct Router {
    state: AppState,
}

impl Router {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn handle(&self, request: ApiRequest) -> ApiResponse {
        #[cfg(feature = "tracing")]
        let _span =
            tracing_helpers::request_span(&request.method.to_string(), &request.path).entered();

        let started = Instant::now();
        let response = self.dispatch(&request);
        log::info!(
            target: "jaspel::api",
            "{} {} -> {} ({} ms)",
            request.method,
            request.path,
            response.status,
            started.elapsed().as_millis()
        );
        response
    }

    fn dispatch(&self, request: &ApiRequest) -> ApiResponse {
        let mut path_matched = false;
        for route in ROUTES.iter() {
            let Some(captures) = route.pattern.captures(&request.path) else {
                continue;
            };
            if route.method != request.method {
                path_matched = true;
                continue;
            }
            let params: Vec<&str> = captures
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect();
            return match (route.handler)(&self.state, request, &params) {
                Ok(response) => response,
                Err(err) => envelope::from_error(&err, self.state.config.app.debug),
            };
        }

        if path_matched {
            envelope::failure(405, "Metode tidak diizinkan")
        } else {
            envelope::failure(404, "Endpoint tidak ditemukan")
        }
    }
}
