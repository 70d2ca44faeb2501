//! Read-only HTML dashboard listing every metric by name.

use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tally_service::value::{format_counter, format_gauge};
use tracing::error;

use crate::AppState;

/// One rendered row; values are preformatted in the text wire format.
pub struct MetricRow {
    pub name: String,
    pub value: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    gauges: Vec<MetricRow>,
    counters: Vec<MetricRow>,
}

fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(
        tmpl.render()
            .unwrap_or_else(|e| format!("<pre>Template error: {e}</pre>")),
    )
}

/// GET /
pub async fn index(State(state): State<AppState>) -> Response {
    let snapshot = match state.service.snapshot().await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to read metrics for dashboard");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
        }
    };

    // BTreeMap iteration is already sorted by name.
    let gauges = snapshot
        .gauges
        .into_iter()
        .map(|(name, v)| MetricRow {
            name,
            value: format_gauge(v),
        })
        .collect();
    let counters = snapshot
        .counters
        .into_iter()
        .map(|(name, v)| MetricRow {
            name,
            value: format_counter(v),
        })
        .collect();

    render(IndexTemplate { gauges, counters }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_rows_with_escaping() {
        let tmpl = IndexTemplate {
            gauges: vec![
                MetricRow {
                    name: "alpha".into(),
                    value: "1".into(),
                },
                MetricRow {
                    name: "<script>".into(),
                    value: "2.5".into(),
                },
            ],
            counters: Vec::new(),
        };
        let html = tmpl.render().unwrap();
        assert!(html.contains("<li>alpha: 1</li>"));
        assert!(html.contains("<li>&#60;script&#62;: 2.5</li>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("No counters"));
    }

    #[test]
    fn empty_state_shows_placeholders() {
        let tmpl = IndexTemplate {
            gauges: Vec::new(),
            counters: Vec::new(),
        };
        let html = tmpl.render().unwrap();
        assert!(html.contains("No gauges"));
        assert!(html.contains("No counters"));
    }
}
