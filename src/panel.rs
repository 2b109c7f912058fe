//! Status panel front end
//! Renders the latest status snapshot as a page and routes logout back into the poller

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use html_escape::encode_text;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Labels;
use crate::poller::{LogoutOutcome, StatusPoller};
use crate::session::PanelSession;
use crate::status::{ConnectionEntry, StatusView};

/// Everything the panel routes need
pub struct PanelState {
    pub poller: StatusPoller,
    pub session: Arc<PanelSession>,
    pub labels: Labels,
}

/// Create the panel router
pub fn panel_router(state: Arc<PanelState>) -> Router {
    Router::new()
        .route("/", get(panel_handler))
        .route("/logout", get(logout_handler).post(logout_handler))
        .route("/api/status", get(api_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn panel_handler(State(state): State<Arc<PanelState>>) -> Response {
    if let Some(target) = state.session.take_redirect() {
        return Redirect::to(target).into_response();
    }

    let view = state.poller.current();
    let user = state.session.current_user();
    Html(render_panel(
        &state.labels,
        view.as_deref(),
        state.poller.is_busy(),
        user.as_deref(),
    ))
    .into_response()
}

async fn logout_handler(State(state): State<Arc<PanelState>>) -> Response {
    match state.poller.logout().await {
        LogoutOutcome::Completed => {
            let target = state
                .session
                .take_redirect()
                .unwrap_or_else(|| state.session.entry_url());
            Redirect::to(target).into_response()
        }
        LogoutOutcome::Skipped => Redirect::to("/").into_response(),
    }
}

async fn api_status(State(state): State<Arc<PanelState>>) -> Response {
    let view = state.poller.current();
    Json(serde_json::json!({
        "busy": state.poller.is_busy(),
        "status": view.as_deref(),
    }))
    .into_response()
}

/// Text value, or the fallback when missing or empty
fn text_or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    value.filter(|v| !v.is_empty()).unwrap_or(fallback)
}

/// Port number, or the fallback when missing or zero
fn port_or(value: Option<u16>, fallback: &str) -> String {
    match value {
        Some(port) if port != 0 => port.to_string(),
        _ => fallback.to_string(),
    }
}

fn connection_card(title: &str, css: &str, entries: Option<&Vec<ConnectionEntry>>) -> String {
    let entries = match entries {
        Some(e) if !e.is_empty() => e,
        _ => return String::new(),
    };

    let items: String = entries
        .iter()
        .map(|e| {
            format!(
                r#"<li>{} &bull; {}</li>"#,
                encode_text(&e.key),
                encode_text(&e.description)
            )
        })
        .collect();

    format!(
        r#"<details class="card {}" open>
            <summary>{}</summary>
            <ul>{}</ul>
        </details>"#,
        css,
        encode_text(title),
        items
    )
}

/// Render the full panel page.
pub fn render_panel(labels: &Labels, view: Option<&StatusView>, busy: bool, user: Option<&str>) -> String {
    let snapshot = view.map(|v| &v.snapshot);
    let running = snapshot.is_some_and(|s| s.is_running);

    let started = snapshot
        .and_then(|s| s.started_at.as_ref())
        .map(|t| t.display())
        .unwrap_or_else(|| labels.label_unknown.clone());

    let addresses = match snapshot.and_then(|s| s.secondary_addresses.as_ref()) {
        Some(addrs) => addrs
            .iter()
            .map(|a| format!("<div>{}</div>", encode_text(a)))
            .collect::<String>(),
        None => format!("<div>{}</div>", encode_text(&labels.label_na)),
    };

    let user_html = user
        .map(|u| format!(r#"<span class="user">{}</span>"#, encode_text(u)))
        .unwrap_or_default();

    PANEL_HTML
        .replace("{{STATE_CLASS}}", if running { "running" } else { "stopped" })
        .replace("{{BUSY}}", if busy { r#"<span class="busy">&#8635;</span>"# } else { "" })
        .replace(
            "{{TITLE}}",
            &encode_text(if running {
                &labels.text_server_running
            } else {
                &labels.text_server_not_running
            }),
        )
        .replace("{{USER}}", &user_html)
        .replace("{{LABEL_STARTED}}", &encode_text(&labels.label_time_started))
        .replace("{{STARTED}}", &encode_text(&started))
        .replace("{{LABEL_UPTIME}}", &encode_text(&labels.label_up_time))
        .replace(
            "{{UPTIME}}",
            &encode_text(text_or(snapshot.and_then(|s| s.uptime.as_deref()), &labels.label_unknown)),
        )
        .replace("{{LABEL_VERSION}}", &encode_text(&labels.label_server_version))
        .replace(
            "{{VERSION}}",
            &encode_text(text_or(snapshot.and_then(|s| s.version.as_deref()), &labels.label_unknown)),
        )
        .replace("{{LABEL_OS}}", &encode_text(&labels.label_os_version))
        .replace(
            "{{OS}}",
            &encode_text(text_or(snapshot.and_then(|s| s.environment.as_deref()), &labels.label_unknown)),
        )
        .replace("{{LABEL_WEB_PORT}}", &encode_text(&labels.label_web_server_port))
        .replace(
            "{{WEB_PORT}}",
            &encode_text(&port_or(snapshot.and_then(|s| s.web_port), &labels.label_none)),
        )
        .replace("{{LABEL_PROTOCOL_PORT}}", &encode_text(&labels.label_open_protocol_port))
        .replace(
            "{{PROTOCOL_PORT}}",
            &encode_text(&port_or(snapshot.and_then(|s| s.protocol_port), &labels.label_none)),
        )
        .replace("{{LABEL_OPCUA}}", &encode_text(&labels.label_opcua))
        .replace("{{OPCUA}}", &addresses)
        .replace("{{LABEL_NUM_CLIENTS}}", &encode_text(&labels.label_num_clients))
        .replace("{{NUM_CLIENTS}}", &view.map_or(0, StatusView::client_count).to_string())
        .replace("{{LABEL_NUM_MACHINES}}", &encode_text(&labels.label_num_machines))
        .replace("{{NUM_MACHINES}}", &view.map_or(0, StatusView::controller_count).to_string())
        .replace(
            "{{CLIENTS_CARD}}",
            &connection_card(
                &labels.label_connected_clients,
                "clients",
                view.and_then(|v| v.clients.as_ref()),
            ),
        )
        .replace(
            "{{CONTROLLERS_CARD}}",
            &connection_card(
                &labels.label_connected_machines,
                "controllers",
                view.and_then(|v| v.controllers.as_ref()),
            ),
        )
        .replace("{{LOGOUT}}", &encode_text(&labels.btn_logout))
}

const PANEL_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta http-equiv="refresh" content="5">
    <title>Server Status</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #0f0f1a;
            color: #fff;
            min-height: 100vh;
        }
        .container { padding: 30px; max-width: 720px; margin: 0 auto; }
        .card {
            background: rgba(255,255,255,0.05);
            border-radius: 12px;
            border: 1px solid rgba(255,255,255,0.1);
            overflow: hidden;
            margin-bottom: 20px;
        }
        .card-header {
            padding: 20px;
            text-align: center;
            display: flex;
            justify-content: center;
            align-items: center;
            gap: 12px;
        }
        .running .card-header { background: linear-gradient(135deg, #4caf50 0%, #8bc34a 100%); }
        .stopped .card-header { background: linear-gradient(135deg, #f44336 0%, #ff5252 100%); }
        .card-header h2 { font-size: 20px; }
        .busy { font-size: 20px; }
        .user { color: rgba(255,255,255,0.8); font-size: 13px; }
        table { width: 100%; border-collapse: collapse; }
        td {
            padding: 12px 16px;
            border-bottom: 1px solid rgba(255,255,255,0.05);
        }
        td.value { text-align: center; }
        tr:hover { background: rgba(255,255,255,0.03); }
        summary {
            padding: 16px 20px;
            cursor: pointer;
            font-weight: 600;
        }
        .clients summary { background: rgba(158,158,158,0.3); }
        .controllers summary { background: rgba(33,150,243,0.3); }
        ul { list-style: none; }
        li {
            padding: 12px 20px;
            border-bottom: 1px solid rgba(255,255,255,0.05);
            font-family: 'Monaco', 'Menlo', monospace;
            font-size: 13px;
        }
        .logout {
            background: rgba(255,82,82,0.2);
            color: #ff5252;
            border: 1px solid #ff5252;
            padding: 10px 20px;
            border-radius: 6px;
            cursor: pointer;
            font-size: 14px;
        }
        .logout:hover { background: #ff5252; color: #fff; }
    </style>
</head>
<body>
    <div class="container">
        <div class="card {{STATE_CLASS}}">
            <div class="card-header">
                {{BUSY}}
                <h2>{{TITLE}}</h2>
                {{USER}}
            </div>
            <table>
                <tr><td>{{LABEL_STARTED}}</td><td class="value">{{STARTED}}</td></tr>
                <tr><td>{{LABEL_UPTIME}}</td><td class="value">{{UPTIME}}</td></tr>
                <tr><td>{{LABEL_VERSION}}</td><td class="value">{{VERSION}}</td></tr>
                <tr><td>{{LABEL_OS}}</td><td class="value">{{OS}}</td></tr>
                <tr><td>{{LABEL_WEB_PORT}}</td><td class="value">{{WEB_PORT}}</td></tr>
                <tr><td>{{LABEL_PROTOCOL_PORT}}</td><td class="value">{{PROTOCOL_PORT}}</td></tr>
                <tr><td>{{LABEL_OPCUA}}</td><td class="value">{{OPCUA}}</td></tr>
                <tr><td>{{LABEL_NUM_CLIENTS}}</td><td class="value">{{NUM_CLIENTS}}</td></tr>
                <tr><td>{{LABEL_NUM_MACHINES}}</td><td class="value">{{NUM_MACHINES}}</td></tr>
            </table>
        </div>

        {{CLIENTS_CARD}}

        {{CONTROLLERS_CARD}}

        <form method="POST" action="/logout">
            <button type="submit" class="logout">{{LOGOUT}}</button>
        </form>
    </div>
</body>
</html>"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollerOptions;
    use crate::status::{transform, StatusPayload};
    use crate::testing::{settle, FakeTransport};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    fn view(json: &str) -> StatusView {
        transform(serde_json::from_str::<StatusPayload>(json).unwrap())
    }

    #[test]
    fn test_render_without_snapshot_uses_placeholders() {
        let html = render_panel(&Labels::default(), None, true, None);
        assert!(html.contains("Server is not running"));
        assert!(html.contains(r#"class="card stopped""#));
        assert!(html.contains(r#"class="busy""#));
        assert!(html.contains(r#"<td class="value">Unknown</td>"#));
        assert!(html.contains(r#"<td class="value">None</td>"#));
        assert!(html.contains("<div>N/A</div>"));
        assert!(html.contains(r#"<td class="value">0</td>"#));
        assert!(!html.contains("<details"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_render_running_snapshot() {
        let v = view(
            r#"{
                "isRunning": true,
                "uptime": "2d 1h",
                "version": "",
                "port": 0,
                "openProtocol": 34954,
                "OPCUA": ["opc.tcp://a:4840", "opc.tcp://b:4840"],
                "clients": {"C1": "Press 1", "C2": "Press 2"},
                "controllers": {}
            }"#,
        );
        let html = render_panel(&Labels::default(), Some(&v), false, Some("admin"));

        assert!(html.contains("Server is running"));
        assert!(html.contains(r#"class="card running""#));
        assert!(!html.contains(r#"class="busy""#));
        assert!(html.contains(r#"<span class="user">admin</span>"#));
        assert!(html.contains(r#"<td class="value">2d 1h</td>"#));
        // Empty version and zero port fall back
        assert!(html.contains(r#"<td>Server version</td><td class="value">Unknown</td>"#));
        assert!(html.contains(r#"<td>Web server port</td><td class="value">None</td>"#));
        assert!(html.contains(r#"<td class="value">34954</td>"#));
        assert!(html.contains("<div>opc.tcp://a:4840</div><div>opc.tcp://b:4840</div>"));
        assert!(html.contains(r#"<td>Number of clients</td><td class="value">2</td>"#));
        assert!(html.contains(r#"<td>Number of machines</td><td class="value">0</td>"#));

        // Clients panel shown in order, empty controllers panel hidden
        let first = html.find("C1 &bull; Press 1").unwrap();
        let second = html.find("C2 &bull; Press 2").unwrap();
        assert!(first < second);
        assert!(html.contains("Connected clients"));
        assert!(!html.contains("Connected machines"));
    }

    #[test]
    fn test_render_escapes_server_text() {
        let v = view(r#"{"clients": {"<b>": "a & \"b\""}, "started": "soon"}"#);
        let html = render_panel(&Labels::default(), Some(&v), false, None);
        assert!(html.contains(r#"&lt;b&gt; &bull; a &amp; "b""#));
        assert!(html.contains("Invalid Date"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_render_uses_custom_labels() {
        let labels = Labels {
            label_unknown: "Unbekannt".to_string(),
            btn_logout: "Abmelden".to_string(),
            ..Labels::default()
        };
        let html = render_panel(&labels, None, false, None);
        assert!(html.contains("Unbekannt"));
        assert!(html.contains("Abmelden"));
    }

    fn panel(transport: Arc<FakeTransport>) -> (Router, Arc<PanelState>) {
        let session = Arc::new(PanelSession::new(Some("admin".to_string()), "http://server/login"));
        let poller = StatusPoller::start(transport, session.clone(), PollerOptions::default());
        let state = Arc::new(PanelState {
            poller,
            session,
            labels: Labels::default(),
        });
        (panel_router(state.clone()), state)
    }

    async fn send(app: &Router, method: Method, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(res: &Response) -> &str {
        res.headers().get(header::LOCATION).unwrap().to_str().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_panel_page_shows_status() {
        let transport = Arc::new(FakeTransport::default());
        let (app, _state) = panel(transport);
        settle().await;

        let res = send(&app, Method::GET, "/").await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("Server is running"));
        assert!(html.contains("C1 &bull; Press 1"));
        assert!(html.contains(r#"<span class="user">admin</span>"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_redirects_once() {
        let transport = Arc::new(FakeTransport::default());
        transport.set_failing(true);
        let (app, state) = panel(transport);
        settle().await;
        assert!(state.session.current_user().is_none());

        let res = send(&app, Method::GET, "/").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "http://server/login");

        let res = send(&app, Method::GET, "/").await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_route() {
        let transport = Arc::new(FakeTransport::default());
        let (app, state) = panel(transport.clone());
        settle().await;

        let res = send(&app, Method::POST, "/logout").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "http://server/login");
        assert_eq!(transport.logout_calls(), 1);
        assert!(state.session.current_user().is_none());
        // Redirect was consumed by the logout response
        assert!(state.session.take_redirect().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_while_polling_goes_back_to_panel() {
        let transport = Arc::new(FakeTransport::default());
        let release = transport.hold_next();
        let (app, state) = panel(transport.clone());
        settle().await;

        let res = send(&app, Method::GET, "/logout").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/");
        assert_eq!(transport.logout_calls(), 0);
        assert_eq!(state.session.current_user().as_deref(), Some("admin"));
        drop(release);
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_status_json() {
        let transport = Arc::new(FakeTransport::default());
        let release = transport.hold_next();
        let (app, _state) = panel(transport);
        settle().await;

        let res = send(&app, Method::GET, "/api/status").await;
        let json: serde_json::Value = serde_json::from_str(&body_text(res).await).unwrap();
        assert_eq!(json["busy"], true);
        assert!(json["status"].is_null());

        release.send(()).unwrap();
        settle().await;
        let res = send(&app, Method::GET, "/api/status").await;
        assert_eq!(res.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(res).await).unwrap();
        assert_eq!(json["busy"], false);
        assert_eq!(json["status"]["snapshot"]["isRunning"], true);
        assert_eq!(json["status"]["clients"][1]["description"], "Press 2");
        assert_eq!(json["status"]["controllers"], serde_json::json!([]));
    }
}
