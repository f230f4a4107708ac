//! Development Server for the emboot shell
//!
//! Serves the built page (shell `.js`/`.wasm`, guest `.js`/`.wasm`/`.data`)
//! with correct MIME types and caching disabled, so a rebuilt guest is
//! always fetched.
//!
//! Environment:
//! - `WEB_ROOT`: directory to serve (default `web`)
//! - `PORT`: port on 127.0.0.1 (default 8080)

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    response::Response,
    routing::get_service,
    Router,
};
use std::net::SocketAddr;
use tower_http::services::ServeDir;

const DEFAULT_WEB_ROOT: &str = "web";
const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let web_root = std::env::var("WEB_ROOT").unwrap_or_else(|_| DEFAULT_WEB_ROOT.to_string());

    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    println!("╔═══════════════════════════════════════════════════╗");
    println!("║             emboot Development Server             ║");
    println!("╠═══════════════════════════════════════════════════╣");
    println!("║  URL:  http://localhost:{:<26}║", port);
    println!("║  Root: {:<43}║", web_root);
    println!("║  Press Ctrl+C to stop                             ║");
    println!("╚═══════════════════════════════════════════════════╝");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(&web_root)).await
}

/// Static file service for `web_root` with the header fix-ups applied
fn app(web_root: &str) -> Router {
    let serve_dir = ServeDir::new(web_root).precompressed_gzip().precompressed_br();

    Router::new()
        .fallback_service(get_service(serve_dir).handle_error(|_| async {
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }))
        .layer(axum::middleware::from_fn(add_headers))
}

/// Content type for the files an Emscripten page is made of
fn mime_for(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext)?;
    let mime = match ext {
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "wasm" => "application/wasm",
        // Emscripten's preloaded file package
        "data" => "application/octet-stream",
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        _ => return None,
    };
    Some(mime)
}

/// Fix MIME types and disable caching
async fn add_headers(request: Request<Body>, next: axum::middleware::Next) -> Response<Body> {
    // Get the request path for MIME type detection
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    if let Some(mime) = mime_for(&path) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_for("/guest.wasm"), Some("application/wasm"));
        assert_eq!(mime_for("/guest.data"), Some("application/octet-stream"));
        assert_eq!(mime_for("/emboot_web.js"), Some("application/javascript; charset=utf-8"));
        assert_eq!(mime_for("/index.html"), Some("text/html; charset=utf-8"));
        assert_eq!(mime_for("/"), None);
        assert_eq!(mime_for("/LICENSE"), None);
    }

    #[tokio::test]
    async fn test_serves_with_headers() {
        let root = std::env::temp_dir().join(format!("emboot-dev-server-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("guest.data"), b"packed").unwrap();

        let response = app(root.to_str().unwrap())
            .oneshot(Request::get("/guest.data").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");

        std::fs::remove_dir_all(&root).unwrap();
    }
}
