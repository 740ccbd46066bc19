//! Per-request panic recovery.
//!
//! A panic inside a handler is logged with its message, the backtrace of the
//! panicking thread and size-capped dumps of the request and the response emitted so
//! far; the client receives a plain `500 Internal Server Error`.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use http::StatusCode;

use crate::context::RequestContext;
use crate::stack::Handler;

/// Cap applied to each of the request and response dumps.
pub const MAX_DUMP_BYTES: usize = 1024 * 1024;

const TRUNCATED: &str = "\u{2026} (truncated)";

static HOOK: Once = Once::new();

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Install (once per process) a panic hook that keeps the backtrace of the last
/// panic on the panicking thread. The previous hook still runs.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Human-readable panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Run `handler`, turning a panic into a logged `500`.
pub async fn guard(handler: Handler, req: axum::extract::Request) -> Response {
    install_panic_hook();
    let ctx = RequestContext::of(&req);
    let method = req.method().clone();
    let uri = req.uri().clone();

    match AssertUnwindSafe(handler.call(req)).catch_unwind().await {
        Ok(resp) => resp,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let backtrace = take_backtrace();
            let request = ctx
                .as_ref()
                .map_or_else(|| format!("{method} {uri}"), dump_request);
            let response = ctx.as_ref().map_or_else(String::new, dump_response);

            // multi-line dumps are logged escaped so the event stays on one line
            tracing::error!(
                panic = %message,
                backtrace = ?backtrace,
                request = ?request,
                response = ?response,
                request_id = ctx.as_ref().map_or("", |c| c.request_id()),
                "Panic while serving request"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn dump_request(ctx: &Arc<RequestContext>) -> String {
    let mut out = format!("{} {} {}\n", ctx.method(), ctx.url(), ctx.protocol());
    for (name, value) in ctx.headers() {
        let _ = writeln!(out, "{name}: {}", String::from_utf8_lossy(value.as_bytes()));
    }
    if let Some(body) = ctx.request_body() {
        out.push('\n');
        out.push_str(&String::from_utf8_lossy(&body));
    }
    truncate(out, MAX_DUMP_BYTES)
}

fn dump_response(ctx: &Arc<RequestContext>) -> String {
    let Some(record) = ctx.response() else {
        return String::new();
    };
    let mut out = format!("{}\n", record.status);
    for (name, value) in &record.headers {
        let _ = writeln!(out, "{name}: {}", String::from_utf8_lossy(value.as_bytes()));
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&record.body));
    truncate(out, MAX_DUMP_BYTES)
}

/// Cut `s` to at most `max` bytes on a char boundary and mark it as truncated.
fn truncate(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s.push_str(TRUNCATED);
    s
}
