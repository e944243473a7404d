//! One-shot status messages shown on the page after a redirect.
//!
//! The message stays on the server; the browser only holds a random id in
//! the flash cookie. Rendering a page takes the message out of the store, so
//! it is shown once, to the browser that caused it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rand::Rng;

use crate::state::AppState;

pub const FLASH_COOKIE: &str = "blogpost_flash";

const FLASH_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashMessage {
    pub kind: FlashKind,
    pub text: String,
}

impl FlashMessage {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Info,
            text: text.into(),
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self.kind {
            FlashKind::Error => "flash flash-error",
            FlashKind::Info => "flash flash-info",
        }
    }
}

pub struct FlashStore {
    messages: HashMap<String, (Instant, FlashMessage)>,
}

impl FlashStore {
    pub fn new() -> Self {
        Self {
            messages: HashMap::new(),
        }
    }

    /// Store a message and return the id to put in the cookie.
    pub fn insert(&mut self, message: FlashMessage) -> String {
        self.clear_stale();
        let id = generate_id();
        self.messages.insert(id.clone(), (Instant::now(), message));
        id
    }

    /// Remove and return the message, if it has not expired.
    pub fn take(&mut self, id: &str) -> Option<FlashMessage> {
        let (created, message) = self.messages.remove(id)?;
        (created.elapsed() <= FLASH_TTL).then_some(message)
    }

    fn clear_stale(&mut self) {
        self.messages
            .retain(|_, (created, _)| created.elapsed() <= FLASH_TTL);
    }
}

impl Default for FlashStore {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

pub fn flash_cookie(id: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        FLASH_COOKIE,
        id,
        FLASH_TTL.as_secs()
    )
}

pub fn clear_flash_cookie() -> &'static str {
    "blogpost_flash=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"
}

/// 303 to `location`, carrying `message` to the page rendered there.
pub async fn redirect_with_flash(
    state: &AppState,
    location: &str,
    message: FlashMessage,
) -> Response {
    let id = state.flashes.lock().await.insert(message);
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, location.to_string()),
            (header::SET_COOKIE, flash_cookie(&id)),
        ],
    )
        .into_response()
}
