use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};

use crate::auth::flash::{clear_flash_cookie, FlashMessage, FLASH_COOKIE};
use crate::auth::session;
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    /// `None` for accounts created through an OAuth provider.
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

impl CurrentUser {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Extractor that requires authentication.
/// Anonymous requests are rejected with a redirect to the login page.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = cookie_value(&parts.headers, &state.config.auth.cookie_name)
            .ok_or(AppError::NotAuthenticated)?;

        session::load_session(&state.db, token)?.ok_or(AppError::NotAuthenticated)
    }
}

/// Optional user extractor. Returns None instead of redirecting when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn display_name(&self) -> Option<String> {
        self.0.as_ref().map(CurrentUser::display_name)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.as_ref().map(|u| u.id.as_str())
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::NotAuthenticated) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// The flash message addressed to this browser, if any.
///
/// Extracting it consumes the message. Put the extractor back into the
/// response tuple so the flash cookie is cleared.
pub struct Flash {
    message: Option<FlashMessage>,
    had_cookie: bool,
}

impl Flash {
    pub fn take(&mut self) -> Option<FlashMessage> {
        self.message.take()
    }
}

impl FromRequestParts<AppState> for Flash {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(id) = cookie_value(&parts.headers, FLASH_COOKIE).filter(|id| !id.is_empty())
        else {
            return Ok(Flash {
                message: None,
                had_cookie: false,
            });
        };

        let message = state.flashes.lock().await.take(id);
        Ok(Flash {
            message,
            had_cookie: true,
        })
    }
}

impl IntoResponseParts for Flash {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if self.had_cookie {
            res.headers_mut().append(
                header::SET_COOKIE,
                HeaderValue::from_static(clear_flash_cookie()),
            );
        }
        Ok(res)
    }
}

pub(crate) fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for c in cookies {
            headers.append(header::COOKIE, HeaderValue::from_str(c).unwrap());
        }
        headers
    }

    #[test]
    fn finds_cookie_among_several() {
        let h = headers(&["a=1; blogpost_session=tok; b=2"]);
        assert_eq!(cookie_value(&h, "blogpost_session"), Some("tok"));
        assert_eq!(cookie_value(&h, "b"), Some("2"));
    }

    #[test]
    fn finds_cookie_across_headers() {
        let h = headers(&["a=1", "blogpost_flash=xyz"]);
        assert_eq!(cookie_value(&h, "blogpost_flash"), Some("xyz"));
    }

    #[test]
    fn missing_cookie_is_none() {
        let h = headers(&["a=1"]);
        assert_eq!(cookie_value(&h, "blogpost_session"), None);
        assert_eq!(cookie_value(&HeaderMap::new(), "a"), None);
    }

    #[test]
    fn display_name_trims_missing_last_name() {
        let user = CurrentUser {
            id: "u1".into(),
            username: None,
            first_name: "Cher".into(),
            last_name: String::new(),
        };
        assert_eq!(user.display_name(), "Cher");
    }
}
