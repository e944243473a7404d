//! Post helpers shared by the compose handler and the views: display
//! timestamps, slugs and excerpts.

use chrono::NaiveDateTime;

use crate::store::posts::NewPost;

/// Longest excerpt shown on the home page, in characters.
pub const EXCERPT_CHARS: usize = 100;

/// `Mon Jan 01 2024 09:05`: weekday, month, zero-padded day, year, 24-hour time.
pub fn format_posted_at(at: &NaiveDateTime) -> String {
    at.format("%a %b %d %Y %H:%M").to_string()
}

/// Lowercase ASCII words of `title` joined by `-`.
pub fn slugify(title: &str) -> String {
    let words: Vec<String> = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect();

    if words.is_empty() {
        "post".to_string()
    } else {
        words.join("-")
    }
}

/// Build the row for a new post. The slug carries part of the random id so
/// two authors can share a title.
pub fn draft(
    user_id: &str,
    poster_name: &str,
    title: &str,
    body: &str,
    now: &NaiveDateTime,
) -> NewPost {
    let id = uuid::Uuid::now_v7();
    let simple = id.simple().to_string();
    let suffix = &simple[simple.len() - 8..];

    NewPost {
        id: id.to_string(),
        user_id: user_id.to_string(),
        poster_name: poster_name.to_string(),
        slug: format!("{}-{}", slugify(title), suffix),
        title: title.trim().to_string(),
        body: body.to_string(),
        posted_at: format_posted_at(now),
    }
}

/// First [`EXCERPT_CHARS`] characters of `body`, with an ellipsis when cut.
pub fn excerpt(body: &str) -> String {
    match body.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", body[..cut].trim_end()),
        None => body.to_string(),
    }
}
