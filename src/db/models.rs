#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// Email address for local accounts; `None` for accounts created by an
    /// OAuth provider.
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub facebook_id: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub poster_name: String,
    pub slug: String,
    pub title: String,
    pub body: String,
    /// Display timestamp, e.g. `Mon Jan 01 2024 09:05`.
    pub posted_at: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str) -> User {
        User {
            id: "u1".into(),
            first_name: first.into(),
            last_name: last.into(),
            username: None,
            password_hash: None,
            google_id: None,
            facebook_id: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn full_name_joins_both_parts() {
        assert_eq!(user("Ada", "Lovelace").full_name(), "Ada Lovelace");
    }

    #[test]
    fn full_name_without_last_name_has_no_trailing_space() {
        assert_eq!(user("Cher", "").full_name(), "Cher");
    }
}
