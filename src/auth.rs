//! Admin bearer-token guard. Grounded in the teacher's `ManageToken`
//! request guard (`auth.rs`), reshaped from per-monitor `manage_key`
//! ownership to the single `ADMIN_TOKEN` bearer model of spec §6.

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;

use crate::config::Settings;

pub struct AdminToken;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminToken {
    type Error = &'static str;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let settings = match request.guard::<&State<Settings>>().await {
            Outcome::Success(s) => s,
            _ => return Outcome::Error((Status::InternalServerError, "settings unavailable")),
        };

        let provided = request
            .headers()
            .get_one("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "));

        match provided {
            Some(token) if constant_time_eq(token, &settings.admin_token) => Outcome::Success(AdminToken),
            _ => Outcome::Error((Status::Unauthorized, "missing or invalid admin bearer token")),
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("abc123", "abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_length_and_content() {
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(!constant_time_eq("abc", "abd"));
    }
}
