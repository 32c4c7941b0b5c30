use super::handlers::{
    auth::{session, types},
    health, history, me, user_login, user_register, users,
};
use crate::model::{LoginHistoryEntry, Profile, UserView};
use utoipa::{
    OpenApi,
    openapi::{Contact, InfoBuilder, License, Tag},
};

/// Documented routes, mounted under the default `/auth` prefix.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        user_register::register,
        user_login::login,
        session::logout,
        me::get_me,
        me::patch_me,
        me::change_password,
        users::list_users,
        users::delete_user,
        history::own_history,
        history::all_history,
    ),
    components(schemas(
        health::Health,
        Profile,
        UserView,
        LoginHistoryEntry,
        types::RegisterRequest,
        types::RegisterResponse,
        types::LoginRequest,
        types::UserResponse,
        types::ChangePasswordRequest,
        types::MessageResponse,
    ))
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info = cargo_info();

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, login and logout".to_string());
    let mut me_tag = Tag::new("me");
    me_tag.description = Some("Authenticated self-service".to_string());
    let mut users_tag = Tag::new("users");
    users_tag.description = Some("User directory".to_string());
    let mut history_tag = Tag::new("history");
    history_tag.description = Some("Login history ledger".to_string());

    doc.tags = Some(vec![auth_tag, me_tag, users_tag, history_tag]);
    doc
}

fn cargo_info() -> utoipa::openapi::Info {
    // Use Cargo.toml metadata instead of the utoipa defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        (
            (!name.is_empty()).then_some(name),
            (!email.is_empty()).then_some(email),
        )
    } else {
        let name = author.trim();
        ((!name.is_empty()).then_some(name), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Sessa"));
            assert_eq!(contact.email.as_deref(), Some("team@sessa.dev"));
        }
    }

    #[test]
    fn documents_every_auth_route() {
        let spec = openapi();
        for path in [
            "/health",
            "/auth/register",
            "/auth/login",
            "/auth/logout",
            "/auth/me",
            "/auth/change-password",
            "/auth/users",
            "/auth/user/{id}",
            "/auth/login-history",
            "/auth/login-history/all",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Team Sessa <team@sessa.dev>"),
            (Some("Team Sessa"), Some("team@sessa.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
    }
}
