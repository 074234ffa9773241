//! Field-to-identity mapping for form filling
//!
//! Pure heuristics: given a normalized field descriptor, decide which part of
//! the synthetic identity belongs in it. Typed inputs win over keyword
//! matches; unrecognized fields are left alone.

use magpie_browser::FieldDescriptor;
use magpie_core::SyntheticIdentity;

/// Fields the CAPTCHA path owns; the generic filler must not touch them
pub fn is_captcha_field(field: &FieldDescriptor) -> bool {
    let hay = field.haystack();
    hay.contains("captcha") || hay.contains("security code") || hay.contains("anti-bot")
}

/// The identity value for a field, or `None` to skip it
pub fn value_for_field(field: &FieldDescriptor, identity: &SyntheticIdentity) -> Option<String> {
    if field.tag == "select" || is_captcha_field(field) {
        return None;
    }

    match field.input_type.as_str() {
        "email" => return Some(identity.email.clone()),
        "password" => return Some(identity.password.clone()),
        "hidden" | "submit" | "button" | "checkbox" | "radio" | "file" => return None,
        _ => {}
    }

    let hay = field.haystack();

    if hay.contains("confirm") && hay.contains("pass") {
        return Some(identity.password.clone());
    }
    if hay.contains("pass") || hay.contains("pwd") {
        return Some(identity.password.clone());
    }
    if hay.contains("mail") {
        return Some(identity.email.clone());
    }
    if hay.contains("user") || hay.contains("login") || hay.contains("nick") {
        return Some(identity.username.clone());
    }
    if hay.contains("pgp") {
        return Some(identity.pgp_key.clone());
    }
    if hay.contains("telegram") || hay.contains("jabber") || hay.contains("contact") {
        return Some(identity.telegram.clone());
    }
    if hay.contains("btc") || hay.contains("bitcoin") || hay.contains("wallet") {
        return Some(identity.btc_address.clone());
    }
    if hay.contains("refund") || hay.contains("address") {
        return Some(identity.btc_address.clone());
    }
    if hay.contains("age") {
        return Some(identity.age.to_string());
    }
    if hay.contains("country") {
        return Some(identity.country.clone());
    }
    if hay.contains("name") {
        return Some(identity.username.clone());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_core::{generate_identity, SiteKind};

    fn field(name: &str, input_type: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            id: String::new(),
            placeholder: String::new(),
            input_type: input_type.into(),
            tag: "input".into(),
        }
    }

    #[test]
    fn test_typed_inputs_win() {
        let id = generate_identity(SiteKind::General);
        assert_eq!(value_for_field(&field("whatever", "email"), &id), Some(id.email.clone()));
        assert_eq!(
            value_for_field(&field("whatever", "password"), &id),
            Some(id.password.clone())
        );
    }

    #[test]
    fn test_keyword_fallbacks() {
        let id = generate_identity(SiteKind::General);
        assert_eq!(value_for_field(&field("username", "text"), &id), Some(id.username.clone()));
        assert_eq!(
            value_for_field(&field("refund_address", "text"), &id),
            Some(id.btc_address.clone())
        );
        assert_eq!(value_for_field(&field("confirm_password", "text"), &id), Some(id.password.clone()));
    }

    #[test]
    fn test_captcha_and_hidden_skipped() {
        let id = generate_identity(SiteKind::General);
        assert!(value_for_field(&field("captcha_answer", "text"), &id).is_none());
        assert!(value_for_field(&field("csrf_token", "hidden"), &id).is_none());
    }

    #[test]
    fn test_unknown_field_skipped() {
        let id = generate_identity(SiteKind::General);
        assert!(value_for_field(&field("xyzzy", "text"), &id).is_none());
    }
}
