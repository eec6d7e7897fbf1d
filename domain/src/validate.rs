//! Lightweight input helpers. Keep logic minimal and deterministic.
//!
//! Submissions are deliberately permissive: every field is optional and no
//! submission is rejected here. These helpers only tidy values and answer
//! "could this be used as a mail address" for recipient resolution.

use crate::NewContact;

/// Trim the identifying fields (`nom`, `email`). The free-text fields are
/// stored exactly as submitted.
pub fn normalize(new: NewContact) -> NewContact {
    NewContact {
        nom: new.nom.trim().to_string(),
        email: new.email.trim().to_string(),
        ..new
    }
}

/// Shape check for a mail address; full RFC compliance is left to the mail
/// transport.
pub fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.chars().any(char::is_whitespace)
}
