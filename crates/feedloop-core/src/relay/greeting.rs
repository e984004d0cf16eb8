/// Name used to greet the person who left the feedback.
///
/// Prefers the first word of the display name, then the local part of the
/// email address, and is empty when neither is usable.
pub fn greeting_name(display_name: Option<&str>, email: Option<&str>) -> String {
    if let Some(first) = display_name.and_then(|name| name.split_whitespace().next()) {
        return first.to_string();
    }

    email
        .and_then(|email| email.trim().split_once('@'))
        .map(|(local, _)| local)
        .filter(|local| !local.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}
