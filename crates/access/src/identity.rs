/// Normalize a JID to canonical form.
///
/// Lower-cases and trims the input, and drops the `:device` qualifier from
/// the local part of `local[:device]@domain` addresses. Strings without `@`
/// pass through cleaned.
pub fn normalize_jid(value: &str) -> String {
    let clean = value.trim().to_lowercase();
    let Some((local, domain)) = clean.split_once('@') else {
        return clean;
    };
    let local = local.split(':').next().unwrap_or(local);
    format!("{local}@{domain}")
}

/// Extract the comparable identity (digits only) from a JID.
///
/// Takes the local part of the normalized JID and strips every non-digit
/// character, so `+1 234-567`, `1234567@s.whatsapp.net` and
/// `1234567:5@s.whatsapp.net` all compare equal. Falls back to the full
/// local part when no digits remain.
pub fn jid_identity(value: &str) -> String {
    let normalized = normalize_jid(value);
    let local = normalized.split('@').next().unwrap_or(&normalized);
    let digits: String = local.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        local.to_string()
    } else {
        digits
    }
}
