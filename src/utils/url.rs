//! URL helpers for building Gemini endpoints
//!
//! Base URLs come from config or the command line, so they may or may not
//! carry trailing slashes.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use gemchat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://example.com/v1beta/models/"), "https://example.com/v1beta/models");
/// assert_eq!(normalize_base_url("https://example.com/v1beta/models"), "https://example.com/v1beta/models");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Build the `generateContent` action URL for a model
///
/// The credential is not part of the returned URL; it is attached as a query
/// parameter at request time so it never ends up in logs.
///
/// # Examples
///
/// ```
/// use gemchat::utils::url::generate_content_url;
///
/// assert_eq!(
///     generate_content_url("https://example.com/v1beta/models/", "gemini-2.0-flash"),
///     "https://example.com/v1beta/models/gemini-2.0-flash:generateContent"
/// );
/// ```
pub fn generate_content_url(base_url: &str, model: &str) -> String {
    let model = model.trim().trim_matches('/');
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!(
        "{}/{}:generateContent",
        normalize_base_url(base_url),
        model
    )
}
