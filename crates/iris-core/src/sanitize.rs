//! Text and URL clean-up applied before logging or matching.

/// Drop the query string and fragment from a URL.
///
/// Attachment download URLs carry short-lived access tokens in the query, so
/// nothing with a query string is logged or recorded verbatim.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Remove `<at>Name</at>` mention markup and trim the result.
///
/// In group conversations the platform prefixes the text with a mention of
/// the bot; left in place it would be matched as part of the request.
pub fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<at>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</at>") {
            Some(close) => rest = &rest[start + close + "</at>".len()..],
            None => {
                // Unterminated tag: keep the text as-is.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}
