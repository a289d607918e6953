//! Base URL normalization.
//!
//! Users paste whatever is in their browser bar: the space home page, a
//! trailing slash, sometimes a REST path they copied from the API docs.
//! Everything downstream expects the bare wiki root.

/// Reduce a user-supplied Confluence URL to the wiki root.
///
/// `https://x.atlassian.net/wiki/home/` becomes `https://x.atlassian.net/wiki`.
pub fn sanitize_base_url(raw: &str) -> String {
    let mut url = raw.trim();

    if let Some(pos) = url.find("/rest/api") {
        url = &url[..pos];
    }

    loop {
        let before = url.len();
        url = url.trim_end_matches('/');
        if let Some(stripped) = url.strip_suffix("/home") {
            url = stripped;
        }
        if url.len() == before {
            break;
        }
    }

    url.to_string()
}

/// Browser URL for a page, attached to chunk metadata.
pub fn page_url(base_url: &str, page_id: &str) -> String {
    format!("{}/pages/viewpage.action?pageId={}", base_url, page_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_home_and_trailing_slash() {
        assert_eq!(
            sanitize_base_url("https://x.atlassian.net/wiki/home/"),
            "https://x.atlassian.net/wiki"
        );
    }

    #[test]
    fn strips_rest_fragment() {
        assert_eq!(
            sanitize_base_url("https://x.atlassian.net/wiki/rest/api/content/42?expand=version"),
            "https://x.atlassian.net/wiki"
        );
    }

    #[test]
    fn strips_repeated_slashes_and_whitespace() {
        assert_eq!(
            sanitize_base_url("  https://x.atlassian.net/wiki//  "),
            "https://x.atlassian.net/wiki"
        );
    }

    #[test]
    fn leaves_clean_url_alone() {
        let url = "https://confluence.internal.example.com";
        assert_eq!(sanitize_base_url(url), url);
    }

    #[test]
    fn idempotent() {
        for raw in [
            "https://x.atlassian.net/wiki/home/",
            "https://x.atlassian.net/wiki/home/home",
            "https://x.atlassian.net/wiki/rest/api/",
        ] {
            let once = sanitize_base_url(raw);
            assert_eq!(sanitize_base_url(&once), once);
        }
    }

    #[test]
    fn does_not_strip_homepage_segment() {
        assert_eq!(
            sanitize_base_url("https://x.atlassian.net/homepage"),
            "https://x.atlassian.net/homepage"
        );
    }

    #[test]
    fn page_url_uses_viewpage_action() {
        assert_eq!(
            page_url("https://x.atlassian.net/wiki", "123"),
            "https://x.atlassian.net/wiki/pages/viewpage.action?pageId=123"
        );
    }
}
