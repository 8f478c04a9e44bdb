//! Join link parsing (tugwar://join/<id>, ...?join=<id>)

use url::Url;

/// Scheme used by shareable join links.
pub const LINK_SCHEME: &str = "tugwar";

/// Build the link another player can use to join `local_id`.
pub fn join_link(local_id: &str) -> String {
    format!("{LINK_SCHEME}://join/{local_id}")
}

/// Extract a peer identifier from a startup argument.
///
/// Accepts a `tugwar://join/<id>` link, any URL carrying a `join` query
/// parameter, or a bare identifier. Returns `None` for blank input and for
/// URLs that name no peer.
pub fn parse_target(arg: &str) -> Option<String> {
    let arg = arg.trim();
    if arg.is_empty() {
        return None;
    }
    // Bare ids such as `localhost:7780` would parse as a URL with scheme
    // `localhost`, so only treat explicit `scheme://` input as a link.
    if !arg.contains("://") {
        return Some(arg.to_string());
    }

    let url = match Url::parse(arg) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(%arg, error = %e, "Unparsable join link");
            return None;
        }
    };

    if url.scheme() == LINK_SCHEME && url.host_str() == Some("join") {
        let id = url.path().trim_matches('/');
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    url.query_pairs()
        .find(|(key, _)| key == "join")
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| !id.is_empty())
}
