//! Domain key normalization.
//!
//! Every membership test in the merge runs on normalized keys, so the same
//! function is applied to cache lines and to incoming candidates.

use tracing::debug;

const HTTP_SCHEME: &str = "http://";
const HTTPS_SCHEME: &str = "https://";

/// Turn a raw URL-like string into a canonical domain key.
///
/// Lowercases, strips one `http://` or `https://` scheme, drops everything
/// from the first `/`, `?` or `#`, then strips noise prefixes. A prefix is
/// only stripped when what remains still contains a `.`, so `docs.com` stays
/// as it is while `docs.example.com` becomes `example.com`.
///
/// Prefix stripping is repeated until no prefix applies, so stacked
/// prefixes are all removed instead of only the first one. Whitespace that
/// surfaces at either end after a cut or a strip is trimmed as well. Together
/// these make the result a fixpoint: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str, noise_prefixes: &[String]) -> String {
    let lowered = raw.trim().to_lowercase();

    let without_scheme = match lowered.strip_prefix(HTTP_SCHEME) {
        Some(rest) => rest,
        None => lowered.strip_prefix(HTTPS_SCHEME).unwrap_or(&lowered),
    };

    let mut host = host_part(without_scheme).trim();

    while let Some(stripped) = strip_noise_prefix(host, noise_prefixes) {
        let stripped = stripped.trim();
        debug!(from = host, to = stripped, "stripped noise prefix");
        host = stripped;
    }

    host.to_string()
}

/// Everything before the first path, query or fragment delimiter.
fn host_part(s: &str) -> &str {
    match s.find(['/', '?', '#']) {
        Some(idx) => &s[..idx],
        None => s,
    }
}

/// First prefix that may be stripped wins; `None` when nothing applies.
fn strip_noise_prefix<'a>(host: &'a str, noise_prefixes: &[String]) -> Option<&'a str> {
    noise_prefixes
        .iter()
        .filter(|p| !p.is_empty())
        .find_map(|prefix| {
            host.strip_prefix(prefix.as_str())
                .filter(|rest| rest.contains('.'))
        })
}
