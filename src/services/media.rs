//! Rewriting of cloud share links into URLs a client can fetch directly.

use url::Url;

use crate::state::quiz::{Media, MediaKind};

const DRIVE_DIRECT: &str = "https://drive.google.com/uc";

/// Display form of a question's media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMedia {
    /// Direct-fetch URL.
    Available {
        /// Image or video.
        kind: MediaKind,
        /// URL to fetch.
        url: String,
    },
    /// The media cannot be shown; the question stays answerable.
    Unavailable,
}

/// Resolve `media` for display. `failed` is set once the client reported a broken fetch.
pub fn resolve_media(media: &Media, failed: bool) -> ResolvedMedia {
    if failed {
        return ResolvedMedia::Unavailable;
    }
    match direct_url(&media.url) {
        Some(url) => ResolvedMedia::Available {
            kind: media.kind,
            url,
        },
        None => ResolvedMedia::Unavailable,
    }
}

/// Rewrite a Google Drive or Dropbox share link. Other http(s) URLs pass through.
///
/// Returns `None` for anything that does not parse as an absolute http(s) URL.
pub fn direct_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_owned();
    match host.as_str() {
        "drive.google.com" | "docs.google.com" => {
            let Some(id) = drive_file_id(&url) else {
                return Some(url.into());
            };
            let mut direct = Url::parse(DRIVE_DIRECT).ok()?;
            direct
                .query_pairs_mut()
                .append_pair("export", "view")
                .append_pair("id", &id);
            Some(direct.into())
        }
        "www.dropbox.com" | "dropbox.com" => {
            request_raw_dropbox(&mut url);
            Some(url.into())
        }
        _ => Some(url.into()),
    }
}

fn drive_file_id(url: &Url) -> Option<String> {
    let from_path = url.path_segments().and_then(|mut segments| {
        match (segments.next(), segments.next(), segments.next()) {
            (Some("file"), Some("d"), Some(id)) if !id.is_empty() => Some(id.to_string()),
            _ => None,
        }
    });

    from_path.or_else(|| {
        url.query_pairs()
            .find(|(key, value)| key == "id" && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    })
}

/// Replace any `dl`/`raw` flag with `raw=1`, keeping other query parameters.
fn request_raw_dropbox(url: &mut Url) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "dl" && key != "raw")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("raw", "1");
}
