//! Mimetype string helpers shared by the catalog and the session.

/// Placeholder that stands in for the container token in a generic pattern.
pub const CONTAINER_PLACEHOLDER: &str = "$container";

/// Build a candidate mimetype such as `video/webm; codecs="vp9","opus"`.
///
/// An empty token means the stream kind is absent. A missing video token
/// turns the top-level type into `audio`.
pub fn candidate_mime(video: &str, audio: &str, container: &str) -> String {
    let kind = if video.is_empty() { "audio" } else { "video" };
    let codecs = [video, audio]
        .iter()
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{}\"", token))
        .collect::<Vec<_>>()
        .join(",");

    format!("{}/{}; codecs={}", kind, container, codecs)
}

/// Replace the first occurrence of `container` with the placeholder token.
pub fn generic_pattern(mime: &str, container: &str) -> String {
    mime.replacen(container, CONTAINER_PLACEHOLDER, 1)
}

/// Substitute a concrete container back into a generic pattern.
pub fn with_container(pattern: &str, container: &str) -> String {
    pattern.replacen(CONTAINER_PLACEHOLDER, container, 1)
}

/// Output file extension for a mimetype.
///
/// Takes the subtype up to the parameter delimiter and maps `x-matroska`
/// to `mkv`.
pub fn extension_for(mime: &str) -> String {
    subtype_of(mime).replace("x-matroska", "mkv")
}

/// Split a mimetype into its container subtype and codec tokens.
///
/// `video/webm; codecs="vp9","opus"` yields `("webm", ["vp9", "opus"])`.
pub fn parse_mime(mime: &str) -> (String, Vec<String>) {
    let container = subtype_of(mime);
    let codecs = mime
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("codecs="))
        .flat_map(|list| list.split(','))
        .map(|token| token.trim().trim_matches('"').to_string())
        .filter(|token| !token.is_empty())
        .collect();

    (container, codecs)
}

fn subtype_of(mime: &str) -> String {
    let subtype = mime.split(';').next().unwrap_or_default();
    subtype
        .split_once('/')
        .map(|(_, sub)| sub)
        .unwrap_or(subtype)
        .trim()
        .to_string()
}
