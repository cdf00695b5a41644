// packages/bridge/src/resolver/media_type.rs
//! Extension to media-type mapping

/// Used for unknown or missing extensions
pub const DEFAULT_MEDIA_TYPE: &str = "text/plain";

const MEDIA_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("jsx", "application/javascript"),
    ("ts", "application/typescript"),
    ("tsx", "application/typescript"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
];

/// Media type for a file name, from its final extension only
pub fn media_type_for(file_name: &str) -> &'static str {
    let extension = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_MEDIA_TYPE,
    };

    MEDIA_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, media_type)| *media_type)
        .unwrap_or(DEFAULT_MEDIA_TYPE)
}
