pub mod health;
pub mod media_delete;
pub mod media_get;
pub mod media_upload;

/// Asset name of a request path: the last segment without its extension.
pub(crate) fn asset_name(file: &str) -> &str {
    match file.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() && !ext.is_empty() => base,
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_extension() {
        assert_eq!(asset_name("photo.png"), "photo");
        assert_eq!(asset_name("photo"), "photo");
        assert_eq!(asset_name("archive.tar.gz"), "archive.tar");
        assert_eq!(asset_name(".hidden"), ".hidden");
    }
}
