use std::path::Path;

/// Produces the stored filename for an upload from the uploader's hint.
pub trait FilenameGenerator: Send + Sync {
    fn generate(&self, hint: &str) -> String;
}

/// 16 random bytes in hex followed by the hint's extension, e.g. `9f…c2.png`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomFilenames;

impl FilenameGenerator for RandomFilenames {
    fn generate(&self, hint: &str) -> String {
        let bytes: [u8; 16] = rand::random();
        let stem: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}{}", stem, extension_of(hint))
    }
}

/// The hint's extension including the dot, or an empty string.
///
/// Only short alphanumeric extensions are kept so a generated name is always
/// a single safe path component.
pub fn extension_of(hint: &str) -> String {
    let base = hint.rsplit(['/', '\\']).next().unwrap_or(hint);
    Path::new(base)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_extension() {
        assert_eq!(extension_of("cat.png"), ".png");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("C:\\photos\\IMG_001.JPG"), ".JPG");
        assert_eq!(extension_of("dir.d/README"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("weird.p/ng"), "");
        assert_eq!(extension_of("evil.png\0"), "");
        assert_eq!(extension_of(""), "");
    }

    #[test]
    fn random_names_look_right() {
        let gen = RandomFilenames;
        let a = gen.generate("holiday.jpeg");
        let b = gen.generate("holiday.jpeg");
        assert_ne!(a, b);
        assert!(a.ends_with(".jpeg"));
        let stem = a.trim_end_matches(".jpeg");
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
