use crate::controller::backends::VersionResolver;

/// Resolves versions from crunchy image tags
///
/// Tags look like `<os>-<version>-<release>`; the version is the second
/// segment. A tag without separators is taken as the version itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageTagVersionResolver;

impl VersionResolver for ImageTagVersionResolver {
    fn resolve_full_version(&self, image_tag: &str) -> String {
        let mut segments = image_tag.split('-');
        match (segments.next(), segments.next()) {
            (Some(_), Some(version)) => version.to_string(),
            _ => image_tag.to_string(),
        }
    }
}
