// Default content-info resolver based on element links

use super::element::ElementRef;
use super::models::ContentInfo;
use super::traits::ContentInfoResolver;

/// Reads a status link from the element's attributes.
///
/// Looks at `data-content-url` first, then `href`.
#[derive(Debug, Clone, Default)]
pub struct LinkContentResolver;

impl LinkContentResolver {
    pub fn new() -> Self {
        Self
    }
}

impl ContentInfoResolver for LinkContentResolver {
    fn resolve(&self, element: &ElementRef) -> Option<ContentInfo> {
        ["data-content-url", "href"]
            .iter()
            .filter_map(|attr| element.attribute(attr))
            .find_map(ContentInfo::from_content_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_from_href() {
        let el = ElementRef::new("a", [("href", "/alice/status/77/photo/2")]);
        let info = LinkContentResolver::new().resolve(&el).unwrap();
        assert_eq!(info.content_id, "77");
        assert_eq!(info.author_handle, "alice");
    }

    #[test]
    fn test_data_attribute_wins() {
        let el = ElementRef::new(
            "a",
            [
                ("href", "/alice/status/1"),
                ("data-content-url", "https://x.com/bob/status/2"),
            ],
        );
        let info = LinkContentResolver::new().resolve(&el).unwrap();
        assert_eq!(info.content_id, "2");
    }

    #[test]
    fn test_unresolvable() {
        let el = ElementRef::new("img", [("src", "https://pbs.twimg.com/media/a.jpg")]);
        assert!(LinkContentResolver::new().resolve(&el).is_none());
    }
}
