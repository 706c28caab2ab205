// Category taxonomy derived from breadcrumb paths
//
// "Home > Electronics > Phones > Pixel 9" on an item titled "Pixel 9" yields
// electronics, electronics/phones; the item is assigned electronics/phones.

use crate::domain::{Category, ScrapedItem};
use std::collections::HashSet;

const ROOT_CRUMBS: [&str; 2] = ["home", "startseite"];

/// Lowercase ASCII-alphanumeric slug, words joined by '-'
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Category path of an item: breadcrumbs minus root and the item itself,
/// or the URL segment before the final one when there are no breadcrumbs
pub fn category_path(item: &ScrapedItem) -> Vec<String> {
    let mut crumbs: Vec<String> = item
        .breadcrumbs
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    if crumbs
        .first()
        .is_some_and(|c| ROOT_CRUMBS.contains(&c.to_lowercase().as_str()))
    {
        crumbs.remove(0);
    }
    if let (Some(last), Some(title)) = (crumbs.last(), item.title.as_deref()) {
        if last.eq_ignore_ascii_case(title.trim()) {
            crumbs.pop();
        }
    }
    crumbs.retain(|c| !slugify(c).is_empty());

    if crumbs.is_empty() {
        if let Some(segment) = infer_segment_from_url(&item.url) {
            crumbs.push(segment);
        }
    }
    crumbs
}

/// `/shop/garden-tools/rake-42` -> "garden tools"
fn infer_segment_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    let segment = segments[segments.len() - 2];
    let decoded = segment.replace(['-', '_'], " ");
    if slugify(&decoded).is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// Categories for every prefix of a path, root first
pub fn categories_for_path(path: &[String]) -> Vec<Category> {
    let mut categories = Vec::with_capacity(path.len());
    let mut parent: Option<String> = None;
    for (depth, name) in path.iter().enumerate() {
        let slug = match &parent {
            Some(p) => format!("{}/{}", p, slugify(name)),
            None => slugify(name),
        };
        categories.push(Category {
            slug: slug.clone(),
            name: name.clone(),
            parent_slug: parent.clone(),
            depth: depth as u32,
        });
        parent = Some(slug);
    }
    categories
}

/// Interns category prefixes for one execution
///
/// `assign` sets the item's category slug and returns only categories not
/// seen before, so each prefix is upserted once per execution.
#[derive(Debug, Default)]
pub struct TaxonomyBuilder {
    seen: HashSet<String>,
}

impl TaxonomyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, item: &mut ScrapedItem) -> Vec<Category> {
        let categories = categories_for_path(&category_path(item));
        item.category_slug = categories.last().map(|c| c.slug.clone());
        categories
            .into_iter()
            .filter(|c| self.seen.insert(c.slug.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Garden & Outdoor  "), "garden-outdoor");
        assert_eq!(slugify("TV's/Audio"), "tv-s-audio");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_breadcrumbs_skip_home_and_item_title() {
        let mut item = ScrapedItem::new("https://shop.test/p/1", "product_catalog")
            .with_title("Pixel 9")
            .with_breadcrumbs(["Home", "Electronics", "Phones", "Pixel 9"]);

        let mut builder = TaxonomyBuilder::new();
        let created = builder.assign(&mut item);

        assert_eq!(item.category_slug.as_deref(), Some("electronics/phones"));
        assert_eq!(created.len(), 2);
        assert_eq!(created[1].parent_slug.as_deref(), Some("electronics"));
        assert_eq!(created[1].depth, 1);
    }

    #[test]
    fn test_prefixes_are_interned_once() {
        let mut builder = TaxonomyBuilder::new();
        let mut a = ScrapedItem::new("https://shop.test/a", "s").with_breadcrumbs(["Tools", "Saws"]);
        let mut b =
            ScrapedItem::new("https://shop.test/b", "s").with_breadcrumbs(["Tools", "Drills"]);

        assert_eq!(builder.assign(&mut a).len(), 2);
        let second = builder.assign(&mut b);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].slug, "tools/drills");
    }

    #[test]
    fn test_missing_breadcrumbs_infer_from_url() {
        let mut item = ScrapedItem::new("https://shop.test/shop/garden-tools/rake-42", "s");
        let mut builder = TaxonomyBuilder::new();
        builder.assign(&mut item);
        assert_eq!(item.category_slug.as_deref(), Some("garden-tools"));

        let mut shallow = ScrapedItem::new("https://shop.test/rake-42", "s");
        assert!(builder.assign(&mut shallow).is_empty());
        assert!(shallow.category_slug.is_none());
    }
}
