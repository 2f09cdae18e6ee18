use tracing::warn;

use crate::models::{Course, Enrollment};

/// Derive a path token from a title.
///
/// Letters and digits are lowercased and kept; every run of whitespace or
/// punctuation becomes a single `-`, and leading/trailing separators are
/// dropped. Distinct titles may collide ("C++ Basics" and "C Basics" both
/// map to `c-basics`).
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Anything addressable by a title-derived slug.
pub trait Slugged {
    fn slug_source(&self) -> &str;

    fn slug(&self) -> String {
        slugify(self.slug_source())
    }
}

impl Slugged for Course {
    fn slug_source(&self) -> &str {
        &self.title
    }
}

/// Enrollments are addressed by their course's slug.
impl Slugged for Enrollment {
    fn slug_source(&self) -> &str {
        &self.course.title
    }
}

/// Find the first item whose slug matches. Later matches are ignored, with a
/// warning, since the collision cannot be resolved from the slug alone.
pub fn find_by_slug<'a, T: Slugged>(items: &'a [T], slug: &str) -> Option<&'a T> {
    let mut matches = items.iter().filter(|item| item.slug() == slug);
    let first = matches.next()?;
    let others = matches.count();
    if others > 0 {
        warn!(slug, others, "Slug matches more than one title, using the first");
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(id: &str, title: &str) -> Course {
        Course {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            tags: vec![],
            enrollments_count: 0,
            lessons: vec![],
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Rust Basics"), "rust-basics");
        assert_eq!(slugify("  Intro to   Web Dev!  "), "intro-to-web-dev");
        assert_eq!(slugify("Node.js & Express: Part 2"), "node-js-express-part-2");
        assert_eq!(slugify("Café Latte"), "café-latte");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_punctuation_only_difference_collides() {
        assert_eq!(slugify("C++ Basics"), slugify("C Basics"));
    }

    #[test]
    fn test_find_by_slug_first_match_wins() {
        let courses = vec![
            course("1", "Data Science"),
            course("2", "C++ Basics"),
            course("3", "C Basics"),
        ];
        assert_eq!(find_by_slug(&courses, "c-basics").map(|c| c.id.as_str()), Some("2"));
        assert_eq!(find_by_slug(&courses, "data-science").map(|c| c.id.as_str()), Some("1"));
        assert!(find_by_slug(&courses, "missing").is_none());
    }
}
