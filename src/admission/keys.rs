//! Cache key derivation and invalidation patterns
//!
//! Keys are `:`-joined: the prefix, then positional parts, then `name=value`
//! pairs sorted by name. `None` values are skipped so that optional filters
//! do not fragment the key space.
//!
//! ```text
//! book:1
//! books:page=1:per_page=10
//! search:author_id=3:genre_id=2:q=orwell
//! book:7:reviews:page=1:per_page=20
//! genre:2:books:page=1:per_page=20
//! ```

use std::fmt;

/// Which TTL bucket a cached response falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// A single entity by id
    Item,
    /// Free-text or filtered search results
    Search,
    /// Paginated collections
    Listing,
}

/// A cache key together with the class that decides its TTL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    class: ResourceClass,
}

impl CacheKey {
    pub fn new(key: impl Into<String>, class: ResourceClass) -> Self {
        Self {
            key: key.into(),
            class,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn class(&self) -> ResourceClass {
        self.class
    }

    pub fn book(id: i64) -> Self {
        Self::new(make_key("book", &[&id.to_string()], &[]), ResourceClass::Item)
    }

    pub fn books(page: u32, per_page: u32) -> Self {
        Self::new(
            make_key(
                "books",
                &[],
                &[
                    ("page", Some(page.to_string())),
                    ("per_page", Some(per_page.to_string())),
                ],
            ),
            ResourceClass::Listing,
        )
    }

    pub fn search(
        query: Option<&str>,
        author_id: Option<i64>,
        genre_id: Option<i64>,
        page: u32,
        per_page: u32,
    ) -> Self {
        Self::new(
            make_key(
                "search",
                &[],
                &[
                    ("q", query.map(|q| q.trim().to_lowercase())),
                    ("author_id", author_id.map(|id| id.to_string())),
                    ("genre_id", genre_id.map(|id| id.to_string())),
                    ("page", Some(page.to_string())),
                    ("per_page", Some(per_page.to_string())),
                ],
            ),
            ResourceClass::Search,
        )
    }

    pub fn author(id: i64) -> Self {
        Self::new(make_key("author", &[&id.to_string()], &[]), ResourceClass::Item)
    }

    pub fn authors(page: u32, per_page: u32) -> Self {
        Self::new(
            make_key(
                "authors",
                &[],
                &[
                    ("page", Some(page.to_string())),
                    ("per_page", Some(per_page.to_string())),
                ],
            ),
            ResourceClass::Listing,
        )
    }

    pub fn author_books(author_id: i64, page: u32, per_page: u32) -> Self {
        Self::new(
            make_key(
                "author",
                &[&author_id.to_string(), "books"],
                &[
                    ("page", Some(page.to_string())),
                    ("per_page", Some(per_page.to_string())),
                ],
            ),
            ResourceClass::Listing,
        )
    }

    pub fn genre(id: i64) -> Self {
        Self::new(make_key("genre", &[&id.to_string()], &[]), ResourceClass::Item)
    }

    pub fn genres(page: u32, per_page: u32) -> Self {
        Self::new(
            make_key(
                "genres",
                &[],
                &[
                    ("page", Some(page.to_string())),
                    ("per_page", Some(per_page.to_string())),
                ],
            ),
            ResourceClass::Listing,
        )
    }

    pub fn genre_books(genre_id: i64, page: u32, per_page: u32) -> Self {
        Self::new(
            make_key(
                "genre",
                &[&genre_id.to_string(), "books"],
                &[
                    ("page", Some(page.to_string())),
                    ("per_page", Some(per_page.to_string())),
                ],
            ),
            ResourceClass::Listing,
        )
    }

    pub fn review(id: i64) -> Self {
        Self::new(make_key("review", &[&id.to_string()], &[]), ResourceClass::Item)
    }

    pub fn book_reviews(book_id: i64, page: u32, per_page: u32) -> Self {
        Self::new(
            make_key(
                "book",
                &[&book_id.to_string(), "reviews"],
                &[
                    ("page", Some(page.to_string())),
                    ("per_page", Some(per_page.to_string())),
                ],
            ),
            ResourceClass::Listing,
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Build a key from a prefix, positional parts and named parts.
pub fn make_key(prefix: &str, positional: &[&str], named: &[(&str, Option<String>)]) -> String {
    let mut parts: Vec<String> = vec![prefix.to_string()];
    parts.extend(
        positional
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string()),
    );

    let mut named: Vec<&(&str, Option<String>)> = named.iter().collect();
    named.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in named {
        if let Some(value) = value {
            parts.push(format!("{}={}", name, value));
        }
    }

    parts.join(":")
}

/// A write that must evict cached responses before it is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    Book { id: Option<i64> },
    Author { id: Option<i64> },
    Genre { id: Option<i64> },
    /// `id: None` evicts every cached single review of the book.
    Review { book_id: i64, id: Option<i64> },
}

impl Invalidation {
    /// Exact keys to delete.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Invalidation::Book { id } => id.map(|id| CacheKey::book(id).key).into_iter().collect(),
            Invalidation::Author { id } => {
                id.map(|id| CacheKey::author(id).key).into_iter().collect()
            }
            Invalidation::Genre { id } => {
                id.map(|id| CacheKey::genre(id).key).into_iter().collect()
            }
            Invalidation::Review { book_id, id } => {
                let mut keys = vec![CacheKey::book(*book_id).key];
                keys.extend(id.map(|id| CacheKey::review(id).key));
                keys
            }
        }
    }

    /// Glob patterns to delete (`*` matches any run of characters).
    pub fn patterns(&self) -> Vec<String> {
        match self {
            Invalidation::Book { .. } => vec![
                "books:*".to_string(),
                "search:*".to_string(),
                "author:*:books:*".to_string(),
                "genre:*:books:*".to_string(),
            ],
            Invalidation::Author { id } => {
                let mut patterns = Vec::with_capacity(5);
                if let Some(id) = id {
                    patterns.push(format!("author:{}:books:*", id));
                }
                patterns.extend([
                    "authors:*".to_string(),
                    "books:*".to_string(),
                    "book:*".to_string(),
                    "search:*".to_string(),
                ]);
                patterns
            }
            Invalidation::Genre { id } => {
                let mut patterns = Vec::with_capacity(5);
                if let Some(id) = id {
                    patterns.push(format!("genre:{}:books:*", id));
                }
                patterns.extend([
                    "genres:*".to_string(),
                    "books:*".to_string(),
                    "book:*".to_string(),
                    "search:*".to_string(),
                ]);
                patterns
            }
            Invalidation::Review { book_id, id } => {
                let mut patterns = vec![
                    format!("book:{}:reviews:*", book_id),
                    "reviews:*".to_string(),
                    "books:*".to_string(),
                    "search:*".to_string(),
                ];
                if id.is_none() {
                    patterns.push("review:*".to_string());
                }
                patterns
            }
        }
    }
}

/// Redis-style glob match supporting only `*`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            pi += 1;
            resume = ti;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            resume += 1;
            ti = resume;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_key_sorts_named_and_skips_none() {
        assert_eq!(make_key("book", &["1"], &[]), "book:1");
        assert_eq!(
            make_key(
                "search",
                &[],
                &[
                    ("q", Some("orwell".into())),
                    ("genre_id", None),
                    ("author_id", Some("3".into())),
                ]
            ),
            "search:author_id=3:q=orwell"
        );
    }

    #[test]
    fn test_typed_keys() {
        assert_eq!(CacheKey::book(1).as_str(), "book:1");
        assert_eq!(CacheKey::books(1, 10).as_str(), "books:page=1:per_page=10");
        assert_eq!(CacheKey::books(1, 10).class(), ResourceClass::Listing);
        assert_eq!(
            CacheKey::search(Some(" Orwell "), None, None, 1, 20).as_str(),
            "search:page=1:per_page=20:q=orwell"
        );
        assert_eq!(
            CacheKey::search(None, Some(3), Some(2), 1, 20).as_str(),
            "search:author_id=3:genre_id=2:page=1:per_page=20"
        );
        assert_eq!(CacheKey::review(5).as_str(), "review:5");
        assert_eq!(
            CacheKey::genre_books(2, 1, 20).as_str(),
            "genre:2:books:page=1:per_page=20"
        );
        assert_eq!(
            CacheKey::author_books(4, 2, 5).as_str(),
            "author:4:books:page=2:per_page=5"
        );
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("books:*", "books:page=1:per_page=10"));
        assert!(glob_match("author:*:books:*", "author:4:books:page=1"));
        assert!(!glob_match("author:*:books:*", "author:4"));
        assert!(glob_match("book:*", "book:1:reviews:page=1"));
        assert!(!glob_match("book:*", "books:page=1"));
        assert!(glob_match("*", ""));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    fn evicts(inv: Invalidation, key: &CacheKey) -> bool {
        let key = key.as_str();
        inv.keys().iter().any(|k| k == key) || inv.patterns().iter().any(|p| glob_match(p, key))
    }

    #[test]
    fn test_book_invalidation_covers_listings_but_not_other_items() {
        let inv = Invalidation::Book { id: Some(3) };

        assert!(evicts(inv, &CacheKey::book(3)));
        assert!(evicts(inv, &CacheKey::books(1, 10)));
        assert!(evicts(inv, &CacheKey::search(Some("x"), None, None, 1, 10)));
        assert!(evicts(inv, &CacheKey::author_books(9, 1, 10)));
        assert!(evicts(inv, &CacheKey::genre_books(2, 1, 10)));
        assert!(!evicts(inv, &CacheKey::book(4)));
        assert!(!evicts(inv, &CacheKey::authors(1, 10)));
        assert!(!evicts(inv, &CacheKey::genre(2)));
    }

    #[test]
    fn test_genre_invalidation_covers_books_but_not_other_genres() {
        let inv = Invalidation::Genre { id: Some(2) };

        assert!(evicts(inv, &CacheKey::genre(2)));
        assert!(evicts(inv, &CacheKey::genre_books(2, 1, 10)));
        assert!(evicts(inv, &CacheKey::genres(1, 10)));
        assert!(evicts(inv, &CacheKey::book(8)));
        assert!(evicts(inv, &CacheKey::search(None, None, Some(2), 1, 10)));
        assert!(!evicts(inv, &CacheKey::genre(3)));
        assert!(!evicts(inv, &CacheKey::genre_books(3, 1, 10)));
    }

    #[test]
    fn test_review_invalidation_scope() {
        let single = Invalidation::Review {
            book_id: 7,
            id: Some(4),
        };
        assert!(evicts(single, &CacheKey::review(4)));
        assert!(evicts(single, &CacheKey::book(7)));
        assert!(evicts(single, &CacheKey::book_reviews(7, 1, 20)));
        assert!(!evicts(single, &CacheKey::review(5)));

        let whole_book = Invalidation::Review {
            book_id: 7,
            id: None,
        };
        assert!(evicts(whole_book, &CacheKey::review(5)));
        assert!(!evicts(whole_book, &CacheKey::book_reviews(8, 1, 20)));
    }
}
