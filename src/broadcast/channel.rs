//! Channel names
//!
//! Three shapes are accepted:
//! - `books`, `reviews` (collection channels)
//! - `book:{id}` (entity channels)
//! - `user:{id}` (private channels, subscriber must be that user)

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Collection(String),
    Entity { resource: String, id: String },
    User(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid channel name: {0}")]
pub struct InvalidChannel(pub String);

impl Channel {
    pub fn collection(name: &str) -> Self {
        Channel::Collection(name.to_string())
    }

    pub fn entity(resource: &str, id: impl ToString) -> Self {
        Channel::Entity {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    pub fn user(id: impl ToString) -> Self {
        Channel::User(id.to_string())
    }

    /// The user a private channel belongs to.
    pub fn owner(&self) -> Option<&str> {
        match self {
            Channel::User(id) => Some(id),
            _ => None,
        }
    }
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

impl FromStr for Channel {
    type Err = InvalidChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidChannel(s.to_string());
        if s.len() > MAX_LEN {
            return Err(invalid());
        }

        match s.split_once(':') {
            None if valid_segment(s) => Ok(Channel::Collection(s.to_string())),
            Some((resource, id)) if valid_segment(resource) && valid_segment(id) => {
                if resource == "user" {
                    Ok(Channel::User(id.to_string()))
                } else {
                    Ok(Channel::Entity {
                        resource: resource.to_string(),
                        id: id.to_string(),
                    })
                }
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Collection(name) => f.write_str(name),
            Channel::Entity { resource, id } => write!(f, "{}:{}", resource, id),
            Channel::User(id) => write!(f, "user:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_shapes() {
        assert_eq!("books".parse::<Channel>().unwrap(), Channel::collection("books"));
        assert_eq!("book:12".parse::<Channel>().unwrap(), Channel::entity("book", 12));
        assert_eq!("user:42".parse::<Channel>().unwrap(), Channel::user(42));
    }

    #[test]
    fn test_display_round_trips() {
        for name in ["books", "reviews", "book:12", "user:42"] {
            assert_eq!(name.parse::<Channel>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        for name in ["", "Books", "book:", ":1", "a:b:c", "book 1", "user:"] {
            assert!(name.parse::<Channel>().is_err(), "{name} should be rejected");
        }
        assert!("a".repeat(200).parse::<Channel>().is_err());
    }

    #[test]
    fn test_owner() {
        assert_eq!(Channel::user(7).owner(), Some("7"));
        assert_eq!(Channel::entity("book", 7).owner(), None);
    }
}
