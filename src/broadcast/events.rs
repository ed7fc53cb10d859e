//! Domain events published after successful writes

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::channel::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    Deleted,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Deleted => "deleted",
        }
    }
}

/// An event kind plus payload plus target channels.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub kind: String,
    pub data: Value,
    pub channels: Vec<Channel>,
    pub timestamp: DateTime<Utc>,
}

fn with_field(data: Value, field: &str, value: Value) -> Value {
    let mut map = match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            map
        }
    };
    map.insert(field.to_string(), value);
    Value::Object(map)
}

impl DomainEvent {
    pub fn new(kind: impl Into<String>, data: Value, channels: Vec<Channel>) -> Self {
        Self {
            kind: kind.into(),
            data,
            channels,
            timestamp: Utc::now(),
        }
    }

    /// `book.{action}` on `books` and `book:{id}`.
    pub fn book(action: Action, book_id: i64, data: Value) -> Self {
        Self::new(
            format!("book.{}", action.as_str()),
            with_field(data, "book_id", json!(book_id)),
            vec![Channel::collection("books"), Channel::entity("book", book_id)],
        )
    }

    /// `review.{action}` on `reviews`, `book:{id}`, and the author's private channel.
    pub fn review(
        action: Action,
        book_id: i64,
        review_id: i64,
        user_id: Option<i64>,
        data: Value,
    ) -> Self {
        let data = with_field(data, "book_id", json!(book_id));
        let data = with_field(data, "review_id", json!(review_id));

        let mut channels = vec![Channel::collection("reviews"), Channel::entity("book", book_id)];
        if let Some(user_id) = user_id {
            channels.push(Channel::user(user_id));
        }

        Self::new(format!("review.{}", action.as_str()), data, channels)
    }

    /// Private notification, only delivered on `user:{id}`.
    pub fn user_notification(user_id: i64, notification_type: &str, data: Value) -> Self {
        let data = with_field(data, "notification_type", json!(notification_type));
        Self::new("user.notification", data, vec![Channel::user(user_id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_book_event_targets() {
        let event = DomainEvent::book(Action::Created, 5, json!({"title": "Dune"}));
        assert_eq!(event.kind, "book.created");
        assert_eq!(event.data, json!({"title": "Dune", "book_id": 5}));
        assert_eq!(
            event.channels,
            vec![Channel::collection("books"), Channel::entity("book", 5)]
        );
    }

    #[test]
    fn test_review_event_targets() {
        let event = DomainEvent::review(Action::Created, 5, 9, Some(42), json!({"rating": 4}));
        assert_eq!(event.kind, "review.created");
        assert_eq!(event.data["review_id"], json!(9));
        assert_eq!(event.channels.len(), 3);
        assert_eq!(event.channels[2], Channel::user(42));

        let anonymous = DomainEvent::review(Action::Deleted, 5, 9, None, Value::Null);
        assert_eq!(anonymous.channels.len(), 2);
    }

    #[test]
    fn test_user_notification_is_private() {
        let event = DomainEvent::user_notification(42, "api_key_created", json!({}));
        assert_eq!(event.kind, "user.notification");
        assert_eq!(event.channels, vec![Channel::user(42)]);
    }
}
