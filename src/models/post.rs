use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ValidationError, check_length};
use crate::constants::limits::{
    AUTHOR_MAX_CHARS, CONTENT_MAX_CHARS, EXCERPT_CHARS, TITLE_MAX_CHARS,
};
use crate::entities::posts;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<posts::Model> for Post {
    fn from(model: posts::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            content: model.content,
            author: model.author,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// A validated set of fields for a post that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    title: String,
    content: String,
    author: String,
}

impl PostDraft {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let draft = Self {
            title: title.into(),
            content: content.into(),
            author: author.into(),
        };
        check_length("title", &draft.title, TITLE_MAX_CHARS)?;
        check_length("content", &draft.content, CONTENT_MAX_CHARS)?;
        check_length("author", &draft.author, AUTHOR_MAX_CHARS)?;
        Ok(draft)
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }
}

/// Partial update for a post. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PostPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl PostPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            check_length("title", title, TITLE_MAX_CHARS)?;
        }
        if let Some(content) = &self.content {
            check_length("content", content, CONTENT_MAX_CHARS)?;
        }
        Ok(())
    }
}

/// Listing entry: the post without its full body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostSummary {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub excerpt: String,
}

impl From<Post> for PostSummary {
    fn from(post: Post) -> Self {
        Self {
            excerpt: excerpt(&post.content),
            id: post.id,
            title: post.title,
            author: post.author,
            created_at: post.created_at,
        }
    }
}

/// First 120 characters on one line, with `...` when cut.
#[must_use]
pub fn excerpt(content: &str) -> String {
    let flat: String = content
        .chars()
        .map(|c| if matches!(c, '\r' | '\n') { ' ' } else { c })
        .collect();

    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }

    let mut cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}
