use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PICTURE: &str =
    "https://res.cloudinary.com/dx8ht3lz4/image/upload/v1726091507/default_profile_photo.jpg";

/// Error for stored or submitted values outside an enumerated set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// A full identity record, credentials included. Never serialized directly.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub federation_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub picture: String,
    pub cover: Option<String>,
    pub b_year: i32,
    pub b_month: u32,
    pub b_day: u32,
    pub gender: Option<String>,
    pub verified: bool,
    pub details: Details,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            username: self.username.clone(),
            picture: self.picture.clone(),
            cover: self.cover.clone(),
        }
    }

    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            picture: self.picture.clone(),
            cover: self.cover.clone(),
            b_year: self.b_year,
            b_month: self.b_month,
            b_day: self.b_day,
            gender: self.gender.clone(),
            verified: self.verified,
            details: self.details.clone(),
            created_at: self.created_at,
        }
    }
}

/// Profile fields resolved wherever another identity is referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub picture: String,
    pub cover: Option<String>,
}

/// Everything about an identity that may leave the server.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub picture: String,
    pub cover: Option<String>,
    pub b_year: i32,
    pub b_month: u32,
    pub b_day: u32,
    pub gender: Option<String>,
    pub verified: bool,
    pub details: Details,
    pub created_at: DateTime<Utc>,
}

/// Free-form profile block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Details {
    pub bio: Option<String>,
    pub other_name: Option<String>,
    pub job: Option<String>,
    pub workplace: Option<String>,
    pub high_school: Option<String>,
    pub college: Option<String>,
    pub current_city: Option<String>,
    pub hometown: Option<String>,
    pub relationship: Option<RelationshipStatus>,
    pub instagram: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipStatus {
    Single,
    #[serde(rename = "In a relationship")]
    InARelationship,
    Married,
    Divorced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PostKind {
    ProfilePicture,
    CoverPicture,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProfilePicture => "profilePicture",
            Self::CoverPicture => "coverPicture",
        }
    }
}

impl FromStr for PostKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profilePicture" => Ok(Self::ProfilePicture),
            "coverPicture" => Ok(Self::CoverPicture),
            other => Err(UnknownVariant {
                kind: "post kind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Love,
    Haha,
    Sad,
    Angry,
    Wow,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 6] = [
        Self::Like,
        Self::Love,
        Self::Haha,
        Self::Sad,
        Self::Angry,
        Self::Wow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Love => "love",
            Self::Haha => "haha",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Wow => "wow",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "reaction",
                value: s.to_string(),
            })
    }
}

/// A post with its author and embedded comments resolved.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: String,
    pub kind: Option<PostKind>,
    pub text: Option<String>,
    pub images: Vec<String>,
    pub background: Option<String>,
    pub user: UserSummary,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub comment: String,
    pub image: Option<String>,
    pub comment_by: UserSummary,
    pub comment_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResetCode {
    pub id: String,
    pub user_id: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ResetCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchEntry {
    pub user: UserSummary,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedPost {
    pub post_id: String,
    pub saved_at: DateTime<Utc>,
}
