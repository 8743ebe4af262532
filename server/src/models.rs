// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The GraphQL type registry for the sociograph API: entity objects, the
//! member tier enumeration, the identifier scalar and the mutation inputs.

use std::{fmt, str::FromStr, sync::Arc};

use async_graphql::{
    ComplexObject, Context, Enum, Error, InputObject, InputValueError, InputValueResult, Scalar,
    ScalarType, SimpleObject, Value,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::Database;

/// An opaque unique identifier, wire-encoded as a canonical UUID string.
///
/// Identifiers are server-generated and immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(value)?))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Only syntactically valid UUID strings are accepted; anything else fails
/// coercion before a resolver runs.
#[Scalar(name = "UUID")]
impl ScalarType for EntityId {
    fn parse(value: Value) -> InputValueResult<Self> {
        if let Value::String(string) = &value {
            return match Uuid::parse_str(string) {
                Ok(uuid) => Ok(EntityId(uuid)),
                Err(_) => Err(InputValueError::custom("is not a valid UUID")),
            };
        }
        Err(InputValueError::expected_type(value))
    }

    fn is_valid(value: &Value) -> bool {
        matches!(value, Value::String(string) if Uuid::parse_str(string).is_ok())
    }

    fn to_value(&self) -> Value {
        Value::String(self.0.to_string())
    }
}

/// The fixed enumeration of member tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberTypeId {
    Basic,
    Business,
}

impl MemberTypeId {
    /// The identifier as stored in the `member_types` table.
    pub fn as_str(self) -> &'static str {
        match self {
            MemberTypeId::Basic => "BASIC",
            MemberTypeId::Business => "BUSINESS",
        }
    }

    /// Decodes a stored identifier.
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "BASIC" => Some(MemberTypeId::Basic),
            "BUSINESS" => Some(MemberTypeId::Business),
            _ => None,
        }
    }
}

/// A member tier: static reference data, never created or deleted through
/// this API.
#[derive(Debug, Clone, SimpleObject)]
pub struct MemberType {
    pub id: MemberTypeId,
    pub discount: f64,
    pub posts_limit_per_month: i32,
}

/// A post authored by a user.
#[derive(Debug, Clone, SimpleObject)]
pub struct Post {
    pub id: EntityId,
    pub title: String,
    pub content: String,
    pub author_id: EntityId,
}

/// A user's profile. Each user owns at most one.
#[derive(Debug, Clone, SimpleObject)]
pub struct Profile {
    pub id: EntityId,
    pub is_male: bool,
    pub year_of_birth: i32,
    pub user_id: EntityId,
    pub member_type: MemberType,
}

/// A user of the social graph, loaded together with its relations.
///
/// The raw subscription edges are kept out of the schema; the public
/// `userSubscribedTo` and `subscribedToUser` fields materialize them into
/// full `User` objects below.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub balance: f64,
    pub profile: Option<Profile>,
    pub posts: Vec<Post>,
    #[graphql(skip)]
    pub subscribed_to: Vec<EntityId>,
    #[graphql(skip)]
    pub subscribers: Vec<EntityId>,
}

#[ComplexObject]
impl User {
    /// The users this user is subscribed to.
    async fn user_subscribed_to(&self, ctx: &Context<'_>) -> Result<Vec<User>, Error> {
        let database = ctx.data_unchecked::<Arc<Database>>();
        Ok(database.users(Some(self.subscribed_to.as_slice())).await?)
    }

    /// The users subscribed to this user.
    async fn subscribed_to_user(&self, ctx: &Context<'_>) -> Result<Vec<User>, Error> {
        let database = ctx.data_unchecked::<Arc<Database>>();
        Ok(database.users(Some(self.subscribers.as_slice())).await?)
    }
}

/// One recorded storage call.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Operation")]
pub struct OperationRecord {
    pub model: String,
    pub operation: String,
    pub args: String,
}

/// The process-held log of storage operations.
#[derive(Debug, Clone, SimpleObject)]
pub struct OperationHistory {
    pub operation_history: Vec<OperationRecord>,
}

#[derive(Debug, Clone, InputObject, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    pub name: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Default, InputObject, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUserInput {
    pub name: Option<String>,
    pub balance: Option<f64>,
}

#[derive(Debug, Clone, InputObject, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    pub title: String,
    pub content: String,
    pub author_id: EntityId,
}

#[derive(Debug, Clone, Default, InputObject, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePostInput {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, InputObject, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileInput {
    pub is_male: bool,
    pub year_of_birth: i32,
    pub member_type_id: MemberTypeId,
    pub user_id: EntityId,
}

#[derive(Debug, Clone, Default, InputObject, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeProfileInput {
    pub is_male: Option<bool>,
    pub year_of_birth: Option<i32>,
    pub member_type_id: Option<MemberTypeId>,
}
