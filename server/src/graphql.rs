// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The resolver set: root query and mutation objects over the database.
//!
//! Mutation failures are collapsed into one opaque error per operation
//! family, discarding the underlying cause.

use std::sync::Arc;

use async_graphql::{Error, Object};

use crate::{
    database::Database,
    models::{
        ChangePostInput, ChangeProfileInput, ChangeUserInput, CreatePostInput, CreateProfileInput,
        CreateUserInput, EntityId, MemberType, MemberTypeId, OperationHistory, Post, Profile, User,
    },
};

/// The root GraphQL query type.
pub struct QueryRoot {
    pub(crate) database: Arc<Database>,
}

/// The root GraphQL mutation type.
pub struct MutationRoot {
    pub(crate) database: Arc<Database>,
}

#[Object]
impl QueryRoot {
    /// The log of storage operations performed so far.
    async fn stats(&self) -> OperationHistory {
        OperationHistory {
            operation_history: self.database.operations().read_all().await,
        }
    }

    /// A single member tier.
    async fn member_type(&self, id: MemberTypeId) -> Result<Option<MemberType>, Error> {
        Ok(self.database.member_type(id).await?)
    }

    /// All member tiers.
    async fn member_types(&self) -> Result<Vec<MemberType>, Error> {
        Ok(self.database.member_types().await?)
    }

    /// A single post.
    async fn post(&self, id: EntityId) -> Result<Option<Post>, Error> {
        Ok(self.database.post(id).await?)
    }

    /// All posts.
    async fn posts(&self) -> Result<Vec<Post>, Error> {
        Ok(self.database.posts().await?)
    }

    /// A single user, with relations loaded eagerly.
    async fn user(&self, id: EntityId) -> Result<Option<User>, Error> {
        Ok(self.database.user(id).await?)
    }

    /// All users.
    async fn users(&self) -> Result<Vec<User>, Error> {
        Ok(self.database.users(None).await?)
    }

    /// A single profile.
    async fn profile(&self, id: EntityId) -> Result<Option<Profile>, Error> {
        Ok(self.database.profile(id).await?)
    }

    /// All profiles.
    async fn profiles(&self) -> Result<Vec<Profile>, Error> {
        Ok(self.database.profiles().await?)
    }
}

#[Object]
impl MutationRoot {
    async fn create_user(&self, dto: CreateUserInput) -> Result<User, Error> {
        self.database
            .create_user(dto)
            .await
            .map_err(|_| Error::new("Error creating user"))
    }

    async fn change_user(&self, id: EntityId, dto: ChangeUserInput) -> Result<User, Error> {
        self.database
            .update_user(id, dto)
            .await
            .map_err(|_| Error::new(format!("Error changing user with id: {id}")))
    }

    async fn delete_user(&self, id: EntityId) -> Result<String, Error> {
        self.database
            .delete_user(id)
            .await
            .map_err(|_| Error::new(format!("Error deleting user with id: {id}")))?;
        Ok(format!("User with id: {id} was successfully deleted."))
    }

    async fn create_post(&self, dto: CreatePostInput) -> Result<Post, Error> {
        self.database
            .create_post(dto)
            .await
            .map_err(|_| Error::new("Error creating post"))
    }

    async fn change_post(&self, id: EntityId, dto: ChangePostInput) -> Result<Post, Error> {
        self.database
            .update_post(id, dto)
            .await
            .map_err(|_| Error::new(format!("Error changing post with id: {id}")))
    }

    async fn delete_post(&self, id: EntityId) -> Result<String, Error> {
        self.database
            .delete_post(id)
            .await
            .map_err(|_| Error::new(format!("Error deleting post with id: {id}")))?;
        Ok(format!("Post with id: {id} was successfully deleted."))
    }

    async fn create_profile(&self, dto: CreateProfileInput) -> Result<Profile, Error> {
        self.database
            .create_profile(dto)
            .await
            .map_err(|_| Error::new("Error creating profile"))
    }

    async fn change_profile(
        &self,
        id: EntityId,
        dto: ChangeProfileInput,
    ) -> Result<Profile, Error> {
        self.database
            .update_profile(id, dto)
            .await
            .map_err(|_| Error::new(format!("Error changing profile with id: {id}")))
    }

    async fn delete_profile(&self, id: EntityId) -> Result<String, Error> {
        self.database
            .delete_profile(id)
            .await
            .map_err(|_| Error::new(format!("Error deleting profile with id: {id}")))?;
        Ok(format!("Profile with id: {id} was successfully deleted."))
    }

    async fn subscribe_to(&self, user_id: EntityId, author_id: EntityId) -> Result<String, Error> {
        self.database
            .subscribe(user_id, author_id)
            .await
            .map_err(|_| Error::new(format!("Error subscribing to user with id: {author_id}")))?;
        Ok(format!(
            "User with id: {user_id} successfully subscribed to the user with id: {author_id}"
        ))
    }

    async fn unsubscribe_from(
        &self,
        user_id: EntityId,
        author_id: EntityId,
    ) -> Result<String, Error> {
        self.database
            .unsubscribe(user_id, author_id)
            .await
            .map_err(|_| {
                Error::new(format!("Error unsubscribing from user with id: {author_id}"))
            })?;
        Ok(format!(
            "User with id: {user_id} successfully unsubscribed from the user with id: {author_id}"
        ))
    }
}
