// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The server component of the sociograph GraphQL API.
//!
//! A single `POST /` endpoint accepts `{query, variables?}` documents,
//! validates them (standard rules plus a maximum nesting depth) and executes
//! them against the social graph stored in SQLite. GraphQL-level errors ride
//! in the 200-status `{data, errors}` envelope.

pub mod database;
pub mod graphql;
pub mod models;
pub mod stats;

#[cfg(test)]
mod tests;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use async_graphql::{EmptySubscription, Schema};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{Extension, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::{
    database::Database,
    graphql::{MutationRoot, QueryRoot},
};

/// Maximum nesting depth accepted for a single GraphQL document. Deeper
/// documents are rejected at validation time, before any resolver runs.
pub const MAX_QUERY_DEPTH: usize = 5;

/// The schema served by this service.
pub type ServiceSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Configuration for the sociograph service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub port: u16,
    pub database_path: PathBuf,
}

/// A GraphQL interface to the social graph: users, profiles, posts, member
/// tiers and the subscription relation between users.
#[derive(Clone)]
pub struct GraphQlService {
    database: Arc<Database>,
    port: u16,
}

impl GraphQlService {
    /// Creates a new instance of the service, opening (or creating) the
    /// database at the configured path.
    pub async fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        let database = Database::open(&config.database_path)
            .await
            .context("Failed to initialize the sociograph database")?;
        Ok(Self {
            database: Arc::new(database),
            port: config.port,
        })
    }

    /// Builds the GraphQL schema served by this service.
    pub fn schema(&self) -> ServiceSchema {
        build_schema(Arc::clone(&self.database))
    }

    /// Runs the service until the cancellation token fires.
    #[tracing::instrument(name = "GraphQlService::run", skip_all, fields(port = self.port))]
    pub async fn run(self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let port = self.port;
        let index_handler = axum::routing::get(graphiql).post(Self::index_handler);

        let app = Router::new()
            .route("/", index_handler)
            .route("/ready", axum::routing::get(|| async { "ready!" }))
            .layer(Extension(self.clone()))
            .layer(CorsLayer::permissive());

        info!("GraphiQL IDE: http://localhost:{}", port);

        let tcp_listener =
            tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        axum::serve(tcp_listener, app)
            .with_graceful_shutdown(cancellation_token.cancelled_owned())
            .await?;

        Ok(())
    }

    /// Executes a GraphQL query and generates a response for our `Schema`.
    async fn index_handler(service: Extension<Self>, request: GraphQLRequest) -> GraphQLResponse {
        let schema = service.0.schema();
        schema.execute(request.into_inner()).await.into()
    }
}

/// Builds the schema over the given database, with the validation limits
/// applied.
pub fn build_schema(database: Arc<Database>) -> ServiceSchema {
    Schema::build(
        QueryRoot {
            database: Arc::clone(&database),
        },
        MutationRoot {
            database: Arc::clone(&database),
        },
        EmptySubscription,
    )
    .data(database)
    .limit_depth(MAX_QUERY_DEPTH)
    .finish()
}

/// Returns an HTML response constructing the GraphiQL web page for the given
/// URI.
pub(crate) async fn graphiql(uri: axum::http::Uri) -> impl axum::response::IntoResponse {
    axum::response::Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint(uri.path())
            .finish(),
    )
}

/// Cancels the token as soon as one of the usual termination signals arrives.
pub async fn listen_for_shutdown_signals(shutdown_sender: CancellationToken) {
    use tokio::signal::unix;

    let mut sigint =
        unix::signal(unix::SignalKind::interrupt()).expect("Failed to set up SIGINT handler");
    let mut sigterm =
        unix::signal(unix::SignalKind::terminate()).expect("Failed to set up SIGTERM handler");
    let mut sighup =
        unix::signal(unix::SignalKind::hangup()).expect("Failed to set up SIGHUP handler");

    tokio::select! {
        _ = sigint.recv() => (),
        _ = sigterm.recv() => (),
        _ = sighup.recv() => (),
    }

    shutdown_sender.cancel();
}
