//! relay-server: the HTTP surface for the webhook ingestion & dispatch
//! pipeline: `POST /webhooks/:provider`, `GET /providers`,
//! `POST /dlq/retry`, plus an ambient `/health`.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{RelayApiError, RelayApiResult};
pub use routes::create_router;
pub use state::AppState;
