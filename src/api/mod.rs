//! API Module
//!
//! HTTP admin surface over the cache facade.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value
//! - `GET /get/:key?namespace=` - Retrieve a value
//! - `DELETE /del/:key?namespace=` - Invalidate a key
//! - `DELETE /namespace/:namespace` - Invalidate a whole namespace
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
