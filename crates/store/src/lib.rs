//! A content addressed HTTP storage gateway.
//!
//! Clients `POST` a Z85 encoded object to `/store/<bits>/<hex digest>` and `GET` it
//! back from the same path; objects live in a redis compatible store reached over a
//! unix or tcp socket. `GET /config/<option>` reports how the gateway stores objects.
//!
//! ```text
//!  client ── http ──▶ webstore-web Server ──▶ RouteRegistry
//!                         │ admission              │
//!                         ▼                        ▼
//!                    RateLimiter            StoreHandler × 6, ConfigHandler
//!                         │                        │
//!                         └────────▶ dyn KvStore ◀─┘
//! ```

pub mod app;
pub mod cli;
pub mod context;
pub mod handlers;
pub mod kv;
pub mod limiter;
pub mod logging;
pub mod settings;
pub mod token;
pub mod z85;
