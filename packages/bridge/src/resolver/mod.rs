// packages/bridge/src/resolver/mod.rs
//! Resolver side of the bridge
//!
//! - **Endpoint**: registers over a channel and answers forwarded requests
//! - **Content**: exact-path lookup in the virtual tree
//! - **Media Type**: extension table
//! - **Auto Index**: generated listing for projects without a default document
//!
//! # Request handling
//!
//! ```text
//! FETCH_REQUEST ─▶ normalize path ─▶ lookup ─┬─ found ─────────▶ 200 + media type
//!                                            ├─ default doc ───▶ 200 auto-index
//!                                            ├─ missing ───────▶ 404 text/plain
//!                                            └─ error/panic ───▶ 500 + error
//! ```

pub mod auto_index;
pub mod content;
pub mod endpoint;
pub mod media_type;

pub use content::{resolve, ResolvedContent};
pub use endpoint::{RegistrationState, ResolverConfig, ResolverEndpoint, ResolverSession};
pub use media_type::media_type_for;
