//! Pull side of notification sync: list and mutate.

mod http_client;
mod trait_def;

pub use http_client::{HttpQueryClient, SESSION_COOKIE};
pub use trait_def::QueryClient;
