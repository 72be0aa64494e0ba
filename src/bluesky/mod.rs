// Bluesky API client — public AppView reads.

pub mod client;
pub mod posts;

pub use client::{PublicAtpClient, DEFAULT_PUBLIC_API_URL};
pub use posts::{PostLookup, PostView};
