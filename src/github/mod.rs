//! Repository download through the GitHub contents API.

pub mod fetch;

pub use fetch::{
    contents_api_url, has_allowed_extension, FetchReport, RepoFetcher, ALLOWED_EXTENSIONS,
};
