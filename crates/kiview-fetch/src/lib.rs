//! Fetch KiCad projects from local directories, zip archives, GitLab and
//! GitHub, and load them into a [`kiview::Viewer`] in the background.

pub mod config;
pub mod error;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod remote;
pub mod session;
pub mod vfs;

pub use config::FetchConfig;
pub use error::{FetchError, Result};
pub use session::{collect_sheets, LoadResult, Session};
pub use vfs::Vfs;
