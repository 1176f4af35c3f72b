//! Tools for interfacing with the Git repository.

mod config;
mod object;
mod oid;
mod repo;
mod run;

pub use config::{Config, ConfigRead, GetConfigValue};
pub use object::Commit;
pub use oid::NonZeroOid;
pub use repo::{Error as RepoError, Repo, ResolvedReferenceInfo, Result as RepoResult};
pub use run::{GitRunInfo, GitRunOpts, GitRunResult};
pub(crate) use run::{join_writer_threads, spawn_writer_thread};
