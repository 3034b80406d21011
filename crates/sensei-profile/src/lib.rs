//! Host system profiling.
//!
//! [`SystemProfile::scan`] probes the machine (distro, package manager,
//! shell, developer tools, installed packages) and the markdown
//! rendering becomes standing context for every model request.

mod error;
mod probe;
mod profile;

pub use error::ProfileError;
pub use probe::{detect_package_manager, which};
pub use profile::{ShellInfo, SystemProfile};
