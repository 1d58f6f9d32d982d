//! Constants shared across the frontend.

/// Staging directory that receives one artifact per declared source.
pub const SOURCES_DIR: &str = "SOURCES";

/// Directory that receives the rendered packaging metadata.
pub const SPECS_DIR: &str = "SPECS";

/// Default name of the entrypoint document read from the build context.
pub const DEFAULT_ENTRYPOINT: &str = "Dockerfile";

/// Build context a `context` source refers to when it names none.
pub const DEFAULT_CONTEXT_NAME: &str = "context";

/// Build context holding the entrypoint document itself.
pub const ENTRYPOINT_CONTEXT_NAME: &str = "dockerfile";

/// Request id of the "list targets" subrequest.
pub const LIST_TARGETS_REQUEST_ID: &str = "frontend.targets";

/// Exit code signalling a fatal frontend error to the engine's caller.
pub const FATAL_EXIT_CODE: i32 = 137;

/// Subcommand the frontend binary exposes for directory archival.
pub const SELF_TAR_SUBCOMMAND: &str = "tar";

/// Suffix of the archive produced for directory-shaped sources.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Default permissions for directories created by the compiler.
pub const DIR_MODE: u32 = 0o755;

/// Default permissions for inline files that declare none.
pub const FILE_MODE: u32 = 0o644;

/// Permissions of the rendered metadata file.
pub const SPEC_FILE_MODE: u32 = 0o640;
