//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - conflicting dependencies, duplicate resources
pub const VALIDATION_ERROR: i32 = 2;

/// `diff --detailed-exitcode` found changes
pub const CHANGES_DETECTED: i32 = 2;

/// Chart generation failed in a patch or injector stage
pub const TEMPLATE_ERROR: i32 = 3;

/// Input could not be resolved to manifests or a chart
pub const CHART_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Interrupted by Ctrl-C
pub const INTERRUPTED: i32 = 130;
