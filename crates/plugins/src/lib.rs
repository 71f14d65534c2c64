//! Built-in capability providers for Forgeloop.
//!
//! Providers are registered through an explicit constructor table rather
//! than directory scanning: drop a module in, add its constructor to
//! [`default_constructors`], and it's available. The registry isolates a
//! failing constructor so one broken provider never takes down the rest.

pub mod echo;
pub mod filesystem;
pub mod shell;

pub use echo::EchoPlugin;
pub use filesystem::FilesystemPlugin;
pub use shell::ShellPlugin;

use forgeloop_core::plugin::{PluginConstructor, PluginRegistry};
use forgeloop_core::error::PluginError;

/// The default registration table.
///
/// Security defaults:
/// - Shell: only common safe commands (ls, cat, echo, git, pwd, etc.)
/// - Filesystem: sensitive path prefixes are blocked
pub fn default_constructors() -> Vec<PluginConstructor> {
    vec![
        || {
            Ok(Box::new(FilesystemPlugin::with_forbidden_prefixes(vec![
                "/etc".into(),
                "/root/.ssh".into(),
                "/proc".into(),
                "/sys".into(),
            ])))
        },
        || {
            let safe_commands = vec![
                "ls".into(),
                "cat".into(),
                "head".into(),
                "tail".into(),
                "echo".into(),
                "pwd".into(),
                "date".into(),
                "whoami".into(),
                "wc".into(),
                "grep".into(),
                "find".into(),
                "which".into(),
                "git".into(),
                "cargo".into(),
            ];
            Ok(Box::new(ShellPlugin::new(safe_commands)))
        },
        || Ok(Box::new(EchoPlugin)),
    ]
}

/// Load the default registry, logging and skipping any provider that
/// fails to construct.
pub fn default_registry() -> (PluginRegistry, Vec<PluginError>) {
    PluginRegistry::load(&default_constructors())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_loads_all_providers() {
        let (registry, errors) = default_registry();
        assert!(errors.is_empty(), "unexpected load errors: {errors:?}");
        assert!(registry.get("filesystem").is_some());
        assert!(registry.get("shell").is_some());
        assert!(registry.get("echo").is_some());
    }

    #[test]
    fn manifest_covers_every_operation() {
        let (registry, _) = default_registry();
        let manifest = registry.manifest();
        let ops: Vec<String> = manifest
            .iter()
            .map(|e| format!("{}.{}", e.tool_name, e.operation))
            .collect();
        assert!(ops.contains(&"filesystem.read_file".to_string()));
        assert!(ops.contains(&"filesystem.write_file".to_string()));
        assert!(ops.contains(&"shell.run_command".to_string()));
        assert!(ops.contains(&"echo.say".to_string()));
    }
}
