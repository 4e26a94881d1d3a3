//! Compiler configuration: the flag surface threaded through the pipeline.
//!
//! A plain `#[derive(Debug, Clone)]` struct with a builder-method API and a
//! `#[cfg(test)] mod tests` exercising each builder call, rather than a
//! global/`static` config.

use serde::Deserialize;
use std::path::PathBuf;

/// Threaded explicitly through `lexer -> parser -> type checker`, never as
/// global/thread-local state.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// `--no-builtins`: skip populating `__operator__*` overloads.
    pub no_builtins: bool,
    /// `--print-ast`: pretty-print the checked tree after compilation.
    pub print_ast: bool,
    /// `--warns-as-errors`: warnings count toward `error_count`.
    pub warns_as_errors: bool,
    /// `--max-errors N`, clamped to at least 2.
    pub max_errors: usize,
    /// `--max-warns N`.
    pub max_warns: usize,
    /// `-I <dir>` / `--include-dir <dir>`, repeatable.
    pub include_dirs: Vec<PathBuf>,
    /// `--no-color`.
    pub disable_colors: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig {
            no_builtins: false,
            print_ast: false,
            warns_as_errors: false,
            max_errors: usize::MAX,
            max_warns: usize::MAX,
            include_dirs: Vec::new(),
            disable_colors: false,
        }
    }

    pub fn with_no_builtins(mut self, value: bool) -> Self {
        self.no_builtins = value;
        self
    }

    pub fn with_print_ast(mut self, value: bool) -> Self {
        self.print_ast = value;
        self
    }

    pub fn with_warns_as_errors(mut self, value: bool) -> Self {
        self.warns_as_errors = value;
        self
    }

    /// Clamped to at least 2, matching `CollectingSink`/`TerminalSink`'s own
    /// clamp so a config built here and one built ad hoc at the call site
    /// never disagree.
    pub fn with_max_errors(mut self, n: usize) -> Self {
        self.max_errors = n.max(2);
        self
    }

    pub fn with_max_warns(mut self, n: usize) -> Self {
        self.max_warns = n;
        self
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn with_include_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.include_dirs.extend(dirs);
        self
    }

    pub fn with_disable_colors(mut self, value: bool) -> Self {
        self.disable_colors = value;
        self
    }

    /// Loads overrides from a TOML manifest (e.g. an embedder's project
    /// file) layered on top of the current configuration. Unset fields in
    /// the manifest leave the existing value untouched.
    pub fn merge_toml(mut self, text: &str) -> Result<Self, toml::de::Error> {
        let overrides: TomlOverrides = toml::from_str(text)?;
        if let Some(v) = overrides.no_builtins {
            self.no_builtins = v;
        }
        if let Some(v) = overrides.print_ast {
            self.print_ast = v;
        }
        if let Some(v) = overrides.warns_as_errors {
            self.warns_as_errors = v;
        }
        if let Some(v) = overrides.max_errors {
            self.max_errors = v.max(2);
        }
        if let Some(v) = overrides.max_warns {
            self.max_warns = v;
        }
        if let Some(dirs) = overrides.include_dirs {
            self.include_dirs.extend(dirs.into_iter().map(PathBuf::from));
        }
        if let Some(v) = overrides.disable_colors {
            self.disable_colors = v;
        }
        Ok(self)
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Mirror of `CompilerConfig` with every field optional, for partial TOML
/// overrides.
#[derive(Debug, Deserialize, Default)]
struct TomlOverrides {
    no_builtins: Option<bool>,
    print_ast: Option<bool>,
    warns_as_errors: Option<bool>,
    max_errors: Option<usize>,
    max_warns: Option<usize>,
    include_dirs: Option<Vec<String>>,
    disable_colors: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain_sets_every_field() {
        let config = CompilerConfig::new()
            .with_no_builtins(true)
            .with_print_ast(true)
            .with_warns_as_errors(true)
            .with_max_errors(10)
            .with_max_warns(5)
            .with_include_dir("/usr/local/osl")
            .with_disable_colors(true);

        assert!(config.no_builtins);
        assert!(config.print_ast);
        assert!(config.warns_as_errors);
        assert_eq!(config.max_errors, 10);
        assert_eq!(config.max_warns, 5);
        assert_eq!(config.include_dirs, vec![PathBuf::from("/usr/local/osl")]);
        assert!(config.disable_colors);
    }

    #[test]
    fn max_errors_clamped_to_at_least_two() {
        let config = CompilerConfig::new().with_max_errors(0);
        assert_eq!(config.max_errors, 2);
    }

    #[test]
    fn toml_override_merges_only_present_fields() {
        let config = CompilerConfig::new()
            .with_max_warns(99)
            .merge_toml("no_builtins = true\nmax_errors = 20\n")
            .unwrap();
        assert!(config.no_builtins);
        assert_eq!(config.max_errors, 20);
        assert_eq!(config.max_warns, 99, "unset field in TOML must not override the builder value");
    }

    #[test]
    fn toml_override_rejects_malformed_input() {
        let result = CompilerConfig::new().merge_toml("not = [valid toml");
        assert!(result.is_err());
    }
}
