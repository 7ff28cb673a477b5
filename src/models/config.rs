use serde::{Deserialize, Serialize};

/// User configuration from pakbench.yaml
///
/// Contains the workspace location, concurrency mode and external tool setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Workspace root; empty means `<config dir>/work`
    #[serde(default)]
    pub work_dir: String,

    #[serde(default)]
    pub multi_threading: bool,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default)]
    pub tools: ToolSettings,

    /// Per-invocation timeout in seconds, 0 disables it
    #[serde(default)]
    pub tool_timeout_secs: u64,

    #[serde(default)]
    pub parallel: ParallelSettings,

    /// Prefix of generated archive names
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            work_dir: String::new(),
            multi_threading: false,
            debug_mode: false,
            tools: ToolSettings::default(),
            tool_timeout_secs: 0,
            parallel: ParallelSettings::default(),
            output_prefix: default_output_prefix(),
        }
    }
}

fn default_output_prefix() -> String {
    "pakbench".to_string()
}

/// Command line template for one external tool.
///
/// `args` may contain `{input}`, `{output}` and `{inputs}`; the last one expands
/// to one argument per input path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_extract")]
    pub extract: ToolSpec,

    #[serde(default = "default_build")]
    pub build: ToolSpec,

    #[serde(default = "default_model_compiler")]
    pub decompile: ToolSpec,

    #[serde(default = "default_model_compiler")]
    pub compile: ToolSpec,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            extract: default_extract(),
            build: default_build(),
            decompile: default_model_compiler(),
            compile: default_model_compiler(),
        }
    }
}

fn default_extract() -> ToolSpec {
    ToolSpec::new("psarc", &["extract", "-y", "--input={input}", "--to={output}"])
}

fn default_build() -> ToolSpec {
    ToolSpec::new("psarc", &["create", "{inputs}"])
}

fn default_model_compiler() -> ToolSpec {
    ToolSpec::new("MBINCompiler", &["{input}", "{output}"])
}

/// Launch pacing for parallel batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelSettings {
    /// Decompiles launched without delay
    #[serde(default = "default_initial_launches")]
    pub initial_launches: usize,

    /// Delay unit for later launches, multiplied by the item index
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self {
            initial_launches: default_initial_launches(),
            stagger_ms: default_stagger_ms(),
        }
    }
}

fn default_initial_launches() -> usize {
    3
}

fn default_stagger_ms() -> u64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_config_defaults() {
        let config = UserConfig::default();
        assert!(config.work_dir.is_empty());
        assert!(!config.multi_threading);
        assert_eq!(config.tool_timeout_secs, 0);
        assert_eq!(config.parallel.initial_launches, 3);
        assert_eq!(config.output_prefix, "pakbench");
    }

    #[test]
    fn test_default_tool_templates() {
        let tools = ToolSettings::default();
        assert_eq!(tools.extract.program, "psarc");
        assert!(tools.extract.args.contains(&"--input={input}".to_string()));
        assert_eq!(tools.build.args, vec!["create", "{inputs}"]);
        assert_eq!(tools.decompile, tools.compile);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: UserConfig = serde_yaml_ng::from_str("multi_threading: true\n").unwrap();
        assert!(config.multi_threading);
        assert_eq!(config.tools, ToolSettings::default());
        assert_eq!(config.parallel.stagger_ms, 50);
    }
}
