//! Run-plan configuration loading.
//!
//! A run plan is a TOML file naming the project, the artifacts to stage on
//! each device, and the shell tests to run against them:
//!
//! ```toml
//! [project]
//! name = "openssl"
//! min_sdk_version = 21
//!
//! [[push]]
//! src = "out/{abi}/libcrypto.so"
//! dest = "libcrypto.so"
//!
//! [[test]]
//! name = "crypto_selftest"
//! cmd = "sh -c 'LD_LIBRARY_PATH={device_dir} {device_dir}/selftest'"
//! ```
//!
//! The same plan serves every target ABI: [`ConfigPlan`] substitutes
//! `{abi}`, `{arch}`, `{triple}`, and `{device_dir}` tokens with that ABI's
//! context before handing the lists to the orchestrator.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::orchestrator::{
    DEFAULT_BASE_DIR, PlanContext, PushSpec, ShellTestSpec, TestPlan,
};

/// A parsed and validated run plan.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub project: ProjectConfig,

    #[serde(default, rename = "push")]
    pub pushes: Vec<PushConfig>,

    #[serde(default, rename = "test")]
    pub tests: Vec<TestConfig>,
}

/// Project-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Names the device-side working directory; must be non-empty.
    pub name: String,

    /// Minimum platform version tests require. Raised per ABI to that
    /// ABI's floor at run time.
    #[serde(default = "default_min_sdk_version")]
    pub min_sdk_version: u32,

    /// Device-side base directory artifacts are staged under.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
}

fn default_min_sdk_version() -> u32 {
    21
}

fn default_base_dir() -> String {
    DEFAULT_BASE_DIR.to_string()
}

/// One artifact to push, before token substitution.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    /// Local path; `~` and environment variables are expanded.
    pub src: String,

    /// Device path relative to the campaign's working directory.
    pub dest: String,
}

/// One shell test, before token substitution.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Name the result is reported under.
    pub name: String,

    /// Command line, split into argv with shell-style quoting rules.
    pub cmd: String,
}

/// Loads a run plan from a TOML file.
///
/// # Errors
///
/// Fails when the file cannot be read, is not valid TOML, or does not pass
/// validation (empty project name, unnamed tests, unparseable commands).
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read run plan: {}", path.display()))?;

    load_config_str(&content)
        .with_context(|| format!("invalid run plan: {}", path.display()))
}

/// Loads a run plan from a TOML string. Useful for tests and for embedding
/// plans programmatically.
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("failed to parse run plan")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.project.name.trim().is_empty() {
        bail!("project.name must not be empty");
    }

    for test in &config.tests {
        if test.name.trim().is_empty() {
            bail!("every [[test]] must have a name");
        }
        if test.cmd.trim().is_empty() {
            bail!("test '{}' has an empty cmd", test.name);
        }
        // Substitute a representative context so quoting errors surface at
        // load time rather than mid-run.
        let sample = PlanContext {
            abi: crate::abi::Abi::Arm64,
            device_dir: DEFAULT_BASE_DIR.to_string(),
        };
        shell_words::split(&substitute(&test.cmd, &sample))
            .with_context(|| format!("test '{}' has an unparseable cmd", test.name))?;
    }

    Ok(())
}

fn substitute(template: &str, ctx: &PlanContext) -> String {
    template
        .replace("{abi}", ctx.abi.abi_name())
        .replace("{arch}", ctx.abi.arch_name())
        .replace("{triple}", ctx.abi.triple())
        .replace("{device_dir}", &ctx.device_dir)
}

/// [`TestPlan`] backed by a [`Config`], expanding tokens per ABI.
pub struct ConfigPlan {
    config: Config,
}

impl ConfigPlan {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl TestPlan for ConfigPlan {
    fn pushes(&self, ctx: &PlanContext) -> Vec<PushSpec> {
        self.config
            .pushes
            .iter()
            .map(|push| {
                let src = substitute(&push.src, ctx);
                let src = shellexpand::full(&src)
                    .map(|expanded| expanded.into_owned())
                    .unwrap_or(src);
                PushSpec::new(PathBuf::from(src), substitute(&push.dest, ctx))
            })
            .collect()
    }

    fn shell_tests(&self, ctx: &PlanContext) -> Vec<ShellTestSpec> {
        self.config
            .tests
            .iter()
            .map(|test| {
                let cmd = substitute(&test.cmd, ctx);
                // Validated at load time; fall back to a single argument if
                // substitution produced something unsplittable.
                let argv = shell_words::split(&cmd).unwrap_or_else(|_| vec![cmd.clone()]);
                ShellTestSpec::new(test.name.clone(), argv)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::abi::Abi;

    const PLAN: &str = r#"
        [project]
        name = "openssl"

        [[push]]
        src = "out/{abi}/libcrypto.so"
        dest = "lib/libcrypto.so"

        [[test]]
        name = "selftest"
        cmd = "{device_dir}/selftest --triple {triple}"
    "#;

    #[test]
    fn parses_run_plan_with_defaults() {
        let config = load_config_str(PLAN).unwrap();
        assert_eq!(config.project.name, "openssl");
        assert_eq!(config.project.min_sdk_version, 21);
        assert_eq!(config.project.base_dir, DEFAULT_BASE_DIR);
        assert_eq!(config.pushes.len(), 1);
        assert_eq!(config.tests.len(), 1);
    }

    #[test]
    fn rejects_empty_project_name() {
        let err = load_config_str("[project]\nname = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("project.name"));
    }

    #[test]
    fn rejects_unparseable_test_command() {
        let plan = r#"
            [project]
            name = "p"

            [[test]]
            name = "broken"
            cmd = "sh -c 'unterminated"
        "#;
        let err = load_config_str(plan).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let plan = "[project]\nname = \"p\"\ncolour = \"red\"\n";
        assert!(load_config_str(plan).is_err());
    }

    #[test]
    fn substitutes_tokens_per_abi() {
        let config = load_config_str(PLAN).unwrap();
        let plan = ConfigPlan::new(config);
        let ctx = PlanContext {
            abi: Abi::Armv7,
            device_dir: "/t/openssl/arm".to_string(),
        };

        let pushes = plan.pushes(&ctx);
        assert_eq!(pushes[0].src, PathBuf::from("out/armeabi-v7a/libcrypto.so"));
        assert_eq!(pushes[0].dest, "lib/libcrypto.so");

        let tests = plan.shell_tests(&ctx);
        assert_eq!(tests[0].name, "selftest");
        assert_eq!(
            tests[0].cmd,
            vec![
                "/t/openssl/arm/selftest",
                "--triple",
                "arm-linux-androideabi"
            ]
        );
    }

    #[test]
    fn quoted_arguments_stay_together() {
        let plan = load_config_str(
            r#"
            [project]
            name = "p"

            [[test]]
            name = "env"
            cmd = "sh -c 'LD_LIBRARY_PATH={device_dir} {device_dir}/t'"
        "#,
        )
        .unwrap();
        let plan = ConfigPlan::new(plan);
        let ctx = PlanContext {
            abi: Abi::X86,
            device_dir: "/d".to_string(),
        };

        let tests = plan.shell_tests(&ctx);
        assert_eq!(tests[0].cmd, vec!["sh", "-c", "LD_LIBRARY_PATH=/d /d/t"]);
    }

    #[test]
    fn load_config_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PLAN.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.project.name, "openssl");
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/fleetrun.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read run plan"));
    }
}
